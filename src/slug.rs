use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::comic_info::COMIC_INFO_ENTRY;
use crate::error::SyncError;

static CHAPTER_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)([cv]|ch|chapter)\s?(\d+)").expect("chapter number pattern is valid")
});

/// One inferred chapter of an archive: its slug and the original entry names
/// of its pages in lexicographic order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterGroup {
    pub slug: String,
    pub entries: Vec<String>,
}

/// Whether a zip entry name is a page image (not a directory, resource fork or
/// the metadata document).
pub fn is_page_entry(name: &str) -> bool {
    !name.starts_with("__MACOSX") && !name.ends_with('/') && name != COMIC_INFO_ENTRY
}

/// Splits an entry name into (parent directory, file name).
pub fn split_entry(name: &str) -> (&str, &str) {
    match name.rsplit_once('/') {
        Some((parent, file)) => (parent, file),
        None => ("", name),
    }
}

/// Chapter slugs of an archive laid out as `<slug>/<page>`. Root-level entries
/// are not counted.
pub fn directory_slugs<S: AsRef<str>>(entries: &[S]) -> BTreeSet<String> {
    entries
        .iter()
        .map(|name| name.as_ref())
        .filter(|name| is_page_entry(name))
        .filter_map(|name| {
            let (parent, _) = split_entry(name);
            (!parent.is_empty()).then(|| parent.to_owned())
        })
        .collect()
}

/// Partitions archive entries into chapters.
///
/// Entries inside a directory are grouped by that directory. Root-level files
/// are grouped by the chapter number found in their name (`c12`, `ch 3`,
/// `Chapter_7`, `v2`), keyed `Chapter NNN`. An archive of root-level files
/// where no name carries a chapter number fails with
/// [`SyncError::InferenceFailed`].
pub fn group_entries<S: AsRef<str>>(entries: &[S]) -> Result<Vec<ChapterGroup>, SyncError> {
    let mut pages = entries
        .iter()
        .map(|name| name.as_ref())
        .filter(|name| is_page_entry(name))
        .collect::<Vec<_>>();
    pages.sort_unstable();
    pages.dedup();

    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut root_level = Vec::new();
    for name in pages {
        let (parent, _) = split_entry(name);
        if parent.is_empty() {
            root_level.push(name);
        } else {
            groups
                .entry(parent.to_owned())
                .or_default()
                .push(name.to_owned());
        }
    }

    let has_directories = !groups.is_empty();
    for name in root_level {
        let key = chapter_key(chapter_number(name).unwrap_or(0));
        groups.entry(key).or_default().push(name.to_owned());
    }

    if !has_directories && groups.len() == 1 && groups.contains_key(&chapter_key(0)) {
        return Err(SyncError::InferenceFailed);
    }

    let mut groups = groups
        .into_iter()
        .map(|(slug, entries)| ChapterGroup { slug, entries })
        .collect::<Vec<_>>();
    groups.sort_by(|a, b| natural_cmp(&a.slug, &b.slug));
    Ok(groups)
}

fn chapter_number(file_name: &str) -> Option<u64> {
    let captures = CHAPTER_NUMBER.captures(file_name)?;
    Some(captures.get(2)?.as_str().parse().unwrap_or(0))
}

fn chapter_key(number: u64) -> String {
    format!("Chapter {number:03}")
}

/// Numeric-aware string ordering: digit runs compare as integers, so
/// `Chapter 2` sorts before `Chapter 10`. Strings that only differ in leading
/// zeros fall back to byte order.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a;
    let mut right = b;

    loop {
        match (left.is_empty(), right.is_empty()) {
            (true, true) => return a.cmp(b),
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            (false, false) => {}
        }

        let (left_run, left_rest) = split_run(left);
        let (right_run, right_rest) = split_run(right);
        let ordering = if starts_with_digit(left_run) && starts_with_digit(right_run) {
            cmp_digit_runs(left_run, right_run)
        } else {
            left_run.cmp(right_run)
        };
        if ordering != Ordering::Equal {
            return ordering;
        }

        left = left_rest;
        right = right_rest;
    }
}

fn starts_with_digit(s: &str) -> bool {
    s.starts_with(|c: char| c.is_ascii_digit())
}

fn split_run(s: &str) -> (&str, &str) {
    let digits = starts_with_digit(s);
    let end = s
        .find(|c: char| c.is_ascii_digit() != digits)
        .unwrap_or(s.len());
    s.split_at(end)
}

// Compared by length then bytes, so arbitrarily long runs never overflow.
fn cmp_digit_runs(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Display title for a slug: separators become spaces and every alphabetic run
/// is capitalized (`the-final-battle_2` -> `The Final Battle 2`).
pub fn humanize_slug(slug: &str) -> String {
    let mut out = String::with_capacity(slug.len());
    let mut in_word = false;
    for ch in slug.chars() {
        let ch = if ch == '-' || ch == '_' { ' ' } else { ch };
        if ch.is_alphabetic() {
            if in_word {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(ch);
            in_word = false;
        }
    }
    out
}

/// Slug of a chapter location: its last non-empty path segment.
pub fn slug_from_location(location: &str) -> String {
    location
        .trim_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_owned()
}

/// Directory name for a slug inside a scratch tree. Keeps the slug readable
/// but never lets it escape the parent directory.
pub fn dir_name_for_slug(slug: &str) -> String {
    let name = slug
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect::<String>();
    if name.trim_matches('.').is_empty() {
        return "_".to_owned();
    }
    name
}
