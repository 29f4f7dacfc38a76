use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Write as _};
use std::path::{Path, PathBuf};

use serde::Serialize;
use zip::write::SimpleFileOptions;

use crate::comic_info::{self, Bookmark, COMIC_INFO_ENTRY};
use crate::error::SyncError;
use crate::slug;

/// A chapter materialized on disk: every regular, non-hidden file in `path` is
/// one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterDir {
    pub slug: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct PlannedChapter {
    pub slug: String,
    pub title: String,
    /// Page files in archive order.
    pub pages: Vec<PathBuf>,
}

/// The fully resolved content of an archive before anything is written.
#[derive(Debug, Clone)]
pub struct ArchivePlan {
    pub title: String,
    pub chapters: Vec<PlannedChapter>,
}

impl ArchivePlan {
    pub fn total_pages(&self) -> usize {
        self.chapters.iter().map(|c| c.pages.len()).sum()
    }

    pub fn bookmarks(&self) -> Vec<Bookmark> {
        let mut next_index = 0;
        self.chapters
            .iter()
            .map(|chapter| {
                let bookmark = Bookmark {
                    page_index: next_index,
                    title: chapter.title.clone(),
                };
                next_index += chapter.pages.len();
                bookmark
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveSummary {
    pub path: PathBuf,
    pub chapters: usize,
    pub pages: usize,
}

/// Merges existing and freshly fetched chapters into one plan.
///
/// A fetched chapter replaces an existing chapter with the same slug as a
/// whole; pages are never merged across the two. Chapters are ordered by
/// natural sort of their slugs, pages by file name. Chapters without pages are
/// dropped. Fails with [`SyncError::EmptyResult`] when nothing is left.
pub fn plan(
    existing: Vec<ChapterDir>,
    fetched: Vec<ChapterDir>,
    title: &str,
) -> Result<ArchivePlan, SyncError> {
    let mut by_slug: BTreeMap<String, PathBuf> = BTreeMap::new();
    for chapter in existing {
        by_slug.insert(chapter.slug, chapter.path);
    }
    for chapter in fetched {
        if by_slug.contains_key(&chapter.slug) {
            tracing::info!(slug = %chapter.slug, "fetched chapter replaces archived copy");
        }
        by_slug.insert(chapter.slug, chapter.path);
    }

    let mut slugs = by_slug.keys().cloned().collect::<Vec<_>>();
    slugs.sort_by(|a, b| slug::natural_cmp(a, b));

    let mut chapters = Vec::with_capacity(slugs.len());
    for slug in slugs {
        let Some(dir) = by_slug.remove(&slug) else {
            continue;
        };
        let pages = list_pages(&dir)?;
        if pages.is_empty() {
            tracing::warn!(slug = %slug, dir = %dir.display(), "chapter has no pages; dropping");
            continue;
        }
        chapters.push(PlannedChapter {
            title: slug::humanize_slug(&slug),
            slug,
            pages,
        });
    }

    let plan = ArchivePlan {
        title: title.to_owned(),
        chapters,
    };
    if plan.total_pages() == 0 {
        return Err(SyncError::EmptyResult);
    }
    Ok(plan)
}

fn list_pages(dir: &Path) -> Result<Vec<PathBuf>, SyncError> {
    let mut pages = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|err| SyncError::io(dir, err))? {
        let entry = entry.map_err(|err| SyncError::io(dir, err))?;
        let file_type = entry.file_type().map_err(|err| SyncError::io(dir, err))?;
        if !file_type.is_file() || entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        pages.push(entry.path());
    }
    pages.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(pages)
}

/// Writes the plan to `out_path`, replacing any previous file only once the new
/// archive is complete. On failure the temporary file is removed and the
/// previous archive is left as it was.
pub fn write_archive(plan: &ArchivePlan, out_path: &Path) -> Result<ArchiveSummary, SyncError> {
    let parent = match out_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(|err| SyncError::io(&parent, err))?;

    let existing_permissions = std::fs::metadata(out_path)
        .ok()
        .map(|metadata| metadata.permissions());
    let mut builder = tempfile::Builder::new();
    builder.prefix(".mangasync-");
    // New archives get 0644 minus the umask instead of the 0600 temp file default.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt as _;
        builder.permissions(std::fs::Permissions::from_mode(0o644));
    }
    let mut temp = builder
        .tempfile_in(&parent)
        .map_err(|err| SyncError::io(&parent, err))?;
    let temp_path = temp.path().to_path_buf();
    if let Some(permissions) = existing_permissions {
        temp.as_file()
            .set_permissions(permissions)
            .map_err(|err| SyncError::io(&temp_path, err))?;
    }

    // Fixed timestamp and mode keep output byte-identical for identical input.
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default())
        .unix_permissions(0o644);

    let comic_info = comic_info::render_comic_info(&plan.title, &plan.bookmarks(), plan.total_pages());

    let mut zip = zip::ZipWriter::new(temp.as_file_mut());
    zip.start_file(COMIC_INFO_ENTRY, options)
        .map_err(|err| SyncError::archive_write(&temp_path, err))?;
    zip.write_all(&comic_info)
        .map_err(|err| SyncError::io(&temp_path, err))?;

    for chapter in &plan.chapters {
        for page in &chapter.pages {
            let file_name = page
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let mut reader =
                BufReader::new(File::open(page).map_err(|err| SyncError::io(page, err))?);
            zip.start_file(format!("{}/{file_name}", chapter.slug), options)
                .map_err(|err| SyncError::archive_write(&temp_path, err))?;
            std::io::copy(&mut reader, &mut zip).map_err(|err| SyncError::io(page, err))?;
        }
    }

    zip.finish()
        .map_err(|err| SyncError::archive_write(&temp_path, err))?;
    temp.as_file()
        .sync_all()
        .map_err(|err| SyncError::io(&temp_path, err))?;
    temp.persist(out_path)
        .map_err(|err| SyncError::io(out_path, err.error))?;

    tracing::info!(
        archive = %out_path.display(),
        chapters = plan.chapters.len(),
        pages = plan.total_pages(),
        "archive written"
    );

    Ok(ArchiveSummary {
        path: out_path.to_path_buf(),
        chapters: plan.chapters.len(),
        pages: plan.total_pages(),
    })
}

/// Plans and writes in one step. [`SyncError::EmptyResult`] is returned before
/// any file is created.
pub fn reconcile(
    existing: Vec<ChapterDir>,
    fetched: Vec<ChapterDir>,
    title: &str,
    out_path: &Path,
) -> Result<ArchiveSummary, SyncError> {
    let plan = plan(existing, fetched, title)?;
    write_archive(&plan, out_path)
}
