use std::collections::BTreeSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use crate::comic_info::COMIC_INFO_ENTRY;
use crate::error::SyncError;
use crate::reconcile::ChapterDir;
use crate::slug::{self, ChapterGroup};

/// Entry names of an existing archive.
#[derive(Debug, Clone, Default)]
pub struct ArchiveListing {
    pub entries: Vec<String>,
    pub has_comic_info: bool,
}

impl ArchiveListing {
    pub fn page_entries(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .map(String::as_str)
            .filter(|name| slug::is_page_entry(name))
    }
}

fn open(path: &Path) -> Result<ZipArchive<BufReader<File>>, SyncError> {
    let file = File::open(path).map_err(|err| SyncError::io(path, err))?;
    ZipArchive::new(BufReader::new(file)).map_err(|err| SyncError::corrupt(path, err))
}

pub fn read_listing(path: &Path) -> Result<ArchiveListing, SyncError> {
    let archive = open(path)?;
    let entries = archive
        .file_names()
        .map(str::to_owned)
        .collect::<Vec<_>>();
    let has_comic_info = entries.iter().any(|name| name == COMIC_INFO_ENTRY);
    Ok(ArchiveListing {
        entries,
        has_comic_info,
    })
}

/// Chapter slugs already present in the archive at `path`, using the
/// `<slug>/<page>` layout only.
pub fn local_chapter_slugs(path: &Path) -> Result<BTreeSet<String>, SyncError> {
    let listing = read_listing(path)?;
    Ok(slug::directory_slugs(&listing.entries))
}

/// Extracts every group into its own directory under `scratch_dir` and returns
/// the chapter directories in group order. Files keep their base name; the
/// entry's directory part is never used as a filesystem path. A base name seen
/// twice in one group gets a `~N` suffix so neither page is lost.
pub fn extract_groups(
    path: &Path,
    groups: &[ChapterGroup],
    scratch_dir: &Path,
) -> Result<Vec<ChapterDir>, SyncError> {
    let mut archive = open(path)?;
    let mut chapters = Vec::with_capacity(groups.len());

    for (index, group) in groups.iter().enumerate() {
        let chapter_dir = scratch_dir.join(format!("{index:04}"));
        std::fs::create_dir_all(&chapter_dir).map_err(|err| SyncError::io(&chapter_dir, err))?;
        let mut used = BTreeSet::new();

        for entry in &group.entries {
            let (_, base_name) = slug::split_entry(entry);
            if base_name.is_empty() || base_name == "." || base_name == ".." {
                tracing::warn!(entry = %entry, "skipping entry with unusable file name");
                continue;
            }

            let mut reader = archive
                .by_name(entry)
                .map_err(|err| SyncError::corrupt(path, err))?;
            let file_name = unique_file_name(&mut used, base_name);
            if file_name != base_name {
                tracing::warn!(
                    entry = %entry,
                    renamed = %file_name,
                    chapter = %group.slug,
                    "duplicate page name in chapter; keeping both"
                );
            }
            let out_path = chapter_dir.join(&file_name);
            let mut out = File::create(&out_path).map_err(|err| SyncError::io(&out_path, err))?;
            std::io::copy(&mut reader, &mut out).map_err(|err| SyncError::io(&out_path, err))?;
        }

        chapters.push(ChapterDir {
            slug: group.slug.clone(),
            path: chapter_dir,
        });
    }

    tracing::debug!(
        archive = %path.display(),
        chapters = chapters.len(),
        "extracted existing chapters"
    );
    Ok(chapters)
}

fn unique_file_name(used: &mut BTreeSet<String>, file_name: &str) -> String {
    if used.insert(file_name.to_owned()) {
        return file_name.to_owned();
    }
    let (stem, ext) = match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, format!(".{ext}")),
        _ => (file_name, String::new()),
    };
    let mut n = 2;
    loop {
        let candidate = format!("{stem}~{n}{ext}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Lists `.cbz` files: files are kept as given, directories contribute their
/// direct `.cbz` children in name order.
pub fn expand_archive_paths(inputs: &[PathBuf]) -> Result<Vec<PathBuf>, SyncError> {
    let mut paths = Vec::new();
    for input in inputs {
        if !input.is_dir() {
            paths.push(input.clone());
            continue;
        }

        let mut found = std::fs::read_dir(input)
            .map_err(|err| SyncError::io(input, err))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| SyncError::io(input, err))?
            .into_iter()
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && has_cbz_extension(path))
            .collect::<Vec<_>>();
        found.sort();
        paths.extend(found);
    }
    Ok(paths)
}

pub fn has_cbz_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("cbz"))
}


#[cfg(test)]
mod tests {
    use super::testing::write_zip;
    use super::*;

    #[test]
    fn listing_reports_comic_info_and_pages() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let path = temp.path().join("series.cbz");
        write_zip(
            &path,
            &[
                ("ComicInfo.xml", b"<ComicInfo />"),
                ("chapter-1/page_001.jpg", b"a"),
                ("chapter-2/page_001.jpg", b"b"),
            ],
        )?;

        let listing = read_listing(&path)?;
        assert!(listing.has_comic_info);
        assert_eq!(listing.page_entries().count(), 2);
        assert_eq!(
            local_chapter_slugs(&path)?.into_iter().collect::<Vec<_>>(),
            vec!["chapter-1", "chapter-2"]
        );
        Ok(())
    }

    #[test]
    fn non_zip_file_is_corrupt_archive() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let path = temp.path().join("broken.cbz");
        std::fs::write(&path, b"definitely not a zip")?;

        assert!(matches!(
            read_listing(&path),
            Err(SyncError::CorruptArchive { .. })
        ));
        Ok(())
    }

    #[test]
    fn extract_groups_writes_one_directory_per_group() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let path = temp.path().join("flat.cbz");
        write_zip(
            &path,
            &[
                ("ch1_01.jpg", b"one-one"),
                ("ch1_02.jpg", b"one-two"),
                ("ch2_01.jpg", b"two-one"),
            ],
        )?;
        let listing = read_listing(&path)?;
        let groups = slug::group_entries(&listing.entries)?;
        let scratch = temp.path().join("scratch");

        let chapters = extract_groups(&path, &groups, &scratch)?;

        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0].slug, "Chapter 001");
        assert_eq!(
            std::fs::read(chapters[0].path.join("ch1_02.jpg"))?,
            b"one-two"
        );
        assert_eq!(chapters[1].slug, "Chapter 002");
        assert_eq!(
            std::fs::read(chapters[1].path.join("ch2_01.jpg"))?,
            b"two-one"
        );
        Ok(())
    }

    #[test]
    fn same_base_name_in_one_group_keeps_both_pages() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let path = temp.path().join("mixed.cbz");
        write_zip(
            &path,
            &[("Chapter 001/c1.jpg", b"from-dir"), ("c1.jpg", b"from-root")],
        )?;
        let listing = read_listing(&path)?;
        let groups = slug::group_entries(&listing.entries)?;
        let scratch = temp.path().join("scratch");

        let chapters = extract_groups(&path, &groups, &scratch)?;

        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].slug, "Chapter 001");
        let mut bodies = std::fs::read_dir(&chapters[0].path)?
            .map(|entry| entry.and_then(|e| std::fs::read(e.path())))
            .collect::<Result<Vec<_>, _>>()?;
        bodies.sort();
        assert_eq!(bodies, vec![b"from-dir".to_vec(), b"from-root".to_vec()]);
        assert_eq!(
            std::fs::read(chapters[0].path.join("c1.jpg"))?,
            b"from-dir"
        );
        Ok(())
    }

    #[test]
    fn unique_file_name_suffixes_repeats() {
        let mut used = BTreeSet::new();
        assert_eq!(unique_file_name(&mut used, "01.jpg"), "01.jpg");
        assert_eq!(unique_file_name(&mut used, "01.jpg"), "01~2.jpg");
        assert_eq!(unique_file_name(&mut used, "01.jpg"), "01~3.jpg");
        assert_eq!(unique_file_name(&mut used, "cover"), "cover");
        assert_eq!(unique_file_name(&mut used, "cover"), "cover~2");
    }

    #[test]
    fn expand_archive_paths_lists_cbz_files_in_directories() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        std::fs::write(temp.path().join("b.cbz"), b"")?;
        std::fs::write(temp.path().join("a.CBZ"), b"")?;
        std::fs::write(temp.path().join("notes.txt"), b"")?;
        let explicit = PathBuf::from("elsewhere/one.cbz");

        let paths = expand_archive_paths(&[temp.path().to_path_buf(), explicit.clone()])?;

        assert_eq!(
            paths,
            vec![
                temp.path().join("a.CBZ"),
                temp.path().join("b.cbz"),
                explicit,
            ]
        );
        Ok(())
    }
}
