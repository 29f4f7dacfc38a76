use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::archive;
use crate::cli::TagArgs;
use crate::error::SyncError;
use crate::reconcile::{self, ArchiveSummary};
use crate::slug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetagOutcome {
    Written(ArchiveSummary),
    SkippedNotCbz,
    SkippedHasMetadata,
    SkippedNoImages,
}

/// Regroups the pages of a local archive into chapter directories and embeds
/// fresh metadata, replacing the file atomically.
///
/// Archives that already carry `ComicInfo.xml` are left alone unless `force`
/// is set. Without a title the humanized file stem is used.
pub fn retag_archive(
    path: &Path,
    title: Option<&str>,
    force: bool,
) -> Result<RetagOutcome, SyncError> {
    if !archive::has_cbz_extension(path) {
        return Ok(RetagOutcome::SkippedNotCbz);
    }

    let listing = archive::read_listing(path)?;
    if listing.has_comic_info && !force {
        return Ok(RetagOutcome::SkippedHasMetadata);
    }
    if listing.page_entries().next().is_none() {
        return Ok(RetagOutcome::SkippedNoImages);
    }

    let groups = slug::group_entries(&listing.entries)?;
    let title = match title {
        Some(title) => title.to_owned(),
        None => default_title(path),
    };

    let scratch = tempfile::Builder::new()
        .prefix("mangasync-tag-")
        .tempdir()
        .map_err(|err| SyncError::io(&std::env::temp_dir(), err))?;
    let chapters = archive::extract_groups(path, &groups, scratch.path())?;
    let summary = reconcile::reconcile(chapters, Vec::new(), &title, path)?;
    Ok(RetagOutcome::Written(summary))
}

fn default_title(path: &Path) -> String {
    path.file_stem()
        .map(|stem| slug::humanize_slug(&stem.to_string_lossy()))
        .unwrap_or_default()
}

/// Retags every path with at most `limit` archives in flight. Results keep the
/// input order; one failure never stops the rest.
pub async fn retag_batch(
    paths: Vec<PathBuf>,
    force: bool,
    limit: usize,
) -> Vec<(PathBuf, Result<RetagOutcome, SyncError>)> {
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let mut tasks = JoinSet::new();

    for (index, path) in paths.iter().cloned().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let result = match semaphore.acquire_owned().await {
                Ok(_permit) => {
                    let task_path = path.clone();
                    tokio::task::spawn_blocking(move || retag_archive(&task_path, None, force))
                        .await
                        .unwrap_or_else(|err| Err(SyncError::io(&path, std::io::Error::other(err))))
                }
                Err(err) => Err(SyncError::io(&path, std::io::Error::other(err))),
            };
            (index, result)
        });
    }

    let mut results = paths
        .into_iter()
        .map(|path| (path, None))
        .collect::<Vec<(PathBuf, Option<Result<RetagOutcome, SyncError>>)>>();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, result)) => {
                if let Some(slot) = results.get_mut(index) {
                    slot.1 = Some(result);
                }
            }
            Err(err) => tracing::error!(?err, "retag task did not complete"),
        }
    }

    results
        .into_iter()
        .map(|(path, result)| {
            let result = result.unwrap_or_else(|| {
                Err(SyncError::io(
                    &path,
                    std::io::Error::other("retag task did not complete"),
                ))
            });
            (path, result)
        })
        .collect()
}

pub async fn run(args: TagArgs) -> anyhow::Result<()> {
    let paths = archive::expand_archive_paths(&args.paths).context("expand archive paths")?;
    if paths.is_empty() {
        anyhow::bail!("no .cbz archives found");
    }

    let results = if let [path] = paths.as_slice() {
        let path = path.clone();
        let task_path = path.clone();
        let title = args.title.clone();
        let result = tokio::task::spawn_blocking(move || {
            retag_archive(&task_path, title.as_deref(), args.force)
        })
        .await
        .context("join retag task")?;
        vec![(path, result)]
    } else {
        if args.title.is_some() {
            tracing::warn!("--title is ignored when more than one archive is processed");
        }
        let workers = args.batch_workers.max(1);
        tracing::info!(archives = paths.len(), workers, "retagging archives");
        retag_batch(paths, args.force, workers).await
    };

    let total = results.len();
    let mut failed = 0;
    for (path, result) in results {
        match result {
            Ok(RetagOutcome::Written(summary)) => tracing::info!(
                archive = %path.display(),
                chapters = summary.chapters,
                pages = summary.pages,
                "reorganized archive"
            ),
            Ok(RetagOutcome::SkippedNotCbz) => {
                tracing::warn!(archive = %path.display(), "skipping: not a .cbz file")
            }
            Ok(RetagOutcome::SkippedHasMetadata) => tracing::info!(
                archive = %path.display(),
                "skipping: ComicInfo.xml already present (use --force to rebuild)"
            ),
            Ok(RetagOutcome::SkippedNoImages) => {
                tracing::warn!(archive = %path.display(), "skipping: no images found")
            }
            Err(err) => {
                failed += 1;
                tracing::error!(archive = %path.display(), %err, "retag failed");
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {total} archives failed");
    }
    Ok(())
}
