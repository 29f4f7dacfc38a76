use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use url::Url;

use crate::error::SyncError;
use crate::reconcile::ChapterDir;
use crate::slug;
use crate::source::{Fetcher, PageLister};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "avif", "bmp"];
const FALLBACK_EXTENSION: &str = "jpg";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterRequest {
    pub slug: String,
    pub location: String,
}

/// A chapter with at least one page file in `dir`.
#[derive(Debug)]
pub struct FetchedChapter {
    pub slug: String,
    pub dir: PathBuf,
    pub downloaded: usize,
    pub skipped: usize,
    /// `PageFetchFailed` for every page that could not be stored.
    pub failures: Vec<SyncError>,
}

impl FetchedChapter {
    pub fn pages(&self) -> usize {
        self.downloaded + self.skipped
    }

    pub fn chapter_dir(&self) -> ChapterDir {
        ChapterDir {
            slug: self.slug.clone(),
            path: self.dir.clone(),
        }
    }
}

#[derive(Debug)]
pub enum ChapterOutcome {
    Acquired(FetchedChapter),
    /// The source listed no pages for the chapter.
    NoPages { slug: String },
}

#[derive(Debug, Default)]
pub struct FetchSummary {
    pub acquired: Vec<FetchedChapter>,
    pub no_pages: Vec<String>,
    pub failed: Vec<SyncError>,
}

enum PageResult {
    Downloaded,
    Skipped,
}

/// Fetches every page of one chapter into its own directory.
#[derive(Clone)]
pub struct ChapterFetchWorker {
    pages: Arc<dyn PageLister>,
    fetcher: Arc<dyn Fetcher>,
    page_limit: usize,
}

impl ChapterFetchWorker {
    pub fn new(pages: Arc<dyn PageLister>, fetcher: Arc<dyn Fetcher>, page_limit: usize) -> Self {
        Self {
            pages,
            fetcher,
            page_limit: page_limit.max(1),
        }
    }

    pub async fn fetch(
        &self,
        request: &ChapterRequest,
        work_dir: &Path,
    ) -> Result<ChapterOutcome, SyncError> {
        let slug = request.slug.as_str();
        let sources = self
            .pages
            .list_pages(&request.location)
            .await
            .map_err(|err| SyncError::ChapterFetchFailed {
                slug: slug.to_owned(),
                reason: format!("{err:#}"),
            })?;
        if sources.is_empty() {
            tracing::warn!(slug = %slug, url = %request.location, "chapter lists no pages");
            return Ok(ChapterOutcome::NoPages {
                slug: slug.to_owned(),
            });
        }

        let dir = work_dir.join(slug::dir_name_for_slug(slug));
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|err| SyncError::io(&dir, err))?;

        let width = page_number_width(sources.len());
        let semaphore = Arc::new(Semaphore::new(self.page_limit));
        let mut tasks = JoinSet::new();
        for (index, source) in sources.iter().enumerate() {
            let position = index + 1;
            let target = dir.join(format!(
                "page_{position:0width$}.{}",
                page_extension(source)
            ));
            let semaphore = Arc::clone(&semaphore);
            let fetcher = Arc::clone(&self.fetcher);
            let source = source.clone();
            let slug = slug.to_owned();
            tasks.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => store_page(fetcher.as_ref(), &source, &target).await,
                    Err(err) => Err(err.to_string()),
                };
                result.map_err(|reason| SyncError::PageFetchFailed {
                    slug,
                    position,
                    url: source,
                    reason,
                })
            });
        }

        let mut downloaded = 0;
        let mut skipped = 0;
        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(PageResult::Downloaded)) => downloaded += 1,
                Ok(Ok(PageResult::Skipped)) => skipped += 1,
                Ok(Err(err)) => {
                    tracing::warn!(slug = %slug, %err, "page fetch failed");
                    failures.push(err);
                }
                Err(err) => {
                    tracing::warn!(slug = %slug, ?err, "page task did not complete");
                    failures.push(SyncError::PageFetchFailed {
                        slug: slug.to_owned(),
                        position: 0,
                        url: request.location.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }
        failures.sort_by_key(|err| match err {
            SyncError::PageFetchFailed { position, .. } => *position,
            _ => 0,
        });

        if downloaded + skipped == 0 {
            if let Err(err) = tokio::fs::remove_dir_all(&dir).await {
                tracing::warn!(dir = %dir.display(), ?err, "failed to remove empty chapter dir");
            }
            return Err(SyncError::ChapterFetchFailed {
                slug: slug.to_owned(),
                reason: format!("all {} page fetches failed", sources.len()),
            });
        }

        tracing::info!(
            slug = %slug,
            downloaded,
            skipped,
            failed = failures.len(),
            "chapter fetched"
        );
        Ok(ChapterOutcome::Acquired(FetchedChapter {
            slug: slug.to_owned(),
            dir,
            downloaded,
            skipped,
            failures,
        }))
    }
}

async fn store_page(fetcher: &dyn Fetcher, source: &str, target: &Path) -> Result<PageResult, String> {
    if tokio::fs::try_exists(target).await.unwrap_or(false) {
        return Ok(PageResult::Skipped);
    }

    let bytes = fetcher
        .fetch(source)
        .await
        .map_err(|err| format!("{err:#}"))?;
    write_atomic(target, &bytes)
        .await
        .map_err(|err| format!("write {}: {err}", target.display()))?;
    Ok(PageResult::Downloaded)
}

// Hidden temp name in the same directory; readers skip dot-files.
async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.{}.part", uuid::Uuid::new_v4()));
    tokio::fs::write(&tmp, bytes).await?;
    if let Err(err) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(err);
    }
    Ok(())
}

/// Digits used for page numbers: at least three, more for very long chapters.
fn page_number_width(total: usize) -> usize {
    total.to_string().len().max(3)
}

/// Lower-cased image extension of the source's path, or `jpg`.
fn page_extension(source: &str) -> &'static str {
    let path = match Url::parse(source) {
        Ok(url) => url.path().to_owned(),
        Err(_) => source
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_owned(),
    };
    let ext = Path::new(&path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    ext.and_then(|ext| IMAGE_EXTENSIONS.iter().copied().find(|known| *known == ext))
        .unwrap_or(FALLBACK_EXTENSION)
}

/// Runs one worker per chapter, at most `chapter_limit` at a time, and sorts the
/// settled results by slug. Each request gets its own numbered directory under
/// `work_dir`, so slugs that map to the same directory name never share pages.
pub async fn fetch_chapters(
    worker: Arc<ChapterFetchWorker>,
    requests: Vec<ChapterRequest>,
    work_dir: &Path,
    chapter_limit: usize,
) -> FetchSummary {
    let semaphore = Arc::new(Semaphore::new(chapter_limit.max(1)));
    let mut pending = requests
        .iter()
        .map(|request| request.slug.clone())
        .collect::<BTreeSet<_>>();
    let mut tasks = JoinSet::new();

    for (index, request) in requests.into_iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        let worker = Arc::clone(&worker);
        let work_dir = work_dir.join(format!("{index:04}"));
        tasks.spawn(async move {
            let result = match semaphore.acquire_owned().await {
                Ok(_permit) => worker.fetch(&request, &work_dir).await,
                Err(err) => Err(SyncError::ChapterFetchFailed {
                    slug: request.slug.clone(),
                    reason: err.to_string(),
                }),
            };
            (request.slug, result)
        });
    }

    let mut summary = FetchSummary::default();
    while let Some(joined) = tasks.join_next().await {
        let (slug, result) = match joined {
            Ok(done) => done,
            Err(err) => {
                tracing::error!(?err, "chapter task did not complete");
                continue;
            }
        };
        pending.remove(&slug);
        match result {
            Ok(ChapterOutcome::Acquired(chapter)) => summary.acquired.push(chapter),
            Ok(ChapterOutcome::NoPages { slug }) => summary.no_pages.push(slug),
            Err(err) => {
                tracing::warn!(slug = %slug, %err, "chapter fetch failed");
                summary.failed.push(err);
            }
        }
    }
    for slug in pending {
        summary.failed.push(SyncError::ChapterFetchFailed {
            slug,
            reason: "chapter task did not complete".to_owned(),
        });
    }

    summary
        .acquired
        .sort_by(|a, b| slug::natural_cmp(&a.slug, &b.slug));
    summary.no_pages.sort_by(|a, b| slug::natural_cmp(a, b));
    summary.failed.sort_by(|a, b| {
        slug::natural_cmp(failed_slug(a).unwrap_or(""), failed_slug(b).unwrap_or(""))
    });
    summary
}

pub(crate) fn failed_slug(err: &SyncError) -> Option<&str> {
    match err {
        SyncError::ChapterFetchFailed { slug, .. } | SyncError::PageFetchFailed { slug, .. } => {
            Some(slug)
        }
        _ => None,
    }
}
