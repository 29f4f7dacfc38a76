use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use serde::Serialize;

use crate::archive;
use crate::cli::{DownloadArgs, UpdateArgs};
use crate::config::{FetchLimits, HttpSettings};
use crate::error::SyncError;
use crate::fetch::{self, ChapterFetchWorker, ChapterRequest, FetchSummary};
use crate::reconcile::{self, ArchiveSummary, ChapterDir};
use crate::slug::{self, ChapterGroup};
use crate::source::{ChapterLister, Fetcher, HttpSource, PageLister};

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Series title written to the metadata document.
    pub title: String,
    /// Chapter slugs never fetched.
    pub exclude: BTreeSet<String>,
}

/// What `download` starts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadTarget {
    Series(String),
    Chapter(String),
}

impl DownloadTarget {
    /// A URL whose last or second-to-last path segment contains `chapter-`
    /// names a single chapter.
    pub fn from_url(url: &str) -> Self {
        let mut segments = url.rsplit('/');
        let last = segments.next().unwrap_or_default();
        let second_last = segments.next().unwrap_or_default();
        if last.contains("chapter-") || second_last.contains("chapter-") {
            Self::Chapter(url.to_owned())
        } else {
            Self::Series(url.to_owned())
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Self::Series(url) | Self::Chapter(url) => url,
        }
    }

    /// Title used when none is given: the chapter slug for a single chapter,
    /// else the series segment after `/manga/`, humanized.
    pub fn default_title(&self) -> String {
        match self {
            Self::Chapter(url) => slug::slug_from_location(url),
            Self::Series(url) => {
                let tail = url.rsplit_once("/manga/").map_or(url.as_str(), |(_, tail)| tail);
                let series = tail.trim_matches('/');
                let series = series.split("/chapter-").next().unwrap_or(series);
                slug::humanize_slug(series)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedPage {
    pub position: usize,
    pub url: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchedChapterReport {
    pub slug: String,
    pub downloaded: usize,
    pub skipped: usize,
    pub failed_pages: Vec<FailedPage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedChapter {
    pub slug: String,
    pub reason: String,
}

/// Result of a sync that rewrote the archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub title: String,
    pub archive: ArchiveSummary,
    pub excluded: usize,
    pub fetched: Vec<FetchedChapterReport>,
    pub no_pages: Vec<String>,
    pub failed_chapters: Vec<FailedChapter>,
}

#[derive(Debug)]
pub enum SyncOutcome {
    /// Every remote chapter is already archived; nothing was written.
    UpToDate {
        archive: PathBuf,
        local_chapters: usize,
    },
    /// The source could not be used; nothing was written.
    Aborted(SyncError),
    /// Reconciliation refused to write; the previous archive is untouched.
    Failed(SyncError),
    Done(SyncReport),
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum OutcomeView<'a> {
    UpToDate {
        archive: &'a Path,
        local_chapters: usize,
    },
    Aborted {
        reason: String,
    },
    Failed {
        reason: String,
    },
    Done(&'a SyncReport),
}

impl SyncOutcome {
    pub fn to_json(&self) -> serde_json::Result<String> {
        let view = match self {
            Self::UpToDate {
                archive,
                local_chapters,
            } => OutcomeView::UpToDate {
                archive,
                local_chapters: *local_chapters,
            },
            Self::Aborted(err) => OutcomeView::Aborted {
                reason: err.to_string(),
            },
            Self::Failed(err) => OutcomeView::Failed {
                reason: err.to_string(),
            },
            Self::Done(report) => OutcomeView::Done(report),
        };
        serde_json::to_string_pretty(&view)
    }
}

/// Diffs a series against an archive, fetches what is missing and rebuilds the
/// archive once every fetch has settled.
pub struct SyncOrchestrator {
    chapters: Arc<dyn ChapterLister>,
    worker: Arc<ChapterFetchWorker>,
    limits: FetchLimits,
}

impl SyncOrchestrator {
    pub fn new(
        chapters: Arc<dyn ChapterLister>,
        pages: Arc<dyn PageLister>,
        fetcher: Arc<dyn Fetcher>,
        limits: FetchLimits,
    ) -> Self {
        Self {
            chapters,
            worker: Arc::new(ChapterFetchWorker::new(pages, fetcher, limits.page_workers)),
            limits,
        }
    }

    pub fn from_source(source: HttpSource, limits: FetchLimits) -> Self {
        let source = Arc::new(source);
        Self::new(source.clone(), source.clone(), source, limits)
    }

    /// Adds the chapters of `series` that `archive` lacks.
    pub async fn update(
        &self,
        archive: &Path,
        series: &str,
        options: &SyncOptions,
    ) -> Result<SyncOutcome, SyncError> {
        let path = archive.to_path_buf();
        let (local, groups) = blocking(archive, move || {
            let listing = archive::read_listing(&path)?;
            let local = slug::directory_slugs(&listing.entries);
            let groups = slug::group_entries(&listing.entries)?;
            Ok((local, groups))
        })
        .await?;
        tracing::info!(archive = %archive.display(), chapters = local.len(), "listed local chapters");

        let Some(remote) = self.list_remote(series).await else {
            return Ok(SyncOutcome::Aborted(SyncError::NoRemoteChapters));
        };

        let (requests, excluded) = select_requests(remote, &options.exclude, &local);
        if requests.is_empty() {
            tracing::info!(archive = %archive.display(), "archive is up to date");
            return Ok(SyncOutcome::UpToDate {
                archive: archive.to_path_buf(),
                local_chapters: local.len(),
            });
        }

        self.fetch_and_reconcile(Some((archive, groups)), requests, excluded, archive, options)
            .await
    }

    /// Builds a new archive at `out_path` from a series or a single chapter.
    pub async fn download(
        &self,
        target: &DownloadTarget,
        out_path: &Path,
        options: &SyncOptions,
        force: bool,
    ) -> Result<SyncOutcome, SyncError> {
        if out_path.exists() && !force {
            return Err(SyncError::OutputExists {
                path: out_path.to_path_buf(),
            });
        }

        let remote = match target {
            DownloadTarget::Chapter(url) => vec![url.clone()],
            DownloadTarget::Series(url) => match self.list_remote(url).await {
                Some(remote) => remote,
                None => return Ok(SyncOutcome::Aborted(SyncError::NoRemoteChapters)),
            },
        };

        let (requests, excluded) = select_requests(remote, &options.exclude, &BTreeSet::new());
        if requests.is_empty() {
            tracing::warn!(url = %target.url(), excluded, "no chapters left to download");
            return Ok(SyncOutcome::Aborted(SyncError::NoRemoteChapters));
        }

        self.fetch_and_reconcile(None, requests, excluded, out_path, options)
            .await
    }

    async fn list_remote(&self, series: &str) -> Option<Vec<String>> {
        match self.chapters.list_chapters(series).await {
            Ok(remote) if !remote.is_empty() => {
                tracing::info!(url = %series, chapters = remote.len(), "listed remote chapters");
                Some(remote)
            }
            Ok(_) => {
                tracing::warn!(url = %series, "source lists no chapters; aborting");
                None
            }
            Err(err) => {
                tracing::warn!(url = %series, err = %format!("{err:#}"), "could not list chapters; aborting");
                None
            }
        }
    }

    async fn fetch_and_reconcile(
        &self,
        existing: Option<(&Path, Vec<ChapterGroup>)>,
        requests: Vec<ChapterRequest>,
        excluded: usize,
        out_path: &Path,
        options: &SyncOptions,
    ) -> Result<SyncOutcome, SyncError> {
        tracing::info!(
            chapters = requests.len(),
            chapter_workers = self.limits.chapter_workers,
            page_workers = self.limits.page_workers,
            "fetching chapters"
        );

        let scratch = tempfile::Builder::new()
            .prefix("mangasync-")
            .tempdir()
            .map_err(|err| SyncError::io(&std::env::temp_dir(), err))?;
        let fetched_dir = scratch.path().join("fetched");
        let existing_dir = scratch.path().join("existing");

        let summary = fetch::fetch_chapters(
            Arc::clone(&self.worker),
            requests,
            &fetched_dir,
            self.limits.chapter_workers,
        )
        .await;
        let fetched = summary
            .acquired
            .iter()
            .map(|chapter| chapter.chapter_dir())
            .collect::<Vec<_>>();
        let report_parts = ReportParts::from_summary(&summary, excluded);

        let existing = existing.map(|(path, groups)| (path.to_path_buf(), groups));
        let out = out_path.to_path_buf();
        let title = options.title.clone();
        let written = blocking(out_path, move || {
            let existing_chapters: Vec<ChapterDir> = match existing {
                Some((path, groups)) => archive::extract_groups(&path, &groups, &existing_dir)?,
                None => Vec::new(),
            };
            reconcile::reconcile(existing_chapters, fetched, &title, &out)
        })
        .await;

        match written {
            Ok(archive) => Ok(SyncOutcome::Done(report_parts.into_report(options, archive))),
            Err(SyncError::EmptyResult) => {
                tracing::error!(archive = %out_path.display(), "nothing to write; archive left untouched");
                Ok(SyncOutcome::Failed(SyncError::EmptyResult))
            }
            Err(err) => Err(err),
        }
    }
}

struct ReportParts {
    excluded: usize,
    fetched: Vec<FetchedChapterReport>,
    no_pages: Vec<String>,
    failed_chapters: Vec<FailedChapter>,
}

impl ReportParts {
    fn from_summary(summary: &FetchSummary, excluded: usize) -> Self {
        let fetched = summary
            .acquired
            .iter()
            .map(|chapter| FetchedChapterReport {
                slug: chapter.slug.clone(),
                downloaded: chapter.downloaded,
                skipped: chapter.skipped,
                failed_pages: chapter
                    .failures
                    .iter()
                    .filter_map(|err| match err {
                        SyncError::PageFetchFailed {
                            position,
                            url,
                            reason,
                            ..
                        } => Some(FailedPage {
                            position: *position,
                            url: url.clone(),
                            reason: reason.clone(),
                        }),
                        _ => None,
                    })
                    .collect(),
            })
            .collect();
        let failed_chapters = summary
            .failed
            .iter()
            .map(|err| FailedChapter {
                slug: fetch::failed_slug(err).unwrap_or_default().to_owned(),
                reason: match err {
                    SyncError::ChapterFetchFailed { reason, .. } => reason.clone(),
                    other => other.to_string(),
                },
            })
            .collect();
        Self {
            excluded,
            fetched,
            no_pages: summary.no_pages.clone(),
            failed_chapters,
        }
    }

    fn into_report(self, options: &SyncOptions, archive: ArchiveSummary) -> SyncReport {
        SyncReport {
            title: options.title.clone(),
            archive,
            excluded: self.excluded,
            fetched: self.fetched,
            no_pages: self.no_pages,
            failed_chapters: self.failed_chapters,
        }
    }
}

/// Remote chapters to fetch, in source order, and how many were excluded.
fn select_requests(
    remote: Vec<String>,
    exclude: &BTreeSet<String>,
    local: &BTreeSet<String>,
) -> (Vec<ChapterRequest>, usize) {
    let mut seen = BTreeSet::new();
    let mut excluded = 0;
    let mut requests = Vec::new();
    for location in remote {
        let slug = slug::slug_from_location(&location);
        if slug.is_empty() || !seen.insert(slug.clone()) {
            continue;
        }
        if exclude.contains(&slug) {
            excluded += 1;
            continue;
        }
        if local.contains(&slug) {
            continue;
        }
        requests.push(ChapterRequest { slug, location });
    }
    if excluded > 0 {
        tracing::info!(excluded, remaining = requests.len(), "excluded chapters");
    }
    (requests, excluded)
}

async fn blocking<T, F>(path: &Path, work: F) -> Result<T, SyncError>
where
    F: FnOnce() -> Result<T, SyncError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| SyncError::io(path, std::io::Error::other(err)))?
}

/// File name for a title: path separators and other unsafe characters are
/// replaced.
pub fn archive_file_name(title: &str) -> String {
    format!("{}.cbz", slug::dir_name_for_slug(title.trim()))
}

fn report_outcome(outcome: SyncOutcome, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", outcome.to_json().context("serialize sync report")?);
    }

    match outcome {
        SyncOutcome::UpToDate {
            archive,
            local_chapters,
        } => {
            tracing::info!(archive = %archive.display(), chapters = local_chapters, "no new chapters");
            Ok(())
        }
        SyncOutcome::Aborted(err) => {
            tracing::warn!(%err, "sync aborted");
            Ok(())
        }
        SyncOutcome::Failed(err) => Err(anyhow::Error::new(err)),
        SyncOutcome::Done(report) => {
            tracing::info!(
                archive = %report.archive.path.display(),
                chapters = report.archive.chapters,
                pages = report.archive.pages,
                fetched = report.fetched.len(),
                failed = report.failed_chapters.len(),
                no_pages = report.no_pages.len(),
                "sync complete"
            );
            Ok(())
        }
    }
}

fn orchestrator(workers: usize, chapter_workers: usize) -> anyhow::Result<SyncOrchestrator> {
    let settings = HttpSettings::from_env().context("read http settings")?;
    let source = HttpSource::new(&settings)?;
    Ok(SyncOrchestrator::from_source(
        source,
        FetchLimits::new(workers, chapter_workers),
    ))
}

pub async fn run_download(args: DownloadArgs) -> anyhow::Result<()> {
    let target = DownloadTarget::from_url(&args.url);
    let title = args
        .title
        .clone()
        .unwrap_or_else(|| target.default_title());
    let out_path = args.out_dir.join(archive_file_name(&title));
    let options = SyncOptions {
        title,
        exclude: args.exclude.iter().cloned().collect(),
    };

    let orchestrator = orchestrator(args.workers, args.chapter_workers)?;
    let outcome = orchestrator
        .download(&target, &out_path, &options, args.force)
        .await
        .with_context(|| format!("download {}", args.url))?;
    report_outcome(outcome, args.json)
}

pub async fn run_update(args: UpdateArgs) -> anyhow::Result<()> {
    let title = match &args.title {
        Some(title) => title.clone(),
        None => args
            .archive
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .with_context(|| format!("archive path has no file name: {}", args.archive.display()))?,
    };
    let options = SyncOptions {
        title,
        exclude: args.exclude.iter().cloned().collect(),
    };

    let orchestrator = orchestrator(args.workers, args.chapter_workers)?;
    let outcome = orchestrator
        .update(&args.archive, &args.url, &options)
        .await
        .with_context(|| format!("update {}", args.archive.display()))?;
    report_outcome(outcome, args.json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::testing::{read_zip, write_zip};
    use crate::fetch::testing::FakeSite;

    const SERIES: &str = "https://example.com/manga/moon-tales/";

    fn chapter_url(slug: &str) -> String {
        format!("{SERIES}{slug}/")
    }

    fn page_urls(slug: &str, count: usize) -> Vec<String> {
        (1..=count)
            .map(|n| format!("https://cdn.example.com/{slug}/{n}.jpg"))
            .collect()
    }

    fn site(chapters: &[(&str, Vec<String>)]) -> Arc<FakeSite> {
        let mut site = FakeSite::default();
        for (slug, pages) in chapters {
            let pages = pages.iter().map(String::as_str).collect::<Vec<_>>();
            site = site.with_chapter(&chapter_url(slug), &pages);
        }
        Arc::new(site)
    }

    fn orchestrator(site: &Arc<FakeSite>) -> SyncOrchestrator {
        SyncOrchestrator::new(
            site.clone(),
            site.clone(),
            site.clone(),
            FetchLimits::new(2, 2),
        )
    }

    fn options() -> SyncOptions {
        SyncOptions {
            title: "Moon Tales".to_owned(),
            exclude: BTreeSet::new(),
        }
    }

    fn names(path: &Path) -> anyhow::Result<Vec<String>> {
        Ok(read_zip(path)?.into_iter().map(|(name, _)| name).collect())
    }

    #[tokio::test]
    async fn update_fetches_only_missing_chapters() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let archive = temp.path().join("moon.cbz");
        write_zip(&archive, &[("chapter-1/page_001.jpg", b"kept")])?;
        let site = site(&[
            ("chapter-1", page_urls("chapter-1", 2)),
            ("chapter-2", page_urls("chapter-2", 2)),
        ]);

        let outcome = orchestrator(&site)
            .update(&archive, SERIES, &options())
            .await?;

        let SyncOutcome::Done(report) = outcome else {
            panic!("expected done, got {outcome:?}");
        };
        assert_eq!(report.fetched.len(), 1);
        assert_eq!(report.fetched[0].slug, "chapter-2");
        assert_eq!(report.archive.pages, 3);
        assert_eq!(site.fetch_count(), 2);
        assert_eq!(
            names(&archive)?,
            vec![
                "ComicInfo.xml",
                "chapter-1/page_001.jpg",
                "chapter-2/page_001.jpg",
                "chapter-2/page_002.jpg",
            ]
        );
        let entries = read_zip(&archive)?;
        assert_eq!(entries[1].1, b"kept");
        let xml = String::from_utf8(entries[0].1.clone())?;
        assert!(xml.contains("<Series>Moon Tales</Series>"));
        assert!(xml.contains("Bookmark=\"Chapter 2\" Type=\"Story\""));
        Ok(())
    }

    #[tokio::test]
    async fn update_is_up_to_date_when_nothing_is_missing() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let archive = temp.path().join("moon.cbz");
        write_zip(&archive, &[("chapter-1/page_001.jpg", b"kept")])?;
        let before = std::fs::read(&archive)?;
        let site = site(&[("chapter-1", page_urls("chapter-1", 1))]);

        let outcome = orchestrator(&site)
            .update(&archive, SERIES, &options())
            .await?;

        assert!(matches!(
            outcome,
            SyncOutcome::UpToDate {
                local_chapters: 1,
                ..
            }
        ));
        assert_eq!(std::fs::read(&archive)?, before);
        assert_eq!(site.fetch_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn update_aborts_when_source_lists_nothing() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let archive = temp.path().join("moon.cbz");
        write_zip(&archive, &[("chapter-1/page_001.jpg", b"kept")])?;
        let before = std::fs::read(&archive)?;
        let site = site(&[]);

        let empty = orchestrator(&site)
            .update(&archive, SERIES, &options())
            .await?;
        let unreachable = orchestrator(&site)
            .update(&archive, "https://example.com/manga/fail/", &options())
            .await?;

        assert!(matches!(
            empty,
            SyncOutcome::Aborted(SyncError::NoRemoteChapters)
        ));
        assert!(matches!(
            unreachable,
            SyncOutcome::Aborted(SyncError::NoRemoteChapters)
        ));
        assert_eq!(std::fs::read(&archive)?, before);
        Ok(())
    }

    #[tokio::test]
    async fn excluded_chapters_are_never_fetched() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let out = temp.path().join("moon.cbz");
        let site = site(&[
            ("chapter-1", page_urls("chapter-1", 1)),
            ("chapter-2", page_urls("chapter-2", 1)),
        ]);
        let mut options = options();
        options.exclude.insert("chapter-2".to_owned());

        let outcome = orchestrator(&site)
            .download(&DownloadTarget::Series(SERIES.to_owned()), &out, &options, false)
            .await?;

        let SyncOutcome::Done(report) = outcome else {
            panic!("expected done, got {outcome:?}");
        };
        assert_eq!(report.excluded, 1);
        assert_eq!(names(&out)?, vec!["ComicInfo.xml", "chapter-1/page_001.jpg"]);
        Ok(())
    }

    #[tokio::test]
    async fn partial_page_failure_still_reconciles() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let out = temp.path().join("moon.cbz");
        let mut pages = page_urls("chapter-1", 5);
        pages[2] = "https://cdn.example.com/chapter-1/fail.jpg".to_owned();
        let site = site(&[("chapter-1", pages)]);

        let outcome = orchestrator(&site)
            .download(&DownloadTarget::Series(SERIES.to_owned()), &out, &options(), false)
            .await?;

        let SyncOutcome::Done(report) = outcome else {
            panic!("expected done, got {outcome:?}");
        };
        assert_eq!(report.archive.pages, 4);
        assert_eq!(report.fetched[0].failed_pages.len(), 1);
        assert_eq!(report.fetched[0].failed_pages[0].position, 3);
        let xml = String::from_utf8(read_zip(&out)?[0].1.clone())?;
        assert!(xml.contains("<PageCount>4</PageCount>"));
        assert!(xml.contains("<Page Image=\"3\" />"));
        assert!(!xml.contains("<Page Image=\"4\""));
        Ok(())
    }

    #[tokio::test]
    async fn nothing_fetched_and_nothing_archived_fails_without_output() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let out = temp.path().join("moon.cbz");
        let site = site(&[
            (
                "chapter-1",
                vec!["https://cdn.example.com/fail-1.jpg".to_owned()],
            ),
            ("chapter-2", Vec::new()),
        ]);

        let outcome = orchestrator(&site)
            .download(&DownloadTarget::Series(SERIES.to_owned()), &out, &options(), false)
            .await?;

        assert!(matches!(outcome, SyncOutcome::Failed(SyncError::EmptyResult)));
        assert!(!out.exists());
        Ok(())
    }

    #[tokio::test]
    async fn download_refuses_existing_output_without_force() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let out = temp.path().join("moon.cbz");
        std::fs::write(&out, b"previous")?;
        let site = site(&[("chapter-1", page_urls("chapter-1", 1))]);
        let target = DownloadTarget::Series(SERIES.to_owned());

        let refused = orchestrator(&site)
            .download(&target, &out, &options(), false)
            .await;
        assert!(matches!(refused, Err(SyncError::OutputExists { .. })));
        assert_eq!(std::fs::read(&out)?, b"previous");

        let forced = orchestrator(&site)
            .download(&target, &out, &options(), true)
            .await?;
        assert!(matches!(forced, SyncOutcome::Done(_)));
        assert_eq!(names(&out)?, vec!["ComicInfo.xml", "chapter-1/page_001.jpg"]);
        Ok(())
    }

    #[tokio::test]
    async fn single_chapter_download_skips_the_chapter_list() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let out = temp.path().join("one.cbz");
        let mut fake = FakeSite::default();
        let url = chapter_url("chapter-7");
        let pages = page_urls("chapter-7", 2);
        fake.pages.insert(url.clone(), pages);
        let site = Arc::new(fake);
        let target = DownloadTarget::from_url(&url);

        let outcome = orchestrator(&site)
            .download(&target, &out, &options(), false)
            .await?;

        assert!(matches!(outcome, SyncOutcome::Done(_)));
        assert_eq!(
            names(&out)?,
            vec![
                "ComicInfo.xml",
                "chapter-7/page_001.jpg",
                "chapter-7/page_002.jpg",
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_archive_is_a_hard_error() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let archive = temp.path().join("moon.cbz");
        std::fs::write(&archive, b"not a zip")?;
        let site = site(&[("chapter-1", page_urls("chapter-1", 1))]);

        let result = orchestrator(&site)
            .update(&archive, SERIES, &options())
            .await;

        assert!(matches!(result, Err(SyncError::CorruptArchive { .. })));
        assert_eq!(site.fetch_count(), 0);
        Ok(())
    }

    #[test]
    fn download_target_detects_single_chapters() {
        assert_eq!(
            DownloadTarget::from_url("https://example.com/manga/moon-tales/chapter-3/"),
            DownloadTarget::Chapter("https://example.com/manga/moon-tales/chapter-3/".to_owned())
        );
        assert_eq!(
            DownloadTarget::from_url("https://example.com/manga/moon-tales/chapter-3"),
            DownloadTarget::Chapter("https://example.com/manga/moon-tales/chapter-3".to_owned())
        );
        assert_eq!(
            DownloadTarget::from_url("https://example.com/manga/moon-tales/"),
            DownloadTarget::Series("https://example.com/manga/moon-tales/".to_owned())
        );
    }

    #[test]
    fn default_titles_follow_the_url() {
        assert_eq!(
            DownloadTarget::from_url("https://example.com/manga/moon-tales/").default_title(),
            "Moon Tales"
        );
        assert_eq!(
            DownloadTarget::from_url("https://example.com/manga/moon-tales/chapter-3/")
                .default_title(),
            "chapter-3"
        );
    }

    #[test]
    fn archive_file_name_replaces_separators() {
        assert_eq!(archive_file_name("Moon Tales"), "Moon Tales.cbz");
        assert_eq!(archive_file_name("A/B"), "A_B.cbz");
    }

    #[test]
    fn select_requests_dedups_and_counts_exclusions() {
        let remote = vec![
            chapter_url("chapter-1"),
            chapter_url("chapter-2"),
            chapter_url("chapter-2"),
            chapter_url("chapter-3"),
        ];
        let exclude = BTreeSet::from(["chapter-3".to_owned()]);
        let local = BTreeSet::from(["chapter-1".to_owned()]);

        let (requests, excluded) = select_requests(remote, &exclude, &local);

        assert_eq!(excluded, 1);
        assert_eq!(
            requests,
            vec![ChapterRequest {
                slug: "chapter-2".to_owned(),
                location: chapter_url("chapter-2"),
            }]
        );
    }

    #[test]
    fn outcome_json_is_tagged_by_status() -> anyhow::Result<()> {
        let outcome = SyncOutcome::Aborted(SyncError::NoRemoteChapters);
        let value: serde_json::Value = serde_json::from_str(&outcome.to_json()?)?;
        assert_eq!(value["status"], "aborted");
        assert_eq!(value["reason"], "source returned no chapters");
        Ok(())
    }
}
