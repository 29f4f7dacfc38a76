use std::time::Duration;

use anyhow::Context as _;

pub const DEFAULT_PAGE_WORKERS: usize = 10;
pub const DEFAULT_CHAPTER_WORKERS: usize = 4;
pub const DEFAULT_BATCH_WORKERS: usize = 4;

const USER_AGENT_ENV: &str = "MANGASYNC_USER_AGENT";
const TIMEOUT_ENV: &str = "MANGASYNC_TIMEOUT_SECS";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Concurrency limits for one sync. Pages in flight are bounded by
/// `chapter_workers * page_workers`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchLimits {
    pub page_workers: usize,
    pub chapter_workers: usize,
}

impl FetchLimits {
    pub fn new(page_workers: usize, chapter_workers: usize) -> Self {
        Self {
            page_workers: page_workers.max(1),
            chapter_workers: chapter_workers.max(1),
        }
    }

    pub fn max_in_flight(&self) -> usize {
        self.chapter_workers.saturating_mul(self.page_workers)
    }
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_WORKERS, DEFAULT_CHAPTER_WORKERS)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSettings {
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl HttpSettings {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut settings = Self::default();

        if let Some(user_agent) = lookup(USER_AGENT_ENV) {
            let user_agent = user_agent.trim();
            if user_agent.is_empty() {
                anyhow::bail!("{USER_AGENT_ENV} must not be empty");
            }
            settings.user_agent = user_agent.to_owned();
        }

        if let Some(raw) = lookup(TIMEOUT_ENV) {
            let secs = raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("parse {TIMEOUT_ENV}={raw:?}"))?;
            if secs == 0 {
                anyhow::bail!("{TIMEOUT_ENV} must be greater than zero");
            }
            settings.timeout = Duration::from_secs(secs);
        }

        Ok(settings)
    }
}
