use std::sync::LazyLock;

use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, REFERER, USER_AGENT};
use scraper::{Html, Selector};
use url::Url;

use crate::config::HttpSettings;

/// Lists the chapter locations of a series, oldest first.
#[async_trait]
pub trait ChapterLister: Send + Sync {
    async fn list_chapters(&self, series: &str) -> anyhow::Result<Vec<String>>;
}

/// Lists the image locations of one chapter in reading order.
#[async_trait]
pub trait PageLister: Send + Sync {
    async fn list_pages(&self, chapter: &str) -> anyhow::Result<Vec<String>>;
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, location: &str) -> anyhow::Result<Vec<u8>>;
}

static CHAPTER_LINKS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("li.wp-manga-chapter a[href]").expect("chapter selector is valid")
});

static PAGE_IMAGES: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("img.wp-manga-chapter-img").expect("page image selector is valid")
});

/// Collaborators for Madara-style WordPress manga sites over one HTTP client.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    user_agent: String,
}

impl HttpSource {
    pub fn new(settings: &HttpSettings) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            user_agent: settings.user_agent.clone(),
        })
    }

    async fn get(&self, url: &Url, accept: &str) -> anyhow::Result<reqwest::Response> {
        let response = self
            .client
            .get(url.clone())
            .header(USER_AGENT, &self.user_agent)
            .header(ACCEPT, accept)
            .header(REFERER, url.origin().ascii_serialization())
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("GET {url}: http status {status}");
        }
        Ok(response)
    }

    async fn get_html(&self, location: &str) -> anyhow::Result<(Url, String)> {
        let url = Url::parse(location).with_context(|| format!("parse url {location}"))?;
        let response = self
            .get(&url, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
            .await?;
        let final_url = response.url().clone();
        let body = response
            .text()
            .await
            .with_context(|| format!("read body of {url}"))?;
        Ok((final_url, body))
    }
}

#[async_trait]
impl ChapterLister for HttpSource {
    async fn list_chapters(&self, series: &str) -> anyhow::Result<Vec<String>> {
        let (base, body) = self.get_html(series).await?;
        let chapters = chapter_links(&base, &body);
        tracing::debug!(url = %base, chapters = chapters.len(), "listed chapters");
        Ok(chapters)
    }
}

#[async_trait]
impl PageLister for HttpSource {
    async fn list_pages(&self, chapter: &str) -> anyhow::Result<Vec<String>> {
        let (base, body) = self.get_html(chapter).await?;
        let pages = page_images(&base, &body);
        tracing::debug!(url = %base, pages = pages.len(), "listed pages");
        Ok(pages)
    }
}

#[async_trait]
impl Fetcher for HttpSource {
    async fn fetch(&self, location: &str) -> anyhow::Result<Vec<u8>> {
        let url = Url::parse(location).with_context(|| format!("parse url {location}"))?;
        let response = self.get(&url, "image/*,*/*;q=0.8").await?;
        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("read body of {url}"))?;
        Ok(bytes.to_vec())
    }
}

/// Chapter links of a series page, oldest first. The page lists newest first.
fn chapter_links(base: &Url, html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut links = Vec::new();
    for element in document.select(&CHAPTER_LINKS) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        if let Some(url) = resolve(base, href) {
            if !links.contains(&url) {
                links.push(url);
            }
        }
    }
    links.reverse();
    links
}

fn page_images(base: &Url, html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    document
        .select(&PAGE_IMAGES)
        .filter_map(|img| {
            let attrs = img.value();
            let src = attrs
                .attr("src")
                .map(str::trim)
                .filter(|src| !src.is_empty())
                .or_else(|| {
                    attrs
                        .attr("data-src")
                        .map(str::trim)
                        .filter(|src| !src.is_empty())
                })?;
            resolve(base, src)
        })
        .collect()
}

fn resolve(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    match base.join(href) {
        Ok(url) => Some(url.to_string()),
        Err(err) => {
            tracing::warn!(base = %base, href = %href, ?err, "skipping unresolvable link");
            None
        }
    }
}
