// src/ingest/fetcher.rs
//! Article body extraction through a headless browser.
//!
//! [`BrowserSession`] talks to a Browserless-compatible `/content` endpoint:
//! the remote browser renders the page (scripts included) and hands back the
//! final HTML, which is reduced to readable paragraphs locally. The session is
//! opened once per run and shared by every adapter; each call holds its own
//! page slot for exactly as long as the render takes.

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::ingest::normalize_text;

/// Hard cap for a scraped article body.
pub const MAX_ARTICLE_CHARS: usize = 20_000;

#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Best-effort article text. Empty on failure; never an error.
    async fn scrape_article(&self, url: &str) -> String;
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("browser session is closed")]
    Closed,

    #[error("network error: {0}")]
    Network(String),

    #[error("render failed (status {status}): {message}")]
    Render { status: u16, message: String },

    #[error("page load timed out after {0:?}")]
    Timeout(Duration),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Network(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Base URL of the rendering service, e.g. `http://localhost:3000`.
    pub endpoint: String,
    pub token: Option<String>,
    pub page_timeout: Duration,
    /// Upper bound on concurrently open pages across all adapters.
    pub max_open_pages: usize,
    pub user_agent: String,
}

/// A page slot. Dropping it frees the slot, whichever way the call ended.
struct Page {
    _permit: OwnedSemaphorePermit,
    open: Arc<AtomicUsize>,
}

impl Drop for Page {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct BrowserSession {
    client: reqwest::Client,
    content_url: String,
    user_agent: String,
    page_timeout: Duration,
    pages: Arc<Semaphore>,
    open: Arc<AtomicUsize>,
}

impl BrowserSession {
    pub async fn init(cfg: &BrowserConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(cfg.user_agent.as_str())
            .build()
            .context("building browser session client")?;

        let mut content_url = format!("{}/content", cfg.endpoint.trim_end_matches('/'));
        if let Some(token) = cfg.token.as_deref().filter(|t| !t.is_empty()) {
            content_url.push_str(&format!("?token={token}"));
        }

        let slots = cfg.max_open_pages.max(1);
        tracing::info!(
            endpoint = %cfg.endpoint,
            max_open_pages = slots,
            page_timeout_secs = cfg.page_timeout.as_secs(),
            "browser session opened"
        );

        Ok(Self {
            client,
            content_url,
            user_agent: cfg.user_agent.clone(),
            page_timeout: cfg.page_timeout,
            pages: Arc::new(Semaphore::new(slots)),
            open: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Stop handing out pages and wait (bounded by the page timeout) for the
    /// ones in flight to finish. Safe to call more than once.
    pub async fn close(&self) {
        if self.pages.is_closed() {
            return;
        }
        self.pages.close();
        let deadline = tokio::time::Instant::now() + self.page_timeout;
        while self.open_pages() > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        tracing::info!(still_open = self.open_pages(), "browser session closed");
    }

    pub fn is_closed(&self) -> bool {
        self.pages.is_closed()
    }

    /// Pages currently held by in-flight scrapes.
    pub fn open_pages(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    async fn open_page(&self) -> Result<Page, FetchError> {
        let permit = self
            .pages
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| FetchError::Closed)?;
        self.open.fetch_add(1, Ordering::SeqCst);
        Ok(Page {
            _permit: permit,
            open: self.open.clone(),
        })
    }

    /// Rendered HTML of `url`.
    pub async fn render(&self, url: &str) -> Result<String, FetchError> {
        let _page = self.open_page().await?;

        let body = serde_json::json!({
            "url": url,
            "userAgent": self.user_agent,
            "gotoOptions": {
                "waitUntil": "domcontentloaded",
                "timeout": self.page_timeout.as_millis() as u64,
            },
            "rejectResourceTypes": ["image", "media", "font", "stylesheet"],
        });

        let call = async {
            let resp = self
                .client
                .post(&self.content_url)
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await?;
            let status = resp.status();
            if !status.is_success() {
                let message = resp.text().await.unwrap_or_default();
                return Err(FetchError::Render {
                    status: status.as_u16(),
                    message,
                });
            }
            Ok(resp.text().await?)
        };

        match tokio::time::timeout(self.page_timeout, call).await {
            Ok(res) => res,
            Err(_) => Err(FetchError::Timeout(self.page_timeout)),
        }
    }
}

#[async_trait]
impl ContentFetcher for BrowserSession {
    async fn scrape_article(&self, url: &str) -> String {
        let t0 = std::time::Instant::now();
        counter!("ingest_scrape_total").increment(1);

        let out = match self.render(url).await {
            Ok(html) => extract_readable_text(&html),
            Err(e) => {
                tracing::warn!(error = %e, %url, "scrape failed");
                counter!("ingest_scrape_errors_total").increment(1);
                String::new()
            }
        };

        histogram!("ingest_scrape_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        tracing::debug!(%url, chars = out.chars().count(), "scraped article");
        out
    }
}

static CANDIDATES: Lazy<Vec<Selector>> = Lazy::new(|| {
    [
        "[itemprop=\"articleBody\"] p",
        "article p",
        "main p",
        ".article-content p",
        ".group p",
        "p",
    ]
    .iter()
    .map(|s| Selector::parse(s).expect("static selector"))
    .collect()
});

/// Enough text to stop trying broader selectors.
const GOOD_ENOUGH_CHARS: usize = 200;

/// Pull paragraph text out of rendered HTML.
///
/// Tries the most article-specific selectors first and stops at the first one
/// that yields a real body; otherwise keeps the longest candidate.
pub fn extract_readable_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let mut best = String::new();

    for sel in CANDIDATES.iter() {
        let paragraphs: Vec<String> = doc
            .select(sel)
            .map(|el| normalize_text(&el.text().collect::<Vec<_>>().join(" "), MAX_ARTICLE_CHARS))
            .filter(|p| p.chars().count() > 1)
            .collect();
        let text = paragraphs.join("\n\n");
        let len = text.chars().count();
        if len >= GOOD_ENOUGH_CHARS {
            best = text;
            break;
        }
        if len > best.chars().count() {
            best = text;
        }
    }

    if best.chars().count() > MAX_ARTICLE_CHARS {
        best = best.chars().take(MAX_ARTICLE_CHARS).collect();
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_article_paragraphs_over_page_chrome() {
        let body = "The Federal Reserve held rates steady on Wednesday. ".repeat(6);
        let html = format!(
            r#"<html><body>
            <nav><p>Subscribe now</p></nav>
            <article><h1>Fed</h1><p>{body}</p><p>Second&nbsp;paragraph.</p></article>
            <footer><p>Cookie policy</p></footer>
            </body></html>"#
        );
        let text = extract_readable_text(&html);
        assert!(text.starts_with("The Federal Reserve held rates"));
        assert!(text.contains("\n\nSecond paragraph."));
        assert!(!text.contains("Subscribe"));
        assert!(!text.contains("Cookie"));
    }

    #[test]
    fn falls_back_to_longest_candidate_when_page_is_thin() {
        let html = "<html><body><p>Only a teaser here.</p></body></html>";
        assert_eq!(extract_readable_text(html), "Only a teaser here.");
    }

    #[test]
    fn empty_or_scriptless_page_gives_empty_text() {
        assert_eq!(extract_readable_text(""), "");
        assert_eq!(
            extract_readable_text("<html><script>var x = 1;</script></html>"),
            ""
        );
    }

    #[test]
    fn body_is_capped() {
        let p = "word ".repeat(3_000);
        let html = format!("<article><p>{p}</p><p>{p}</p></article>");
        assert!(extract_readable_text(&html).chars().count() <= MAX_ARTICLE_CHARS);
    }

    #[tokio::test]
    async fn closed_session_scrapes_nothing_and_holds_no_pages() {
        let s = BrowserSession::init(&BrowserConfig {
            endpoint: "http://127.0.0.1:9".into(),
            token: None,
            page_timeout: Duration::from_millis(200),
            max_open_pages: 2,
            user_agent: "test".into(),
        })
        .await
        .unwrap();
        s.close().await;
        assert!(s.is_closed());
        assert!(matches!(s.render("https://a.test").await, Err(FetchError::Closed)));
        assert_eq!(s.scrape_article("https://a.test").await, "");
        assert_eq!(s.open_pages(), 0);
        // second close is a no-op
        s.close().await;
    }
}
