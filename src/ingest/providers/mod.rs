// src/ingest/providers/mod.rs
//! Feed + scrape adapters.
//!
//! Every outlet runs the same loop (read feed, cap entries, scrape each link,
//! apply the quality gate, build items); outlets differ only in their
//! [`OutletSpec`]: feed URL, entry cap, minimum body length, fallback policy
//! and title cleanup.

pub mod cnbc;
pub mod financial_juice;
pub mod social;
pub mod zerohedge;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

use crate::ingest::batch::run_batched;
use crate::ingest::config::IngestConfig;
use crate::ingest::feed::{timestamp_or, FeedReader};
use crate::ingest::fetcher::ContentFetcher;
use crate::ingest::resolution::{resolve_content, ContentResolution, FallbackPolicy};
use crate::ingest::types::{NewsItem, RawFeedEntry, SourceAdapter, SourceId};
use crate::ingest::{canonical_url, normalize_text, MAX_FEED_TEXT_CHARS};

#[derive(Debug, Clone)]
pub struct OutletSpec {
    pub source: SourceId,
    pub feed_url: String,
    /// Entries processed per run; each one costs a page render.
    pub limit: usize,
    pub min_content_len: usize,
    pub policy: FallbackPolicy,
    pub clean_title: fn(&str) -> String,
}

/// Built-in definition for `source`.
pub fn default_spec(source: SourceId) -> OutletSpec {
    match source {
        SourceId::ZeroHedge => zerohedge::spec(),
        SourceId::Cnbc => cnbc::spec(),
        SourceId::FinancialJuice => financial_juice::spec(),
        SourceId::Social => social::spec(),
    }
}

/// Built-in definition with the config's overrides applied, or `None` when
/// the outlet is disabled.
pub fn configured_spec(source: SourceId, cfg: &IngestConfig) -> Option<OutletSpec> {
    let mut spec = default_spec(source);
    if let Some(o) = cfg.source(source.as_str()) {
        if !o.enabled {
            return None;
        }
        if let Some(url) = &o.feed_url {
            spec.feed_url = url.clone();
        }
        if let Some(limit) = o.limit {
            spec.limit = limit;
        }
        if let Some(min) = o.min_content_len {
            spec.min_content_len = min;
        }
        if let Some(policy) = o.policy {
            spec.policy = policy;
        }
    }
    Some(spec)
}

/// One adapter per enabled outlet, in [`SourceId::ALL`] order.
pub fn build_adapters(
    cfg: &IngestConfig,
    reader: Arc<FeedReader>,
    fetcher: Arc<dyn ContentFetcher>,
) -> Vec<Arc<dyn SourceAdapter>> {
    for s in &cfg.sources {
        if SourceId::parse(&s.name).is_none() {
            tracing::warn!(name = %s.name, "ignoring config for unknown source");
        }
    }
    SourceId::ALL
        .into_iter()
        .filter_map(|id| configured_spec(id, cfg))
        .map(|spec| {
            Arc::new(
                FeedScrapeProvider::new(spec, reader.clone(), fetcher.clone())
                    .with_concurrency(cfg.entry_concurrency),
            ) as Arc<dyn SourceAdapter>
        })
        .collect()
}

#[derive(Debug, Error)]
enum EntryRejected {
    #[error("missing title")]
    MissingTitle,
    #[error("missing link")]
    MissingLink,
    #[error("link is not an absolute http(s) url: {0}")]
    BadLink(String),
    #[error("content below {min} chars")]
    ThinContent { min: usize },
}

pub struct FeedScrapeProvider {
    spec: OutletSpec,
    reader: Arc<FeedReader>,
    fetcher: Arc<dyn ContentFetcher>,
    concurrency: usize,
}

impl FeedScrapeProvider {
    pub fn new(spec: OutletSpec, reader: Arc<FeedReader>, fetcher: Arc<dyn ContentFetcher>) -> Self {
        let concurrency = spec.limit.max(1);
        Self {
            spec,
            reader,
            fetcher,
            concurrency,
        }
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn spec(&self) -> &OutletSpec {
        &self.spec
    }

    async fn build_item(
        &self,
        entry: RawFeedEntry,
        now: DateTime<Utc>,
    ) -> std::result::Result<NewsItem, EntryRejected> {
        let source = self.spec.source;
        let title = (self.spec.clean_title)(&normalize_text(&entry.title, MAX_FEED_TEXT_CHARS));
        if title.is_empty() {
            return Err(self.reject(EntryRejected::MissingTitle, &entry.link));
        }
        if entry.link.trim().is_empty() {
            return Err(self.reject(EntryRejected::MissingLink, &title));
        }
        let url = canonical_url(&entry.link)
            .ok_or_else(|| self.reject(EntryRejected::BadLink(entry.link.clone()), &title))?;

        let scraped = self.fetcher.scrape_article(&url).await;
        let description = normalize_text(&entry.description, MAX_FEED_TEXT_CHARS);
        let resolution = resolve_content(
            self.spec.policy,
            self.spec.min_content_len,
            &scraped,
            &description,
            &title,
        );
        tracing::debug!(%source, %url, resolution = resolution.kind(), "content resolved");

        let content = match resolution {
            ContentResolution::Dropped => {
                return Err(self.reject(
                    EntryRejected::ThinContent {
                        min: self.spec.min_content_len,
                    },
                    &url,
                ))
            }
            other => other.into_content().unwrap_or_default(),
        };

        Ok(NewsItem {
            title,
            source,
            url,
            timestamp: timestamp_or(&entry.pub_date, now),
            content,
        })
    }

    fn reject(&self, why: EntryRejected, what: &str) -> EntryRejected {
        tracing::debug!(source = %self.spec.source, entry = %what, reason = %why, "entry dropped");
        counter!("ingest_dropped_total").increment(1);
        why
    }
}

#[async_trait]
impl SourceAdapter for FeedScrapeProvider {
    async fn fetch_latest(&self) -> Result<Vec<NewsItem>> {
        let source = self.spec.source;
        let entries = self
            .reader
            .read(&self.spec.feed_url, Some(self.spec.limit))
            .await;
        if entries.is_empty() {
            tracing::info!(%source, feed = %self.spec.feed_url, "feed returned no entries");
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let built = run_batched(entries, self.concurrency, |e| self.build_item(e, now)).await;

        let mut seen = HashSet::new();
        let items: Vec<NewsItem> = built
            .into_iter()
            .flatten()
            .filter(|it| seen.insert(it.url.clone()))
            .collect();

        counter!("ingest_items_total").increment(items.len() as u64);
        tracing::info!(%source, items = items.len(), "adapter finished");
        Ok(items)
    }

    fn source(&self) -> SourceId {
        self.spec.source
    }
}

/// Title cleanup shared by outlets that need none.
pub fn keep_title(title: &str) -> String {
    title.trim().to_string()
}
