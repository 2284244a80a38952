// src/ingest/aggregator.rs
//! Runs every adapter, merges their output and drives persistence.
//!
//! Adapters are independent failure domains: an error, a panic or a blown
//! deadline in one of them is logged and counted as zero items for that
//! source while the others carry on. Store failures are never swallowed; they
//! end up in the [`SaveReport`] the caller gets back.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::FutureExt;
use metrics::{counter, gauge};
use std::collections::HashSet;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use crate::ingest::batch::panic_message;
use crate::ingest::config::IngestConfig;
use crate::ingest::ensure_metrics_described;
use crate::ingest::feed::FeedReader;
use crate::ingest::fetcher::{BrowserSession, ContentFetcher};
use crate::ingest::providers::build_adapters;
use crate::ingest::types::{NewsItem, SourceAdapter, SourceId};
use crate::store::NewsStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReport {
    pub source: SourceId,
    pub items: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistFailure {
    pub url: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveReport {
    pub inserted: usize,
    pub skipped: usize,
    /// Items refused before reaching the store (blank title or url).
    pub rejected: usize,
    pub failures: Vec<PersistFailure>,
}

impl SaveReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub sources: Vec<SourceReport>,
    /// Items after merge and in-run dedup.
    pub fetched: usize,
    /// `None` for fetch-only runs.
    pub save: Option<SaveReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn adapter_errors(&self) -> impl Iterator<Item = &SourceReport> {
        self.sources.iter().filter(|s| s.error.is_some())
    }

    /// True only when there was at least one adapter and every one failed.
    pub fn all_sources_failed(&self) -> bool {
        !self.sources.is_empty() && self.sources.iter().all(|s| s.error.is_some())
    }

    pub fn is_degraded(&self) -> bool {
        self.adapter_errors().next().is_some()
            || self.save.as_ref().is_some_and(|s| !s.is_clean())
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for s in &self.sources {
            match &s.error {
                Some(e) => writeln!(f, "{}: {} items (error: {e})", s.source, s.items)?,
                None => writeln!(f, "{}: {} items", s.source, s.items)?,
            }
        }
        write!(f, "total: {} items", self.fetched)?;
        if let Some(save) = &self.save {
            write!(
                f,
                ", {} new, {} already stored, {} failed",
                save.inserted,
                save.skipped,
                save.failures.len()
            )?;
            if save.rejected > 0 {
                write!(f, ", {} rejected", save.rejected)?;
            }
        }
        Ok(())
    }
}

/// Merged, deduplicated items plus per-source accounting.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub items: Vec<NewsItem>,
    pub sources: Vec<SourceReport>,
}

pub struct NewsAggregator {
    cfg: IngestConfig,
    store: Arc<dyn NewsStore>,
    session: Option<Arc<BrowserSession>>,
    adapters: Vec<Arc<dyn SourceAdapter>>,
}

impl NewsAggregator {
    /// Not usable until [`NewsAggregator::init`] has opened the browser session.
    pub fn new(cfg: IngestConfig, store: Arc<dyn NewsStore>) -> Self {
        ensure_metrics_described();
        Self {
            cfg,
            store,
            session: None,
            adapters: Vec::new(),
        }
    }

    /// Ready-made aggregator over caller-supplied adapters; no browser session.
    pub fn with_adapters(
        cfg: IngestConfig,
        adapters: Vec<Arc<dyn SourceAdapter>>,
        store: Arc<dyn NewsStore>,
    ) -> Self {
        ensure_metrics_described();
        Self {
            cfg,
            store,
            session: None,
            adapters,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.session.is_some()
    }

    /// Open the shared browser session and build the configured adapters.
    /// A no-op when already initialized.
    pub async fn init(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }
        let session = Arc::new(
            BrowserSession::init(&self.cfg.browser_config())
                .await
                .context("opening browser session")?,
        );
        let reader = Arc::new(FeedReader::new(&self.cfg.user_agent, self.cfg.feed_timeout())?);
        let fetcher: Arc<dyn ContentFetcher> = session.clone();
        self.adapters = build_adapters(&self.cfg, reader, fetcher);
        self.session = Some(session);
        tracing::info!(
            target: "ingest",
            adapters = self.adapters.len(),
            "aggregator initialized"
        );
        Ok(())
    }

    /// Tear down the browser session. Adapters built on it are dropped too.
    pub async fn close(&mut self) {
        if let Some(session) = self.session.take() {
            session.close().await;
            self.adapters.clear();
        }
    }

    pub fn sources(&self) -> Vec<SourceId> {
        self.adapters.iter().map(|a| a.source()).collect()
    }

    /// Fetch-only mode: run all adapters concurrently and merge, no writes.
    pub async fn fetch_all_news(&self) -> FetchOutcome {
        if self.adapters.is_empty() {
            tracing::warn!(target: "ingest", "no adapters configured; was init() called?");
        }
        let deadline = self.cfg.adapter_deadline();
        let results = join_all(
            self.adapters
                .iter()
                .map(|a| async move { (a.source(), run_adapter(a.as_ref(), deadline).await) }),
        )
        .await;

        let mut sources = Vec::with_capacity(results.len());
        let mut merged = Vec::new();
        for (source, res) in results {
            match res {
                Ok(items) => {
                    sources.push(SourceReport {
                        source,
                        items: items.len(),
                        error: None,
                    });
                    merged.extend(items);
                }
                Err(e) => {
                    tracing::warn!(target: "ingest", %source, error = ?e, "adapter failed");
                    counter!("ingest_adapter_errors_total").increment(1);
                    sources.push(SourceReport {
                        source,
                        items: 0,
                        error: Some(format!("{e:#}")),
                    });
                }
            }
        }

        FetchOutcome {
            items: dedup_by_url(merged),
            sources,
        }
    }

    /// Run one named adapter. Unknown or disabled names are errors.
    pub async fn fetch_news_from_source(&self, name: &str) -> Result<Vec<NewsItem>> {
        let id = SourceId::parse(name).ok_or_else(|| anyhow!("unknown source: {name}"))?;
        let Some(adapter) = self.adapters.iter().find(|a| a.source() == id) else {
            bail!("source {id} is not enabled");
        };
        let items = run_adapter(adapter.as_ref(), self.cfg.adapter_deadline())
            .await
            .with_context(|| format!("fetching {id}"))?;
        Ok(dedup_by_url(items))
    }

    /// Insert-or-skip each item in order. Store errors are collected, not fatal.
    pub async fn save_news_to_database(&self, items: &[NewsItem]) -> SaveReport {
        let mut report = SaveReport::default();
        for item in items {
            if !item.is_persistable() {
                tracing::warn!(url = %item.url, "refusing to store item without title or url");
                report.rejected += 1;
                continue;
            }
            match self.save_one(item).await {
                Ok(true) => report.inserted += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    tracing::error!(
                        target: "ingest",
                        source = %item.source,
                        url = %item.url,
                        error = ?e,
                        "failed to store news item"
                    );
                    report.failures.push(PersistFailure {
                        url: item.url.clone(),
                        error: format!("{e:#}"),
                    });
                }
            }
        }

        counter!("ingest_inserted_total").increment(report.inserted as u64);
        counter!("ingest_skipped_total").increment(report.skipped as u64);
        counter!("ingest_persist_errors_total").increment(report.failures.len() as u64);
        report
    }

    async fn save_one(&self, item: &NewsItem) -> Result<bool> {
        if self.store.exists_by_url(&item.url).await? {
            return Ok(false);
        }
        self.store.insert_if_not_exists(item).await
    }

    /// Fetch everything and persist what is new.
    pub async fn fetch_and_save_all_news(&self) -> RunReport {
        let started_at = Utc::now();
        let outcome = self.fetch_all_news().await;
        let save = self.save_news_to_database(&outcome.items).await;
        self.finish(started_at, outcome, Some(save))
    }

    /// Fetch-only counterpart of [`NewsAggregator::fetch_and_save_all_news`].
    pub async fn fetch_report(&self) -> (RunReport, Vec<NewsItem>) {
        let started_at = Utc::now();
        let outcome = self.fetch_all_news().await;
        let items = outcome.items.clone();
        (self.finish(started_at, outcome, None), items)
    }

    /// `init`, one run, `close`; the session is closed even when the run degrades.
    pub async fn run_once(&mut self, persist: bool) -> Result<RunReport> {
        self.init().await?;
        let report = if persist {
            self.fetch_and_save_all_news().await
        } else {
            self.fetch_report().await.0
        };
        self.close().await;
        Ok(report)
    }

    fn finish(
        &self,
        started_at: DateTime<Utc>,
        outcome: FetchOutcome,
        save: Option<SaveReport>,
    ) -> RunReport {
        let report = RunReport {
            sources: outcome.sources,
            fetched: outcome.items.len(),
            save,
            started_at,
            finished_at: Utc::now(),
        };
        gauge!("ingest_last_run_ts").set(report.finished_at.timestamp() as f64);
        tracing::info!(
            target: "ingest",
            fetched = report.fetched,
            failed_sources = report.adapter_errors().count(),
            inserted = report.save.as_ref().map(|s| s.inserted),
            skipped = report.save.as_ref().map(|s| s.skipped),
            rejected = report.save.as_ref().map(|s| s.rejected),
            degraded = report.is_degraded(),
            "ingest run finished"
        );
        report
    }
}

async fn run_adapter(adapter: &dyn SourceAdapter, deadline: Option<Duration>) -> Result<Vec<NewsItem>> {
    let fut = AssertUnwindSafe(adapter.fetch_latest()).catch_unwind();
    let res = match deadline {
        Some(d) => tokio::time::timeout(d, fut)
            .await
            .map_err(|_| anyhow!("adapter deadline of {d:?} exceeded"))?,
        None => fut.await,
    };
    res.unwrap_or_else(|panic| Err(anyhow!("adapter panicked: {}", panic_message(panic.as_ref()))))
}

/// First occurrence of each URL wins; order is otherwise preserved.
pub fn dedup_by_url(items: Vec<NewsItem>) -> Vec<NewsItem> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|it| seen.insert(it.url.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    fn item(source: SourceId, url: &str) -> NewsItem {
        NewsItem {
            title: format!("title {url}"),
            source,
            url: url.into(),
            timestamp: Utc::now(),
            content: "c".repeat(60),
        }
    }

    struct Fixed(SourceId, Vec<NewsItem>);

    #[async_trait]
    impl SourceAdapter for Fixed {
        async fn fetch_latest(&self) -> Result<Vec<NewsItem>> {
            Ok(self.1.clone())
        }
        fn source(&self) -> SourceId {
            self.0
        }
    }

    struct Panics;

    #[async_trait]
    impl SourceAdapter for Panics {
        async fn fetch_latest(&self) -> Result<Vec<NewsItem>> {
            panic!("selector exploded")
        }
        fn source(&self) -> SourceId {
            SourceId::Social
        }
    }

    struct Slow;

    #[async_trait]
    impl SourceAdapter for Slow {
        async fn fetch_latest(&self) -> Result<Vec<NewsItem>> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(vec![])
        }
        fn source(&self) -> SourceId {
            SourceId::FinancialJuice
        }
    }

    #[tokio::test]
    async fn panicking_adapter_is_isolated() {
        let agg = NewsAggregator::with_adapters(
            IngestConfig::default(),
            vec![
                Arc::new(Fixed(SourceId::Cnbc, vec![item(SourceId::Cnbc, "https://a.test/1")])),
                Arc::new(Panics),
            ],
            Arc::new(MemoryStore::new()),
        );
        let out = agg.fetch_all_news().await;
        assert_eq!(out.items.len(), 1);
        assert_eq!(out.sources[1].items, 0);
        assert!(out.sources[1]
            .error
            .as_deref()
            .unwrap()
            .contains("selector exploded"));
    }

    #[tokio::test]
    async fn deadline_cuts_off_slow_adapter() {
        let cfg = IngestConfig {
            adapter_deadline_secs: Some(1),
            ..IngestConfig::default()
        };
        let agg = NewsAggregator::with_adapters(
            cfg,
            vec![
                Arc::new(Slow),
                Arc::new(Fixed(SourceId::Cnbc, vec![item(SourceId::Cnbc, "https://a.test/1")])),
            ],
            Arc::new(MemoryStore::new()),
        );
        let out = agg.fetch_all_news().await;
        assert_eq!(out.items.len(), 1);
        assert!(out.sources[0].error.as_deref().unwrap().contains("deadline"));
    }

    #[tokio::test]
    async fn cross_adapter_duplicates_keep_first_adapter() {
        let agg = NewsAggregator::with_adapters(
            IngestConfig::default(),
            vec![
                Arc::new(Fixed(SourceId::ZeroHedge, vec![item(SourceId::ZeroHedge, "https://a.test/x")])),
                Arc::new(Fixed(SourceId::Cnbc, vec![item(SourceId::Cnbc, "https://a.test/x")])),
            ],
            Arc::new(MemoryStore::new()),
        );
        let out = agg.fetch_all_news().await;
        assert_eq!(out.items.len(), 1);
        assert_eq!(out.items[0].source, SourceId::ZeroHedge);
        assert_eq!(out.sources[1].items, 1);
    }

    #[tokio::test]
    async fn fetch_from_named_source() {
        let agg = NewsAggregator::with_adapters(
            IngestConfig::default(),
            vec![Arc::new(Fixed(SourceId::Cnbc, vec![item(SourceId::Cnbc, "https://a.test/1")]))],
            Arc::new(MemoryStore::new()),
        );
        assert_eq!(agg.fetch_news_from_source("cnbc").await.unwrap().len(), 1);
        assert!(agg.fetch_news_from_source("zerohedge").await.is_err());
        assert!(agg.fetch_news_from_source("bloomberg").await.is_err());
    }

    #[tokio::test]
    async fn unpersistable_items_are_counted_as_rejected() {
        let store = Arc::new(MemoryStore::new());
        let agg = NewsAggregator::with_adapters(IngestConfig::default(), vec![], store.clone());
        let mut blank = item(SourceId::Cnbc, "https://a.test/blank");
        blank.title = "  ".into();
        let report = agg
            .save_news_to_database(&[item(SourceId::Cnbc, "https://a.test/1"), blank])
            .await;
        assert_eq!(report.inserted, 1);
        assert_eq!(report.rejected, 1);
        assert!(report.is_clean());
        assert_eq!(store.len(), 1);

        let now = Utc::now();
        let r = RunReport {
            sources: vec![SourceReport { source: SourceId::Cnbc, items: 2, error: None }],
            fetched: 2,
            save: Some(report),
            started_at: now,
            finished_at: now,
        };
        assert!(r.to_string().ends_with("1 new, 0 already stored, 0 failed, 1 rejected"));
    }

    #[test]
    fn report_flags() {
        let now = Utc::now();
        let mut r = RunReport {
            sources: vec![
                SourceReport { source: SourceId::Cnbc, items: 2, error: None },
                SourceReport { source: SourceId::Social, items: 0, error: Some("down".into()) },
            ],
            fetched: 2,
            save: Some(SaveReport { inserted: 1, skipped: 1, rejected: 0, failures: vec![] }),
            started_at: now,
            finished_at: now,
        };
        assert!(r.is_degraded());
        assert!(!r.all_sources_failed());
        let text = r.to_string();
        assert!(text.contains("CNBC: 2 items"));
        assert!(text.contains("Social: 0 items (error: down)"));
        assert!(text.contains("1 new, 1 already stored, 0 failed"));

        r.sources[0].error = Some("down too".into());
        assert!(r.all_sources_failed());

        r.sources.clear();
        r.save = Some(SaveReport::default());
        assert!(!r.all_sources_failed());
        assert!(!r.is_degraded());
    }
}
