// src/store/mod.rs
//! Persistence boundary.
//!
//! The pipeline only needs insert-or-skip keyed by URL, an existence check and
//! a recent-items read-back. [`MemoryStore`] backs tests and dry runs;
//! [`postgres::PgNewsStore`] is the durable one.

pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::ingest::types::{NewsItem, SourceId};

/// A persisted row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredNews {
    pub id: Uuid,
    pub title: String,
    pub source: String,
    pub url: String,
    pub timestamp: DateTime<Utc>,
    pub content: String,
    pub ingested_at: DateTime<Utc>,
}

impl StoredNews {
    pub fn from_item(item: &NewsItem, ingested_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: item.title.clone(),
            source: item.source.as_str().to_string(),
            url: item.url.clone(),
            timestamp: item.timestamp,
            content: item.content.clone(),
            ingested_at,
        }
    }

    pub fn source_id(&self) -> Option<SourceId> {
        SourceId::parse(&self.source)
    }
}

#[async_trait]
pub trait NewsStore: Send + Sync {
    /// Insert unless a row with the same URL exists. `true` when a row was created.
    async fn insert_if_not_exists(&self, item: &NewsItem) -> Result<bool>;

    async fn exists_by_url(&self, url: &str) -> Result<bool>;

    /// Newest rows (by publish time) whose content has at least `min_content_len` chars.
    async fn recent_with_content(&self, limit: usize, min_content_len: usize)
        -> Result<Vec<StoredNews>>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<StoredNews>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Rows are only appended under the lock, so a poisoned guard is still consistent.
    fn rows(&self) -> MutexGuard<'_, Vec<StoredNews>> {
        self.rows.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.rows().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<StoredNews> {
        self.rows().clone()
    }
}

#[async_trait]
impl NewsStore for MemoryStore {
    async fn insert_if_not_exists(&self, item: &NewsItem) -> Result<bool> {
        let mut rows = self.rows();
        if rows.iter().any(|r| r.url == item.url) {
            return Ok(false);
        }
        rows.push(StoredNews::from_item(item, Utc::now()));
        Ok(true)
    }

    async fn exists_by_url(&self, url: &str) -> Result<bool> {
        let rows = self.rows();
        Ok(rows.iter().any(|r| r.url == url))
    }

    async fn recent_with_content(
        &self,
        limit: usize,
        min_content_len: usize,
    ) -> Result<Vec<StoredNews>> {
        let rows = self.rows();
        let mut out: Vec<StoredNews> = rows
            .iter()
            .filter(|r| r.content.chars().count() >= min_content_len)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        out.truncate(limit);
        Ok(out)
    }
}
