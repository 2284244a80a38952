// src/store/postgres.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use super::{NewsStore, StoredNews};
use crate::ingest::types::NewsItem;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS news_items (
    id          UUID PRIMARY KEY,
    title       TEXT NOT NULL CHECK (title <> ''),
    source      TEXT NOT NULL,
    url         TEXT NOT NULL UNIQUE CHECK (url <> ''),
    timestamp   TIMESTAMPTZ NOT NULL,
    content     TEXT NOT NULL,
    ingested_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)"#;

const INDEX: &str =
    "CREATE INDEX IF NOT EXISTS news_items_timestamp_idx ON news_items (timestamp DESC)";

#[derive(Debug, sqlx::FromRow)]
struct NewsRow {
    id: Uuid,
    title: String,
    source: String,
    url: String,
    timestamp: DateTime<Utc>,
    content: String,
    ingested_at: DateTime<Utc>,
}

impl From<NewsRow> for StoredNews {
    fn from(r: NewsRow) -> Self {
        Self {
            id: r.id,
            title: r.title,
            source: r.source,
            url: r.url,
            timestamp: r.timestamp,
            content: r.content,
            ingested_at: r.ingested_at,
        }
    }
}

/// Postgres-backed store. Each write is a single statement; the `UNIQUE`
/// constraint on `url` is what makes inserts idempotent.
#[derive(Clone)]
pub struct PgNewsStore {
    pool: PgPool,
}

impl PgNewsStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await
            .context("connecting to postgres")?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the table and index if they are missing.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .context("creating news_items table")?;
        sqlx::query(INDEX)
            .execute(&self.pool)
            .await
            .context("creating news_items index")?;
        Ok(())
    }
}

#[async_trait]
impl NewsStore for PgNewsStore {
    async fn insert_if_not_exists(&self, item: &NewsItem) -> Result<bool> {
        let res = sqlx::query(
            "INSERT INTO news_items (id, title, source, url, timestamp, content, ingested_at)
             VALUES ($1, $2, $3, $4, $5, $6, NOW())
             ON CONFLICT (url) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(&item.title)
        .bind(item.source.as_str())
        .bind(&item.url)
        .bind(item.timestamp)
        .bind(&item.content)
        .execute(&self.pool)
        .await
        .with_context(|| format!("inserting news item {}", item.url))?;

        Ok(res.rows_affected() == 1)
    }

    async fn exists_by_url(&self, url: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM news_items WHERE url = $1)")
                .bind(url)
                .fetch_one(&self.pool)
                .await
                .with_context(|| format!("checking news item {url}"))?;
        Ok(exists)
    }

    async fn recent_with_content(
        &self,
        limit: usize,
        min_content_len: usize,
    ) -> Result<Vec<StoredNews>> {
        let rows = sqlx::query_as::<_, NewsRow>(
            "SELECT id, title, source, url, timestamp, content, ingested_at
             FROM news_items
             WHERE char_length(content) >= $1
             ORDER BY timestamp DESC
             LIMIT $2",
        )
        .bind(min_content_len as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("reading recent news items")?;

        Ok(rows.into_iter().map(StoredNews::from).collect())
    }
}
