// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::fmt;

/// Outlet that produced a [`NewsItem`]. The string form is what gets stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SourceId {
    ZeroHedge,
    Cnbc,
    FinancialJuice,
    Social,
}

impl SourceId {
    pub const ALL: [SourceId; 4] = [
        SourceId::ZeroHedge,
        SourceId::Cnbc,
        SourceId::FinancialJuice,
        SourceId::Social,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::ZeroHedge => "ZeroHedge",
            SourceId::Cnbc => "CNBC",
            SourceId::FinancialJuice => "FinancialJuice",
            SourceId::Social => "Social",
        }
    }

    /// Case-insensitive lookup; spaces, dashes and underscores are ignored
    /// so "financial-juice" and "FinancialJuice" resolve alike.
    pub fn parse(name: &str) -> Option<SourceId> {
        let key: String = name
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .collect::<String>()
            .to_ascii_lowercase();
        SourceId::ALL
            .into_iter()
            .find(|s| s.as_str().to_ascii_lowercase() == key)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized news record. Built once inside an adapter, never mutated.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct NewsItem {
    pub title: String,
    pub source: SourceId,
    pub url: String,
    pub timestamp: DateTime<Utc>,
    pub content: String,
}

impl NewsItem {
    /// Both dedup key and title must be present before anything is stored.
    pub fn is_persistable(&self) -> bool {
        !self.title.trim().is_empty() && !self.url.trim().is_empty()
    }
}

/// Feed entry as read from the XML, before any cleanup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFeedEntry {
    pub title: String,
    pub link: String,
    pub pub_date: String,
    pub description: String,
}

#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn fetch_latest(&self) -> Result<Vec<NewsItem>>;
    fn source(&self) -> SourceId;
}
