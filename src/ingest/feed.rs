// src/ingest/feed.rs
//! RSS feed reader.
//!
//! Fetches a feed with a fixed user agent and a short timeout and turns it
//! into [`RawFeedEntry`] values in document order. Any HTTP or XML failure is
//! logged and reported as an empty feed so one outlet never takes down the run.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;
use std::time::Duration;
use time::{
    format_description::well_known::{Rfc2822, Rfc3339},
    OffsetDateTime,
};

use crate::ingest::types::RawFeedEntry;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (compatible; market-news-ingest/0.1; +https://github.com/lumlich/market-news-ingest)";
pub const DEFAULT_FEED_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

/// Parse an RSS 2.0 document into raw entries, keeping feed order.
pub fn parse_feed(xml: &str) -> Result<Vec<RawFeedEntry>> {
    let xml_clean = scrub_html_entities_for_xml(xml);
    let rss: Rss = from_str(&xml_clean).context("parsing rss xml")?;
    Ok(rss
        .channel
        .item
        .into_iter()
        .map(|it| RawFeedEntry {
            title: it.title.unwrap_or_default().trim().to_string(),
            link: it.link.unwrap_or_default().trim().to_string(),
            pub_date: it.pub_date.unwrap_or_default().trim().to_string(),
            description: it.description.unwrap_or_default(),
        })
        .collect())
}

/// RFC 2822 (`pubDate`) first, then RFC 3339 which some bridges emit.
pub fn parse_pub_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let odt = OffsetDateTime::parse(raw, &Rfc2822)
        .or_else(|_| OffsetDateTime::parse(raw, &Rfc3339))
        .ok()?;
    DateTime::<Utc>::from_timestamp(odt.unix_timestamp(), odt.nanosecond())
}

/// Parsed publish time, or `now` when the feed date is missing or garbage.
pub fn timestamp_or(raw: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    parse_pub_date(raw).unwrap_or(now)
}

enum Mode {
    Http {
        client: reqwest::Client,
        timeout: Duration,
    },
    Fixture(String),
}

pub struct FeedReader {
    mode: Mode,
}

impl FeedReader {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .context("building feed http client")?;
        Ok(Self {
            mode: Mode::Http { client, timeout },
        })
    }

    /// Serve a fixed XML body instead of going to the network.
    pub fn from_fixture(xml: &str) -> Self {
        Self {
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    /// Fetch and parse `url`, keeping at most `cap` entries.
    /// Returns an empty list on any failure.
    pub async fn read(&self, url: &str, cap: Option<usize>) -> Vec<RawFeedEntry> {
        let t0 = std::time::Instant::now();
        let body = match &self.mode {
            Mode::Fixture(s) => Ok(s.clone()),
            Mode::Http { client, timeout } => fetch_body(client, *timeout, url).await,
        };

        let parsed = body.and_then(|b| parse_feed(&b));
        histogram!("ingest_feed_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        match parsed {
            Ok(mut entries) => {
                if let Some(cap) = cap {
                    entries.truncate(cap);
                }
                counter!("ingest_feed_entries_total").increment(entries.len() as u64);
                tracing::debug!(%url, entries = entries.len(), "feed parsed");
                entries
            }
            Err(e) => {
                tracing::warn!(error = ?e, %url, "feed unavailable");
                counter!("ingest_feed_errors_total").increment(1);
                Vec::new()
            }
        }
    }
}

async fn fetch_body(client: &reqwest::Client, timeout: Duration, url: &str) -> Result<String> {
    let resp = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .with_context(|| format!("feed http get {url}"))?
        .error_for_status()
        .with_context(|| format!("feed http status {url}"))?;
    resp.text().await.context("feed http .text()")
}

/// XML has no named entities beyond the basic five; feeds still ship HTML ones.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}
