// src/ingest/mod.rs
pub mod aggregator;
pub mod batch;
pub mod config;
pub mod feed;
pub mod fetcher;
pub mod providers;
pub mod resolution;
pub mod types;

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;
use url::Url;

/// Cap for feed-provided text (titles, descriptions).
pub const MAX_FEED_TEXT_CHARS: usize = 1_500;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_feed_entries_total", "Entries parsed from feeds.");
        describe_counter!("ingest_feed_errors_total", "Feed fetch/parse failures.");
        describe_counter!("ingest_scrape_total", "Article scrape attempts.");
        describe_counter!("ingest_scrape_errors_total", "Article scrapes that failed.");
        describe_counter!(
            "ingest_dropped_total",
            "Entries dropped for missing fields or thin content."
        );
        describe_counter!("ingest_items_total", "News items produced by adapters.");
        describe_counter!("ingest_adapter_errors_total", "Adapter-level failures.");
        describe_counter!("ingest_inserted_total", "Items newly written to the store.");
        describe_counter!(
            "ingest_skipped_total",
            "Items skipped because their URL is already stored."
        );
        describe_counter!("ingest_persist_errors_total", "Store write failures.");
        describe_histogram!("ingest_feed_fetch_ms", "Feed fetch + parse time in milliseconds.");
        describe_histogram!("ingest_scrape_ms", "Article scrape time in milliseconds.");
        describe_gauge!("ingest_last_run_ts", "Unix ts when the ingest run last finished.");
    });
}

/// Normalize text: decode entities, strip tags, collapse whitespace, cap length.
pub fn normalize_text(s: &str, max_chars: usize) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap
    if out.chars().count() > max_chars {
        out = out.chars().take(max_chars).collect::<String>().trim_end().to_string();
    }

    out
}

/// Canonical form of an article link, used as the dedup key.
///
/// Only absolute http(s) URLs survive. The fragment and `utm_*` tracking
/// parameters are dropped; everything else is kept as-is.
pub fn canonical_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }
    url.set_fragment(None);

    let total = url.query_pairs().count();
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !k.to_ascii_lowercase().starts_with("utm_"))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    // Untouched queries keep their original encoding.
    if kept.is_empty() {
        url.set_query(None);
    } else if kept.len() < total {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }

    Some(url.to_string())
}
