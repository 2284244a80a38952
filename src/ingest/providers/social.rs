// src/ingest/providers/social.rs
//! Social feed (a market-news account exposed through an RSS bridge).
//!
//! Posts have no real title, so the post text becomes the title after link
//! and retweet noise is stripped. The linked page is still scraped; when it
//! is thin the post text itself is the content.

use once_cell::sync::Lazy;
use regex::Regex;

use super::OutletSpec;
use crate::ingest::resolution::FallbackPolicy;
use crate::ingest::types::SourceId;

pub const FEED_URL: &str = "https://nitter.net/DeItaone/rss";

const MAX_TITLE_CHARS: usize = 140;

pub fn spec() -> OutletSpec {
    OutletSpec {
        source: SourceId::Social,
        feed_url: FEED_URL.to_string(),
        limit: 5,
        min_content_len: 20,
        policy: FallbackPolicy::Lenient,
        clean_title: clean_title,
    }
}

static RE_URLS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:https?://\S+|pic\.twitter\.com/\S+)").unwrap());
static RE_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:RT by @\w+:|R to @\w+:)\s*").unwrap());

pub fn clean_title(title: &str) -> String {
    let no_prefix = RE_PREFIX.replace(title.trim(), "");
    let no_urls = RE_URLS.replace_all(&no_prefix, "");
    let t = no_urls.split_whitespace().collect::<Vec<_>>().join(" ");
    if t.chars().count() <= MAX_TITLE_CHARS {
        return t;
    }
    let cut: String = t.chars().take(MAX_TITLE_CHARS - 3).collect();
    format!("{}...", cut.trim_end())
}
