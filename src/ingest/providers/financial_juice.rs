// src/ingest/providers/financial_juice.rs
//! FinancialJuice squawk headlines. Pages are short, so the bar is low and
//! the headline itself is an acceptable last resort.

use super::OutletSpec;
use crate::ingest::resolution::FallbackPolicy;
use crate::ingest::types::SourceId;

pub const FEED_URL: &str = "https://www.financialjuice.com/feed.ashx?xy=rss";

const PREFIX: &str = "FinancialJuice:";

pub fn spec() -> OutletSpec {
    OutletSpec {
        source: SourceId::FinancialJuice,
        feed_url: FEED_URL.to_string(),
        limit: 5,
        min_content_len: 20,
        policy: FallbackPolicy::Lenient,
        clean_title: clean_title,
    }
}

pub fn clean_title(title: &str) -> String {
    let t = title.trim();
    match t.get(..PREFIX.len()) {
        Some(head) if head.eq_ignore_ascii_case(PREFIX) => t[PREFIX.len()..].trim().to_string(),
        _ => t.to_string(),
    }
}
