// src/ingest/providers/cnbc.rs
//! CNBC top news. Descriptions are real summaries, good enough as a fallback.

use super::OutletSpec;
use crate::ingest::resolution::FallbackPolicy;
use crate::ingest::types::SourceId;

pub const FEED_URL: &str =
    "https://search.cnbc.com/rs/search/combinedcms/view.xml?partnerId=wrss01&id=100003114";

pub fn spec() -> OutletSpec {
    OutletSpec {
        source: SourceId::Cnbc,
        feed_url: FEED_URL.to_string(),
        limit: 10,
        min_content_len: 50,
        policy: FallbackPolicy::Lenient,
        clean_title: clean_title,
    }
}

pub fn clean_title(title: &str) -> String {
    title.trim().trim_end_matches(" - CNBC").trim().to_string()
}
