// src/ingest/providers/zerohedge.rs
//! ZeroHedge: full-text feed items are teasers, so thin scrapes are dropped.

use super::OutletSpec;
use crate::ingest::resolution::FallbackPolicy;
use crate::ingest::types::SourceId;

pub const FEED_URL: &str = "https://cms.zerohedge.com/fullrss2.xml";

pub fn spec() -> OutletSpec {
    OutletSpec {
        source: SourceId::ZeroHedge,
        feed_url: FEED_URL.to_string(),
        limit: 10,
        min_content_len: 50,
        policy: FallbackPolicy::Strict,
        clean_title: clean_title,
    }
}

/// Drops the section tag some headlines carry, e.g. "[Markets] Gold surges".
pub fn clean_title(title: &str) -> String {
    let t = title.trim();
    match t.strip_prefix('[').and_then(|rest| rest.split_once(']')) {
        Some((_, rest)) if !rest.trim().is_empty() => rest.trim().to_string(),
        _ => t.to_string(),
    }
}
