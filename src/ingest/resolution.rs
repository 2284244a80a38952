// src/ingest/resolution.rs
//! Content quality gate.
//!
//! Every feed entry ends up in exactly one [`ContentResolution`]. The decision
//! is a pure function of the scraped text, the feed description and the title,
//! so the policy can be tested without any network.

use serde::Deserialize;

/// What an adapter does when the scraped body is too short.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackPolicy {
    /// Drop the entry.
    Strict,
    /// Use the feed description, then the title.
    Lenient,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentResolution {
    Scraped(String),
    FellBackToDescription(String),
    FellBackToTitle(String),
    Dropped,
}

impl ContentResolution {
    pub fn into_content(self) -> Option<String> {
        match self {
            ContentResolution::Scraped(s)
            | ContentResolution::FellBackToDescription(s)
            | ContentResolution::FellBackToTitle(s) => Some(s),
            ContentResolution::Dropped => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ContentResolution::Scraped(_) => "scraped",
            ContentResolution::FellBackToDescription(_) => "description",
            ContentResolution::FellBackToTitle(_) => "title",
            ContentResolution::Dropped => "dropped",
        }
    }
}

/// Length in chars, not bytes.
fn char_len(s: &str) -> usize {
    s.trim().chars().count()
}

/// Decide which text becomes the item's content.
///
/// Lenient fallbacks are not re-checked against `min_len`: a short description
/// is still preferred over the title, and the title is the last resort.
pub fn resolve_content(
    policy: FallbackPolicy,
    min_len: usize,
    scraped: &str,
    description: &str,
    title: &str,
) -> ContentResolution {
    if char_len(scraped) >= min_len && !scraped.trim().is_empty() {
        return ContentResolution::Scraped(scraped.trim().to_string());
    }
    match policy {
        FallbackPolicy::Strict => ContentResolution::Dropped,
        FallbackPolicy::Lenient => {
            let d = description.trim();
            if !d.is_empty() {
                ContentResolution::FellBackToDescription(d.to_string())
            } else if !title.trim().is_empty() {
                ContentResolution::FellBackToTitle(title.trim().to_string())
            } else {
                ContentResolution::Dropped
            }
        }
    }
}
