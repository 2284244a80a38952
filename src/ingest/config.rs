// src/ingest/config.rs
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ingest::feed::{DEFAULT_FEED_TIMEOUT, DEFAULT_USER_AGENT};
use crate::ingest::fetcher::BrowserConfig;
use crate::ingest::resolution::FallbackPolicy;
use crate::ingest::types::SourceId;

const ENV_PATH: &str = "NEWS_INGEST_CONFIG";
const ENV_DATABASE_URL: &str = "DATABASE_URL";
const ENV_BROWSERLESS_URL: &str = "BROWSERLESS_URL";
const ENV_BROWSERLESS_TOKEN: &str = "BROWSERLESS_TOKEN";
const ENV_DRY_RUN: &str = "NEWS_INGEST_DRY_RUN";

const DEFAULT_PAGE_TIMEOUT_SECS: u64 = 20;
const DEFAULT_MAX_OPEN_PAGES: usize = 4;
const DEFAULT_ENTRY_CONCURRENCY: usize = 5;
const DEFAULT_BROWSER_ENDPOINT: &str = "http://localhost:3000";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserSection {
    pub endpoint: String,
    pub token: Option<String>,
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_BROWSER_ENDPOINT.to_string(),
            token: None,
        }
    }
}

/// Per-outlet overrides. Anything left out keeps the outlet's built-in value.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SourceConfig {
    pub name: String,
    #[serde(default)]
    pub feed_url: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub min_content_len: Option<usize>,
    #[serde(default)]
    pub policy: Option<FallbackPolicy>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub user_agent: String,
    pub feed_timeout_secs: u64,
    pub page_timeout_secs: u64,
    pub max_open_pages: usize,
    /// Scrapes in flight per adapter.
    pub entry_concurrency: usize,
    /// Optional wall-clock budget per adapter; unset means no deadline.
    pub adapter_deadline_secs: Option<u64>,
    pub database_url: Option<String>,
    pub metrics_listen: Option<String>,
    pub dry_run: bool,
    pub browser: BrowserSection,
    pub sources: Vec<SourceConfig>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            feed_timeout_secs: DEFAULT_FEED_TIMEOUT.as_secs(),
            page_timeout_secs: DEFAULT_PAGE_TIMEOUT_SECS,
            max_open_pages: DEFAULT_MAX_OPEN_PAGES,
            entry_concurrency: DEFAULT_ENTRY_CONCURRENCY,
            adapter_deadline_secs: None,
            database_url: None,
            metrics_listen: None,
            dry_run: false,
            browser: BrowserSection::default(),
            sources: Vec::new(),
        }
    }
}

impl IngestConfig {
    pub fn feed_timeout(&self) -> Duration {
        Duration::from_secs(self.feed_timeout_secs)
    }

    pub fn adapter_deadline(&self) -> Option<Duration> {
        self.adapter_deadline_secs.map(Duration::from_secs)
    }

    pub fn browser_config(&self) -> BrowserConfig {
        BrowserConfig {
            endpoint: self.browser.endpoint.clone(),
            token: self.browser.token.clone(),
            page_timeout: Duration::from_secs(self.page_timeout_secs),
            max_open_pages: self.max_open_pages,
            user_agent: self.user_agent.clone(),
        }
    }

    /// Override entry for `name`. Names resolve through [`SourceId::parse`],
    /// so "financial-juice" and "FinancialJuice" address the same outlet.
    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        match SourceId::parse(name) {
            Some(id) => self
                .sources
                .iter()
                .find(|s| SourceId::parse(&s.name) == Some(id)),
            None => self
                .sources
                .iter()
                .find(|s| s.name.trim().eq_ignore_ascii_case(name.trim())),
        }
    }

    /// Replace zeros and blanks with defaults.
    fn sanitize(mut self) -> Self {
        if self.user_agent.trim().is_empty() {
            self.user_agent = DEFAULT_USER_AGENT.to_string();
        }
        if self.feed_timeout_secs == 0 {
            self.feed_timeout_secs = DEFAULT_FEED_TIMEOUT.as_secs();
        }
        if self.page_timeout_secs == 0 {
            self.page_timeout_secs = DEFAULT_PAGE_TIMEOUT_SECS;
        }
        if self.max_open_pages == 0 {
            self.max_open_pages = DEFAULT_MAX_OPEN_PAGES;
        }
        if self.entry_concurrency == 0 {
            self.entry_concurrency = DEFAULT_ENTRY_CONCURRENCY;
        }
        if self.adapter_deadline_secs == Some(0) {
            self.adapter_deadline_secs = None;
        }
        if self.browser.endpoint.trim().is_empty() {
            self.browser.endpoint = DEFAULT_BROWSER_ENDPOINT.to_string();
        }
        for s in &mut self.sources {
            s.name = s.name.trim().to_string();
            if s.limit == Some(0) {
                s.limit = None;
            }
            if s.feed_url.as_deref().is_some_and(|u| u.trim().is_empty()) {
                s.feed_url = None;
            }
        }
        self
    }

    /// Environment wins over file values.
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = non_empty_env(ENV_DATABASE_URL) {
            self.database_url = Some(v);
        }
        if let Some(v) = non_empty_env(ENV_BROWSERLESS_URL) {
            self.browser.endpoint = v;
        }
        if let Some(v) = non_empty_env(ENV_BROWSERLESS_TOKEN) {
            self.browser.token = Some(v);
        }
        if let Some(v) = non_empty_env(ENV_DRY_RUN) {
            self.dry_run = matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Load config from an explicit path. Supports TOML or JSON formats.
pub fn load_config_from(path: &Path) -> Result<IngestConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading ingest config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_config(&content, ext.as_str())
        .with_context(|| format!("parsing ingest config {}", path.display()))
}

/// Load config using env var + fallbacks, then apply env overrides:
/// 1) $NEWS_INGEST_CONFIG
/// 2) config/ingest.toml
/// 3) config/ingest.json
/// 4) built-in defaults
pub fn load_config_default() -> Result<IngestConfig> {
    let mut cfg = if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if !pb.exists() {
            return Err(anyhow!("{ENV_PATH} points to non-existent path"));
        }
        load_config_from(&pb)?
    } else {
        let toml_p = PathBuf::from("config/ingest.toml");
        let json_p = PathBuf::from("config/ingest.json");
        if toml_p.exists() {
            load_config_from(&toml_p)?
        } else if json_p.exists() {
            load_config_from(&json_p)?
        } else {
            IngestConfig::default()
        }
    };
    cfg.apply_env_overrides();
    Ok(cfg)
}

fn parse_config(s: &str, hint_ext: &str) -> Result<IngestConfig> {
    let cfg = if hint_ext == "json" {
        serde_json::from_str::<IngestConfig>(s)?
    } else {
        toml::from_str::<IngestConfig>(s)?
    };
    Ok(cfg.sanitize())
}
