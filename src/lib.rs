// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod ingest;
pub mod store;
pub mod telemetry;

// ---- Re-exports for stable public API ----
pub use crate::ingest::aggregator::{NewsAggregator, RunReport, SaveReport, SourceReport};
pub use crate::ingest::config::{load_config_default, IngestConfig};
pub use crate::ingest::types::{NewsItem, SourceAdapter, SourceId};
pub use crate::store::{MemoryStore, NewsStore};
