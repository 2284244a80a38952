// src/telemetry.rs
//! Tracing subscriber and Prometheus recorder setup for the binary.

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "market_news_ingest=info,news_ingest=info,ingest=info,warn";

/// Compact logs by default; `NEWS_INGEST_LOG_JSON=1` switches to JSON lines.
/// `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let json = std::env::var("NEWS_INGEST_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    // try_init: a subscriber may already be installed by an embedding process.
    let registry = tracing_subscriber::registry().with(filter);
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder. With `listen` set, the exporter also
    /// serves `/metrics` on that address (needs a running Tokio runtime).
    pub fn init(listen: Option<&str>) -> Result<Self> {
        // Use default buckets to avoid API differences across crate versions.
        let builder = PrometheusBuilder::new();

        let handle = match listen {
            Some(addr) => {
                let addr: SocketAddr = addr
                    .parse()
                    .with_context(|| format!("invalid metrics listen address {addr}"))?;
                let (recorder, exporter) = builder
                    .with_http_listener(addr)
                    .build()
                    .context("prometheus: build exporter")?;
                let handle = recorder.handle();
                metrics::set_global_recorder(recorder)
                    .map_err(|_| anyhow::anyhow!("prometheus: a global recorder is already installed"))?;
                tokio::spawn(async move {
                    if exporter.await.is_err() {
                        tracing::warn!(%addr, "metrics exporter stopped");
                    }
                });
                handle
            }
            None => builder
                .install_recorder()
                .context("prometheus: install recorder")?,
        };

        Ok(Self { handle })
    }

    /// Prometheus exposition text of everything recorded so far.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}
