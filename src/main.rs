//! news-ingest: one ingestion pass over all configured outlets.
//!
//! Loads config (file + env), opens the browser session, runs every adapter,
//! writes new items to Postgres (or only prints them in dry-run mode) and
//! exits non-zero when every source failed or a store write failed.

use anyhow::{bail, Result};
use clap::Parser;
use market_news_ingest::ingest::config::load_config_from;
use market_news_ingest::store::postgres::PgNewsStore;
use market_news_ingest::telemetry::{init_tracing, Metrics};
use market_news_ingest::{load_config_default, MemoryStore, NewsAggregator, NewsStore};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error, info};

const DB_MAX_CONNECTIONS: u32 = 5;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Config file (TOML or JSON); defaults to $NEWS_INGEST_CONFIG or config/ingest.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Fetch without writing to the store
    #[arg(long)]
    dry_run: bool,

    /// Run a single source (e.g. "cnbc") instead of all of them
    #[arg(short, long)]
    source: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = ?e, "ingest run aborted");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Cli) -> Result<ExitCode> {
    let mut cfg = match &args.config {
        Some(path) => {
            let mut c = load_config_from(path)?;
            c.apply_env_overrides();
            c
        }
        None => load_config_default()?,
    };
    cfg.dry_run |= args.dry_run;

    let metrics = Metrics::init(cfg.metrics_listen.as_deref())?;

    let store: Arc<dyn NewsStore> = if cfg.dry_run {
        info!("dry run: nothing will be written");
        Arc::new(MemoryStore::new())
    } else {
        let Some(url) = cfg.database_url.as_deref() else {
            bail!("DATABASE_URL is not set (set it, or pass --dry-run)");
        };
        let pg = PgNewsStore::connect(url, DB_MAX_CONNECTIONS).await?;
        pg.ensure_schema().await?;
        Arc::new(pg)
    };

    let persist = !cfg.dry_run;
    let mut agg = NewsAggregator::new(cfg, store);

    let code = match args.source {
        Some(name) => run_single(&mut agg, &name, persist).await,
        None => {
            let report = agg.run_once(persist).await?;
            println!("{report}");
            let store_failed = report.save.as_ref().is_some_and(|s| !s.is_clean());
            if report.all_sources_failed() || store_failed {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
    };

    debug!(metrics = %metrics.render(), "metrics snapshot");
    Ok(code)
}

async fn run_single(agg: &mut NewsAggregator, name: &str, persist: bool) -> ExitCode {
    if let Err(e) = agg.init().await {
        error!(error = ?e, "init failed");
        return ExitCode::FAILURE;
    }
    let code = match agg.fetch_news_from_source(name).await {
        Ok(items) => {
            for it in &items {
                println!("[{}] {} | {} ({} chars)", it.source, it.title, it.url, it.content.chars().count());
            }
            if persist {
                let save = agg.save_news_to_database(&items).await;
                println!(
                    "{}: {} items, {} new, {} already stored, {} failed, {} rejected",
                    name,
                    items.len(),
                    save.inserted,
                    save.skipped,
                    save.failures.len(),
                    save.rejected
                );
                if save.is_clean() {
                    ExitCode::SUCCESS
                } else {
                    ExitCode::FAILURE
                }
            } else {
                println!("{}: {} items", name, items.len());
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            error!(source = %name, error = ?e, "source failed");
            ExitCode::FAILURE
        }
    };
    agg.close().await;
    code
}
