use std::io::Write;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ecr_aggregator::chunk_source::FileChunkSource;
use ecr_aggregator::config::{CliArgs, Config};
use ecr_aggregator::engine::Engine;
use ecr_aggregator::plu::PluCatalog;
use ecr_aggregator::site::SiteMap;

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ecr_aggregator=info".into());
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    let config = Config::load(args).context("loading operating configuration")?;
    init_tracing(config.log_json);

    info!(
        dialect = ?config.dialect,
        hostname = %config.hostname,
        "starting ecr-aggregator"
    );

    let catalog = PluCatalog::load(&config.plu_catalog)
        .with_context(|| format!("loading PLU catalog from {}", config.plu_catalog.display()))?;
    let sites = SiteMap::load(&config.shops)
        .with_context(|| format!("loading site map from {}", config.shops.display()))?;
    let site_id = sites.resolve_site_id(&config.hostname);

    if config.monitor_mode {
        return run_monitor_mode(&config).await;
    }

    // The physical serial-line producer is wired in by the caller; here we
    // replay from a file named by the `ECR_REPLAY_FILE` env var if present,
    // which is how integration environments without real hardware attached
    // drive this binary end to end.
    let replay_path = std::env::var("ECR_REPLAY_FILE")
        .context("no chunk source configured: set ECR_REPLAY_FILE to a replay capture")?;
    let source = FileChunkSource::open(std::path::Path::new(&replay_path))
        .with_context(|| format!("opening replay source {replay_path}"))?;

    let mut engine = Engine::new(config, catalog, site_id, source);

    if let Err(err) = engine.run().await {
        error!(error = %err, "engine loop terminated");
        return Err(err);
    }
    Ok(())
}

/// `--monitor-mode`: persists raw chunks without parsing them, so a capture
/// can be taken from a device the parsing pipeline isn't trusted against
/// yet. Reads from the same `ChunkSource` boundary normal operation does
/// (`ECR_REPLAY_FILE`, the honest stand-in for the out-of-scope serial
/// producer) but writes every chunk it drains to a *separate* capture file
/// under `config.output_dir`, named the same way a data file is
/// (`<yyyymmdd>_monitor.txt`), instead of re-reading and echoing the input
/// it was given.
async fn run_monitor_mode(config: &Config) -> Result<()> {
    let replay_path = std::env::var("ECR_REPLAY_FILE")
        .context("monitor mode needs ECR_REPLAY_FILE to read raw chunks from")?;
    let mut source = FileChunkSource::open(std::path::Path::new(&replay_path))
        .with_context(|| format!("opening replay source {replay_path}"))?;

    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("creating output dir {}", config.output_dir.display()))?;
    let capture_path = config
        .output_dir
        .join(format!("{}_monitor.txt", chrono::Local::now().format("%Y%m%d")));
    let mut capture = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&capture_path)
        .with_context(|| format!("opening monitor capture file {}", capture_path.display()))?;

    info!(
        dialect = ?config.dialect,
        capture = %capture_path.display(),
        "monitor mode: persisting raw chunks, skipping parsing"
    );
    while let Some(chunk) = source.next_chunk()? {
        writeln!(capture, "{chunk}")
            .with_context(|| format!("writing to monitor capture file {}", capture_path.display()))?;
    }
    Ok(())
}
