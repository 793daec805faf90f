//! token-scout entry point.
//!
//! Loads configuration, initialises structured logging, wires the source
//! clients and the qualified sink, then runs the scan scheduler until
//! Ctrl+C. Only configuration and wiring failures are fatal.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use token_scout::config::AppConfig;
use token_scout::dashboard::{self, routes::DashboardState};
use token_scout::engine::scheduler::ScanScheduler;
use token_scout::sources::fixture::FixtureBook;
use token_scout::storage;

const CONFIG_PATH_ENV: &str = "SCOUT_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path =
        std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let cfg = Arc::new(AppConfig::load(&config_path)?);

    init_logging();

    info!(
        name = %cfg.scanner.name,
        config = %config_path,
        scan_interval_secs = cfg.scanner.scan_interval_secs,
        max_concurrency = cfg.scanner.max_concurrency,
        top_n = cfg.scanner.top_n,
        "token-scout starting up"
    );

    // -- Sources ---------------------------------------------------------

    let fixture_path = cfg
        .scanner
        .fixture_path
        .as_deref()
        .context("scanner.fixture_path is required: no live source clients are built in")?;
    let book = Arc::new(FixtureBook::load(fixture_path)?);
    if book.is_empty() {
        warn!(path = fixture_path, "Fixture book has no candidates");
    }
    let sources = book.source_set(&cfg);

    // -- Sink and scheduler ----------------------------------------------

    let sink = storage::open_sink(&cfg.storage).await?;
    let scheduler = Arc::new(
        ScanScheduler::new(cfg.clone(), book, sources, sink).context("Failed to wire scheduler")?,
    );

    if cfg.dashboard.enabled {
        let state = Arc::new(DashboardState::new(scheduler.clone()));
        if let Err(e) = dashboard::spawn_dashboard(state, cfg.dashboard.port).await {
            error!(error = %e, "Status API disabled");
        }
    }

    // -- Main loop -------------------------------------------------------

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runner = tokio::spawn(scheduler.clone().run(shutdown_rx));

    info!("Entering main loop. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Shutdown signal received.");

    let _ = shutdown_tx.send(true);
    if let Err(e) = runner.await {
        error!(error = %e, "Scheduler task failed");
    }

    let status = scheduler.status().await;
    info!(
        cycles = status.cycles_started,
        ticks_skipped = status.ticks_skipped,
        "token-scout shut down cleanly."
    );

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("token_scout=info,audit=info"));

    let json_logging = std::env::var("SCOUT_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
