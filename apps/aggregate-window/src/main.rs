//! Aggregate Window Binary
//!
//! Streams crypto aggregates for one instrument and prints them on a timer.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin aggregate-window -- --ticker BTC-USD --api-key <key>
//! ```
//!
//! # Environment Variables
//!
//! ## Required (unless passed as a flag)
//! - `POLYGON_API_KEY`: Feed API key (`--api-key`)
//!
//! ## Optional
//! - `AGG_TICKER`: Instrument (default: BTC-USD, `--ticker`)
//! - `AGG_PRINT_INTERVAL_SECS`: Seconds between prints (default: 30, `--interval-secs`)
//! - `AGG_QUEUE_CAPACITY`: Frame queue capacity (default: 10000)
//! - `AGG_MAX_RECORDS`: Bars retained, 0 = unbounded (default: 10000)
//! - `AGG_MAX_SPAN_SECS`: Retained period span, 0 = unbounded (default: 0)
//! - `AGG_UTC_OFFSET_SECS`: Timestamp display offset (default: 0, UTC)
//! - `AGG_FEED_URL`: Feed endpoint (default: wss://socket.polygon.io/crypto)
//! - `AGG_HEALTH_PORT`: Health/metrics HTTP port, 0 = disabled (default: 0)
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use aggregate_window::application::ports::LineSink;
use aggregate_window::infrastructure::telemetry;
use aggregate_window::{
    AppConfig, Cli, FeedClient, FeedClientConfig, FeedState, HealthServer, HealthServerState,
    IngestService, LineFormatter, PrintScheduler, StdoutSink, WindowAggregator, init_metrics,
    join_until_first_exit,
};
use clap::Parser;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| "failed to install rustls crypto provider")?;

    load_dotenv();
    let cli = Cli::parse();

    let _telemetry_guard = telemetry::init();

    let config = AppConfig::load(&cli)?;
    log_config(&config);

    if config.health_port != 0 {
        let _metrics_handle = init_metrics();
    }

    tracing::info!(
        ticker = %config.feed.ticker,
        "Aggregating for {}, please wait for data to flow in...",
        config.feed.ticker
    );

    let shutdown_token = CancellationToken::new();

    let window = WindowAggregator::new(config.window.retention()).into_shared();
    let feed_state = Arc::new(FeedState::new());
    let formatter = LineFormatter::with_offset(config.window.utc_offset()?);
    let sink: Arc<dyn LineSink> = Arc::new(StdoutSink::new());

    // Bounded queue between the feed reader and the ingest consumer
    let (frames_tx, frames_rx) = mpsc::channel::<String>(config.window.queue_capacity);

    // Spawn ingest consumer (sole writer of the window)
    let ingest = IngestService::new(Arc::clone(&window), frames_rx);
    let ingest_handle = tokio::spawn(ingest.run());

    // Spawn print scheduler
    let scheduler = PrintScheduler::new(
        Arc::clone(&window),
        sink,
        formatter,
        config.window.print_interval,
        shutdown_token.clone(),
    );
    let scheduler_handle = tokio::spawn(scheduler.run());

    // Spawn health server
    if config.health_port != 0 {
        let health_state = Arc::new(HealthServerState::new(
            env!("CARGO_PKG_VERSION").to_string(),
            Arc::clone(&feed_state),
            Arc::clone(&window),
        ));
        let health_server =
            HealthServer::new(config.health_port, health_state, shutdown_token.clone());
        tokio::spawn(async move {
            if let Err(e) = health_server.run().await {
                tracing::error!(error = %e, "Health server error");
            }
        });
    }

    // Spawn feed reader
    let feed_client = FeedClient::new(
        FeedClientConfig::from(&config.feed),
        frames_tx,
        Arc::clone(&feed_state),
        shutdown_token.clone(),
    );
    let feed_handle = tokio::spawn(feed_client.run());

    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        await_shutdown_signal().await;
        signal_token.cancel();
    });

    // A fatal feed error, a sink failure or a signal stops everything
    let (feed_result, scheduler_result) =
        join_until_first_exit(feed_handle, scheduler_handle, &shutdown_token).await;
    let scheduler_result = scheduler_result?;
    if let Err(e) = &scheduler_result {
        tracing::error!(error = %e, "Output failed");
    }

    let totals = ingest_handle.await?;

    tracing::info!(
        frames = totals.frames,
        accepted = totals.accepted,
        skipped = totals.skipped,
        window_len = window.read().len(),
        "Aggregate window stopped"
    );

    scheduler_result?;
    if let Err(e) = feed_result? {
        tracing::error!(error = %e, "Feed connection failed");
        return Err(e.into());
    }

    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &AppConfig) {
    tracing::info!(
        ticker = %config.feed.ticker,
        channel = %config.feed.channel(),
        interval_secs = config.window.print_interval.as_secs(),
        queue_capacity = config.window.queue_capacity,
        max_records = config.window.max_records,
        health_port = config.health_port,
        "Configuration loaded"
    );
    tracing::debug!(url = %config.feed.url, "Feed endpoint");
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for SIGTERM or SIGINT.
async fn await_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
