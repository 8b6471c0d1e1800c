//! Crash Feed Streamer
//!
//! Connects to the crash-game hub, records raw registration / bet / cashout /
//! crash rows and writes one summary row per finished round.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --bin crash_streamer -- --backend csv
//! cargo run --release --bin crash_streamer -- --backend sqlite
//! ```
//!
//! ## Environment Variables
//!
//! - FEED_URL - hub WebSocket URL (required)
//! - FEED_ACTIVITY / FEED_CURRENCY - guest subscription parameters (default: 30 / 87)
//! - OUTPUT_DIR - CSV output directory (default: data)
//! - CRASHFLOW_DB_PATH - SQLite database path (default: data/crashflow.db) - used when --backend sqlite
//! - PING_INTERVAL_SECS / PING_TIMEOUT_SECS - keepalive (default: 10 / 5)
//! - RECONNECT_INITIAL_SECS / RECONNECT_MAX_SECS / RECONNECT_MAX_RETRIES - backoff (default: 5 / 60 / 10)
//! - CHANNEL_BUFFER - feed to ingestion channel size (default: 1000)
//! - RUST_LOG - Logging level (optional, default: info)

use crashflow::feed::{run_with_reconnect, BackendType, ClientError, RuntimeConfig};
use crashflow::{
    ChannelHandler, CsvSink, EventRouter, Ingestion, IngestionReport, RecordSink, SinkError,
    SqliteSink,
};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinError;

const STATS_INTERVAL: Duration = Duration::from_secs(60);

enum Shutdown {
    FeedEnded(Result<(), ClientError>),
    IngestionEnded(Result<Result<IngestionReport, SinkError>, JoinError>),
    Interrupted,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    let config = RuntimeConfig::from_env()?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.rust_log))
        .target(env_logger::Target::Stderr)
        .init();

    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| "Can't set crypto provider to aws_lc_rs")?;

    let backend = RuntimeConfig::parse_backend_from_args();

    log::info!("🚀 Starting crash feed streamer");
    log::info!("   Feed URL: {}", config.feed_url);
    log::info!("   Guest: activity={} currency={}", config.activity, config.currency);
    log::info!(
        "   Keepalive: ping every {}s, timeout {}s",
        config.ping_interval.as_secs(),
        config.ping_timeout.as_secs()
    );

    let sink: Box<dyn RecordSink> = match backend {
        BackendType::Csv => {
            log::info!("📝 CSV backend: {}", config.output_dir.display());
            Box::new(CsvSink::open(&config.output_dir)?)
        }
        BackendType::Sqlite => {
            log::info!("💾 SQLite backend: {}", config.db_path.display());
            Box::new(SqliteSink::open(&config.db_path)?)
        }
    };

    let (tx, rx) = mpsc::channel(config.channel_buffer);
    let ingestion = Ingestion::new(EventRouter::new(sink));
    let mut ingestion_handle = tokio::spawn(ingestion.run(rx, STATS_INTERVAL));
    let mut handler = ChannelHandler::new(tx);

    let outcome = tokio::select! {
        result = run_with_reconnect(&config, &mut handler) => Shutdown::FeedEnded(result),
        joined = &mut ingestion_handle => Shutdown::IngestionEnded(joined),
        _ = tokio::signal::ctrl_c() => Shutdown::Interrupted,
    };

    // Closing the channel lets ingestion drain what is queued and stop
    drop(handler);

    match outcome {
        Shutdown::IngestionEnded(joined) => {
            let report = joined??;
            log::warn!("Ingestion ended before the feed: {:?}", report);
        }
        Shutdown::Interrupted => {
            log::info!("Interrupted, exiting.");
            let report = ingestion_handle.await??;
            log::info!("Final: {:?}", report);
        }
        Shutdown::FeedEnded(result) => {
            let report = ingestion_handle.await??;
            log::info!("Final: {:?}", report);
            result?;
        }
    }

    Ok(())
}
