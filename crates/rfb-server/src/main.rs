//! RFB server control-plane entry point.
//!
//! Loads the stored configuration, builds the [`ServerContext`] and keeps it
//! alive until Ctrl-C, then shuts down deterministically (every streaming
//! process is terminated).
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config_from()        -- snapshot file or defaults
//!  └─ ServerContext::with_system_services()
//!       └─ StreamingRegistry    -- subscribed to reload/shutdown
//!  └─ start streams (--stream-to, blocking pool)
//!  └─ reaper task               -- drops sessions whose process exited
//!  └─ ctrl_c
//!       ├─ abort reaper
//!       ├─ ServerContext::shutdown()   -- closes the registry, stops streams
//!       ├─ await pending starts         -- each returns None once closed
//!       └─ StreamingRegistry::stop_all()
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use rfb_core::config::ServerConfig;
use rfb_server::infrastructure::context::ServerContext;
use rfb_server::infrastructure::storage::config::{config_file_path, load_config_from};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// RFB server control plane.
#[derive(Debug, Parser)]
#[command(
    name = "rfb-server",
    about = "Configuration store and per-client screen streaming for an RFB server",
    version
)]
struct Cli {
    /// Path to the configuration snapshot.
    ///
    /// Defaults to `server.cfg` in the platform configuration directory.
    #[arg(long, env = "RFB_CONFIG")]
    config: Option<PathBuf>,

    /// Start streaming to this host on startup.  May be repeated.
    ///
    /// Streaming must be enabled in the configuration.
    #[arg(long = "stream-to", value_name = "HOST")]
    stream_to: Vec<String>,

    /// Seconds between checks for streaming processes that exited.
    #[arg(long, default_value_t = 5, env = "RFB_REAP_INTERVAL")]
    reap_interval: u64,
}

/// Maps the 0..=9 configuration log level onto a tracing filter.
fn filter_for_log_level(level: u8) -> &'static str {
    match level {
        0 => "error",
        1..=2 => "warn",
        3..=5 => "info",
        6..=8 => "debug",
        _ => "trace",
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let path = match cli.config {
        Some(path) => path,
        None => config_file_path().context("no --config given and no platform config directory")?,
    };

    // Loaded before logging is up so that its log level can seed the filter.
    let loaded = load_config_from(&path);
    let fallback = loaded
        .as_ref()
        .map(|c| filter_for_log_level(c.log_level()))
        .unwrap_or("info");

    // `RUST_LOG` wins over the stored log level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .init();

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            warn!("falling back to default configuration: {e}");
            ServerConfig::new()
        }
    };

    info!(
        "RFB server starting: rfb_port={}, streaming={}",
        config.rfb_port(),
        config.is_streaming_enabled()
    );

    let context = Arc::new(ServerContext::with_system_services(Arc::new(config)));

    // ── Initial streams ───────────────────────────────────────────────────────
    //
    // `start` may sleep for the configured delay and spawns a process, so it
    // runs on the blocking pool.
    let starts: Vec<_> = cli
        .stream_to
        .into_iter()
        .map(|host| {
            let ctx = Arc::clone(&context);
            tokio::task::spawn_blocking(move || {
                if ctx.streaming().start(&host).is_none() {
                    warn!("no stream started for {host}");
                }
            })
        })
        .collect();

    // ── Reaper ────────────────────────────────────────────────────────────────
    let reaper_ctx = Arc::clone(&context);
    let reap_every = Duration::from_secs(cli.reap_interval.max(1));
    let reaper = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(reap_every);
        loop {
            ticker.tick().await;
            let reaped = reaper_ctx.streaming().reap_exited();
            if reaped > 0 {
                info!("reaped {reaped} exited streaming session(s)");
            }
        }
    });

    info!("RFB server ready.  Press Ctrl-C to exit.");

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => error!("failed to listen for Ctrl-C signal: {e}"),
    }

    reaper.abort();
    context.shutdown();

    for start in starts {
        if let Err(e) = start.await {
            error!("stream start task failed: {e}");
        }
    }
    context.streaming().stop_all();

    info!("RFB server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_mapping_covers_range() {
        assert_eq!(filter_for_log_level(0), "error");
        assert_eq!(filter_for_log_level(2), "warn");
        assert_eq!(filter_for_log_level(4), "info");
        assert_eq!(filter_for_log_level(7), "debug");
        assert_eq!(filter_for_log_level(9), "trace");
    }

    #[test]
    fn test_cli_parses_repeated_stream_targets() {
        let cli = Cli::parse_from([
            "rfb-server",
            "--config",
            "/tmp/server.cfg",
            "--stream-to",
            "10.0.0.5",
            "--stream-to",
            "desk.local",
        ]);

        assert_eq!(cli.config, Some(PathBuf::from("/tmp/server.cfg")));
        assert_eq!(cli.stream_to, ["10.0.0.5", "desk.local"]);
        assert_eq!(cli.reap_interval, 5);
    }
}
