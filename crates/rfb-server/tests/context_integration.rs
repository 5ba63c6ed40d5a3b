//! Integration tests for the process-scoped `ServerContext`.
//!
//! Covers hot-reload from disk, save/reload round trips and deterministic
//! shutdown with live streams.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rfb_core::config::ServerConfig;
use rfb_server::application::streaming::ProcessLauncher;
use rfb_server::infrastructure::context::ServerContext;
use rfb_server::infrastructure::storage::config::{save_config_to, StoreError, CONFIG_FILE_NAME};
use rfb_server::infrastructure::streaming::mock::{MockLauncher, StaticResolver};

fn temp_config_path(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("rfb_ctx_test_{}_{}", tag, std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    dir.join(CONFIG_FILE_NAME)
}

fn context(config: ServerConfig) -> (ServerContext, Arc<MockLauncher>) {
    let launcher = Arc::new(MockLauncher::new());
    let ctx = ServerContext::new(
        Arc::new(config),
        Arc::clone(&launcher) as Arc<dyn ProcessLauncher>,
        Arc::new(StaticResolver::new()),
    );
    (ctx, launcher)
}

#[test]
fn test_reload_from_disk_disables_streaming_for_new_starts() {
    // Arrange: running context with streaming on, file on disk with it off
    let path = temp_config_path("disable");
    let running = ServerConfig::new();
    running.set_streaming_enabled(true);
    let (ctx, _launcher) = context(running);
    assert!(ctx.streaming().start("10.1.0.1").is_some());

    let on_disk = ServerConfig::new();
    on_disk.set_streaming_enabled(false);
    save_config_to(&on_disk, &path).unwrap();

    // Act
    let failures = ctx.reload_from(&path).expect("reload");

    // Assert
    assert_eq!(failures, 0);
    assert!(!ctx.config().is_streaming_enabled());
    assert!(ctx.streaming().start("10.1.0.2").is_none());
    // Existing sessions are not touched by a reload.
    assert_eq!(ctx.streaming().len(), 1);

    fs::remove_dir_all(path.parent().unwrap()).ok();
}

#[test]
fn test_reload_from_corrupt_file_keeps_current_config() {
    // Arrange
    let path = temp_config_path("corrupt");
    fs::write(&path, b"not a snapshot").unwrap();
    let current = ServerConfig::new();
    current.set_rfb_port(5933);
    let (ctx, _) = context(current);

    // Act
    let result = ctx.reload_from(&path);

    // Assert
    assert!(matches!(result, Err(StoreError::Codec { .. })));
    assert_eq!(ctx.config().rfb_port(), 5933);

    fs::remove_dir_all(path.parent().unwrap()).ok();
}

#[test]
fn test_save_then_reload_preserves_settings() {
    let path = temp_config_path("save");
    let config = ServerConfig::new();
    config.set_polling_interval(250);
    config.set_streaming_start_delay_ms(0);
    let (ctx, _) = context(config);

    ctx.save_to(&path).unwrap();
    ctx.reload_from(&path).unwrap();

    assert_eq!(ctx.config().polling_interval(), 250);

    fs::remove_dir_all(path.parent().unwrap()).ok();
}

#[test]
fn test_shutdown_terminates_all_streams_and_is_idempotent() {
    // Arrange
    let config = ServerConfig::new();
    config.set_streaming_enabled(true);
    let (ctx, launcher) = context(config);
    ctx.streaming().start("10.2.0.1").unwrap();
    ctx.streaming().start("10.2.0.2").unwrap();

    // Act
    assert!(ctx.shutdown());
    assert!(!ctx.shutdown());

    // Assert
    assert!(ctx.streaming().is_empty());
    assert_eq!(launcher.alive_count(), 0);
    assert!(launcher
        .launched()
        .iter()
        .all(|p| p.termination_count() == 1));
}

#[test]
fn test_shutdown_during_start_delay_leaves_nothing_running() {
    // Arrange: three starts sleeping in their 200 ms delay
    let config = ServerConfig::new();
    config.set_streaming_enabled(true);
    config.set_streaming_start_delay_ms(200);
    let (ctx, launcher) = context(config);
    let ctx = Arc::new(ctx);
    let starts: Vec<_> = ["10.3.0.1", "10.3.0.2", "10.3.0.3"]
        .into_iter()
        .map(|host| {
            let ctx = Arc::clone(&ctx);
            thread::spawn(move || ctx.streaming().start(host).is_some())
        })
        .collect();
    thread::sleep(Duration::from_millis(50));

    // Act
    ctx.shutdown();
    let started: Vec<bool> = starts.into_iter().map(|h| h.join().unwrap()).collect();
    ctx.streaming().stop_all();

    // Assert
    assert_eq!(started, [false, false, false]);
    assert!(ctx.streaming().is_empty());
    assert!(launcher.launched().is_empty());
    assert_eq!(launcher.alive_count(), 0);
}
