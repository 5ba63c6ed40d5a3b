//! Integration tests for per-client streaming.
//!
//! These tests drive `StreamingRegistry` through the public API with the
//! mock launcher and static resolver, including concurrent use from several
//! connection threads.

use std::net::IpAddr;
use std::sync::Arc;
use std::thread;

use rfb_core::config::ServerConfig;
use rfb_server::application::streaming::{
    CaptureBackend, ProcessLauncher, SessionState, StreamingRegistry,
};
use rfb_server::infrastructure::streaming::mock::{MockLauncher, StaticResolver};

fn registry_with(config: &Arc<ServerConfig>, launcher: &Arc<MockLauncher>) -> StreamingRegistry {
    let resolver = StaticResolver::new()
        .with_host("viewer-1", "192.168.10.1".parse().unwrap())
        .with_host("viewer-2", "192.168.10.2".parse().unwrap());
    StreamingRegistry::new(
        Arc::clone(config),
        Arc::clone(launcher) as Arc<dyn ProcessLauncher>,
        Arc::new(resolver),
    )
    .with_backend(CaptureBackend::GdiGrab)
}

fn enabled_config() -> Arc<ServerConfig> {
    let config = Arc::new(ServerConfig::new());
    config.set_streaming_enabled(true);
    config
}

// ── At most one process per client ────────────────────────────────────────────

#[test]
fn test_restart_for_same_client_replaces_process() {
    // Arrange
    let config = enabled_config();
    let launcher = Arc::new(MockLauncher::new());
    let registry = registry_with(&config, &launcher);

    // Act
    let first = registry.start("viewer-1").expect("first start");
    let second = registry.start("192.168.10.1").expect("second start");

    // Assert
    assert_eq!(registry.len(), 1);
    assert_eq!(first.state(), SessionState::Stopped);
    assert_eq!(second.state(), SessionState::Running);
    assert_eq!(launcher.alive_count(), 1);
}

#[test]
fn test_concurrent_starts_leave_one_live_process_per_client() {
    // Arrange
    let config = enabled_config();
    let launcher = Arc::new(MockLauncher::new());
    let registry = Arc::new(registry_with(&config, &launcher));

    // Act: eight threads race to start streams for two clients
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                let host = if i % 2 == 0 { "viewer-1" } else { "viewer-2" };
                registry.start(host)
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.join().unwrap().is_some());
    }

    // Assert
    assert_eq!(registry.len(), 2);
    assert_eq!(launcher.launched().len(), 8);
    assert_eq!(launcher.alive_count(), 2);
}

// ── Stop paths ────────────────────────────────────────────────────────────────

#[test]
fn test_stop_for_never_started_client_does_nothing() {
    let config = enabled_config();
    let launcher = Arc::new(MockLauncher::new());
    let registry = registry_with(&config, &launcher);
    registry.start("viewer-1").unwrap();

    registry.stop("viewer-2");

    assert_eq!(registry.len(), 1);
    assert_eq!(launcher.alive_count(), 1);
}

#[test]
fn test_stop_all_terminates_every_process() {
    let config = enabled_config();
    let launcher = Arc::new(MockLauncher::new());
    let registry = registry_with(&config, &launcher);
    registry.start("viewer-1").unwrap();
    registry.start("viewer-2").unwrap();

    registry.stop_all();

    assert!(registry.is_empty());
    assert_eq!(launcher.alive_count(), 0);
}

#[test]
fn test_stop_all_racing_starts_leaves_no_orphan_process() {
    // Arrange
    let config = enabled_config();
    let launcher = Arc::new(MockLauncher::new());
    let registry = Arc::new(registry_with(&config, &launcher));

    // Act: starters and stoppers interleave on the same registry
    let starters: Vec<_> = (0..16)
        .map(|i| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                let host = if i % 2 == 0 { "viewer-1" } else { "viewer-2" };
                registry.start(host)
            })
        })
        .collect();
    let stoppers: Vec<_> = (0..4)
        .map(|_| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || registry.stop_all())
        })
        .collect();
    for handle in starters {
        handle.join().unwrap();
    }
    for handle in stoppers {
        handle.join().unwrap();
    }

    // Assert: every live process belongs to a registered session
    assert!(registry.len() <= 2);
    assert_eq!(launcher.alive_count(), registry.len());
    for ip in registry.addresses() {
        assert!(registry.get_ip(ip).unwrap().is_running());
    }

    registry.stop_all();
    assert!(registry.is_empty());
    assert_eq!(launcher.alive_count(), 0);
}

#[test]
fn test_session_handle_can_stop_itself() {
    let config = enabled_config();
    let launcher = Arc::new(MockLauncher::new());
    let registry = registry_with(&config, &launcher);
    let session = registry.start("viewer-2").unwrap();

    session.stop();

    assert!(registry.get("viewer-2").is_none());
    assert_eq!(launcher.alive_count(), 0);
}

// ── Configuration gates ───────────────────────────────────────────────────────

#[test]
fn test_disabled_streaming_never_launches() {
    let config = Arc::new(ServerConfig::new());
    let launcher = Arc::new(MockLauncher::new());
    let registry = registry_with(&config, &launcher);

    assert!(registry.start("viewer-1").is_none());
    assert!(registry
        .start_for_peer("192.168.10.1:50000".parse().unwrap())
        .is_none());
    assert!(registry.is_empty());
    assert!(launcher.launched().is_empty());
}

#[test]
fn test_settings_change_applies_to_next_start() {
    // Arrange
    let config = enabled_config();
    let launcher = Arc::new(MockLauncher::new());
    let registry = registry_with(&config, &launcher);
    registry.start("viewer-1").unwrap();

    // Act
    config.set_streaming_framerate(10);
    let session = registry.start("viewer-1").unwrap();

    // Assert
    assert!(session.command_line().contains("-framerate 10"));
    assert!(launcher.launched()[0].command_line().contains("-framerate 25"));
}

#[test]
fn test_addresses_lists_registered_clients() {
    let config = enabled_config();
    let launcher = Arc::new(MockLauncher::new());
    let registry = registry_with(&config, &launcher);
    registry.start("viewer-1").unwrap();
    registry.start("viewer-2").unwrap();

    let mut addresses = registry.addresses();
    addresses.sort();

    let expected: Vec<IpAddr> = vec![
        "192.168.10.1".parse().unwrap(),
        "192.168.10.2".parse().unwrap(),
    ];
    assert_eq!(addresses, expected);
}
