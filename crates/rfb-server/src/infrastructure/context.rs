//! Process-scoped server state.
//!
//! [`ServerContext`] is the composition root: it owns the current
//! configuration, the reload/shutdown broadcaster and the streaming
//! registry, and wires the registry up as a listener.  The binary creates
//! exactly one and passes `Arc<ServerContext>` to whatever needs it.
//!
//! # Reload
//!
//! ```text
//! reload_from(path)
//!  ├─ load snapshot into a fresh ServerConfig   (error → current config kept)
//!  └─ reload(fresh)
//!       ├─ swap current Arc<ServerConfig>
//!       └─ broadcast_reload(&fresh)  → StreamingRegistry caches the new Arc
//! ```

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rfb_core::config::ServerConfig;
use rfb_core::events::{ConfigListener, ConfigReloadBroadcaster};
use tracing::{info, warn};

use crate::application::streaming::{AddressResolver, ProcessLauncher, StreamingRegistry};
use crate::infrastructure::storage::config::{load_into, save_config_to, StoreError};
use crate::infrastructure::streaming::{SystemLauncher, SystemResolver};

/// Owns everything that lives for the whole server process.
pub struct ServerContext {
    config: RwLock<Arc<ServerConfig>>,
    broadcaster: ConfigReloadBroadcaster,
    streaming: Arc<StreamingRegistry>,
    shut_down: AtomicBool,
}

impl ServerContext {
    /// Builds a context around `config` and subscribes the streaming
    /// registry to reload and shutdown events.
    pub fn new(
        config: Arc<ServerConfig>,
        launcher: Arc<dyn ProcessLauncher>,
        resolver: Arc<dyn AddressResolver>,
    ) -> Self {
        let streaming = Arc::new(StreamingRegistry::new(
            Arc::clone(&config),
            launcher,
            resolver,
        ));
        Self::with_registry(config, streaming)
    }

    /// Like [`new`](Self::new) with an already-built registry.
    pub fn with_registry(config: Arc<ServerConfig>, streaming: Arc<StreamingRegistry>) -> Self {
        let broadcaster = ConfigReloadBroadcaster::new();
        broadcaster.subscribe(Arc::clone(&streaming) as Arc<dyn ConfigListener>);

        Self {
            config: RwLock::new(config),
            broadcaster,
            streaming,
            shut_down: AtomicBool::new(false),
        }
    }

    /// Context backed by real OS processes and the system resolver.
    pub fn with_system_services(config: Arc<ServerConfig>) -> Self {
        Self::new(config, Arc::new(SystemLauncher::new()), Arc::new(SystemResolver))
    }

    /// The configuration that is current right now.
    pub fn config(&self) -> Arc<ServerConfig> {
        Arc::clone(&*self.config.read())
    }

    pub fn streaming(&self) -> &Arc<StreamingRegistry> {
        &self.streaming
    }

    pub fn broadcaster(&self) -> &ConfigReloadBroadcaster {
        &self.broadcaster
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Makes `config` current and notifies every listener.
    ///
    /// Returns the number of listeners that failed.
    pub fn reload(&self, config: Arc<ServerConfig>) -> usize {
        *self.config.write() = Arc::clone(&config);
        let failures = self.broadcaster.broadcast_reload(&config);
        if failures > 0 {
            warn!("{failures} listener(s) failed during configuration reload");
        } else {
            info!("configuration reloaded");
        }
        failures
    }

    /// Loads `path` into a new configuration and makes it current.
    ///
    /// On any error, including a missing file, the current configuration is
    /// left in place.
    pub fn reload_from(&self, path: &Path) -> Result<usize, StoreError> {
        let fresh = ServerConfig::new();
        if !load_into(&fresh, path)? {
            return Err(StoreError::Io {
                path: PathBuf::from(path),
                source: io::Error::new(io::ErrorKind::NotFound, "configuration file not found"),
            });
        }
        Ok(self.reload(Arc::new(fresh)))
    }

    /// Persists the current configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<(), StoreError> {
        save_config_to(&self.config(), path)
    }

    /// Broadcasts shutdown once.  Returns `false` if already shut down.
    pub fn shutdown(&self) -> bool {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return false;
        }
        info!("server shutting down");
        let failures = self.broadcaster.broadcast_shutdown();
        if failures > 0 {
            warn!("{failures} listener(s) failed during shutdown");
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::streaming::mock::{MockLauncher, StaticResolver};

    fn context() -> (ServerContext, Arc<MockLauncher>) {
        let config = Arc::new(ServerConfig::new());
        config.set_streaming_enabled(true);
        let launcher = Arc::new(MockLauncher::new());
        let ctx = ServerContext::new(
            config,
            Arc::clone(&launcher) as Arc<dyn ProcessLauncher>,
            Arc::new(StaticResolver::new()),
        );
        (ctx, launcher)
    }

    #[test]
    fn test_new_subscribes_streaming_registry() {
        let (ctx, _) = context();
        assert_eq!(ctx.broadcaster().listener_count(), 1);
    }

    #[test]
    fn test_reload_updates_context_and_registry() {
        // Arrange
        let (ctx, _) = context();
        let fresh = Arc::new(ServerConfig::new());
        fresh.set_rfb_port(5911);

        // Act
        let failures = ctx.reload(Arc::clone(&fresh));

        // Assert
        assert_eq!(failures, 0);
        assert!(Arc::ptr_eq(&ctx.config(), &fresh));
        assert!(Arc::ptr_eq(&ctx.streaming().config(), &fresh));
    }

    #[test]
    fn test_reload_from_missing_file_keeps_current_config() {
        let (ctx, _) = context();
        let before = ctx.config();

        let result = ctx.reload_from(Path::new("/nonexistent/rfb/server.cfg"));

        assert!(matches!(result, Err(StoreError::Io { .. })));
        assert!(Arc::ptr_eq(&ctx.config(), &before));
    }

    #[test]
    fn test_shutdown_stops_streams_once() {
        // Arrange
        let (ctx, launcher) = context();
        ctx.streaming().start("10.0.0.7").unwrap();

        // Act
        let first = ctx.shutdown();
        let second = ctx.shutdown();

        // Assert
        assert!(first);
        assert!(!second);
        assert!(ctx.is_shut_down());
        assert!(ctx.streaming().is_empty());
        assert_eq!(launcher.alive_count(), 0);
    }
}
