//! Configuration reload and server shutdown notifications.
//!
//! Components that cache a reference to the current [`ServerConfig`], or own
//! resources that must be released on shutdown, implement [`ConfigListener`]
//! and subscribe to a [`ConfigReloadBroadcaster`].
//!
//! # Delivery guarantees
//!
//! - Listeners are notified **synchronously** on the broadcasting thread, in
//!   registration order.
//! - The listener list is copied before delivery, so a listener may subscribe
//!   further listeners from inside a hook without deadlocking (they receive the
//!   *next* broadcast, not the current one).
//! - A listener that returns an error or panics is logged and skipped; the
//!   remaining listeners are still notified.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error, warn};

use crate::config::ServerConfig;

/// Error type returned by listener hooks.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Receives configuration lifecycle events.
#[cfg_attr(test, mockall::automock)]
pub trait ConfigListener: Send + Sync {
    /// Stable name used in log lines.
    fn name(&self) -> &str;

    /// Called after a new configuration became current.
    fn on_config_reload(&self, _config: &Arc<ServerConfig>) -> Result<(), ListenerError> {
        Ok(())
    }

    /// Called once while the server is shutting down.
    fn on_server_shutdown(&self) -> Result<(), ListenerError> {
        Ok(())
    }
}

/// Ordered list of [`ConfigListener`]s.
#[derive(Default)]
pub struct ConfigReloadBroadcaster {
    listeners: RwLock<Vec<Arc<dyn ConfigListener>>>,
}

impl ConfigReloadBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `listener`; it is notified after all earlier subscribers.
    pub fn subscribe(&self, listener: Arc<dyn ConfigListener>) {
        debug!("config listener subscribed: {}", listener.name());
        self.listeners.write().push(listener);
    }

    /// Removes every subscription of `listener` (compared by pointer).
    pub fn unsubscribe(&self, listener: &Arc<dyn ConfigListener>) {
        self.listeners
            .write()
            .retain(|l| !Arc::ptr_eq(l, listener));
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Notifies every listener that `config` is now current.
    ///
    /// Returns the number of listeners whose hook failed.
    pub fn broadcast_reload(&self, config: &Arc<ServerConfig>) -> usize {
        self.deliver("reload", |listener| listener.on_config_reload(config))
    }

    /// Notifies every listener that the server is shutting down.
    ///
    /// Returns the number of listeners whose hook failed.
    pub fn broadcast_shutdown(&self) -> usize {
        self.deliver("shutdown", |listener| listener.on_server_shutdown())
    }

    fn deliver(
        &self,
        event: &str,
        hook: impl Fn(&dyn ConfigListener) -> Result<(), ListenerError>,
    ) -> usize {
        let listeners: Vec<Arc<dyn ConfigListener>> = self.listeners.read().clone();
        let mut failures = 0;

        for listener in &listeners {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| hook(listener.as_ref())));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failures += 1;
                    warn!("{} listener '{}' failed: {e}", event, listener.name());
                }
                Err(_) => {
                    failures += 1;
                    error!("{} listener '{}' panicked", event, listener.name());
                }
            }
        }
        failures
    }
}
