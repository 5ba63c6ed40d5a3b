//! Per-client screen streaming.
//!
//! When a viewer connects, the server can additionally broadcast the desktop
//! to that viewer's address as an MPEG-TS stream produced by an external
//! encoder process (ffmpeg).  The stream runs independently of the RFB
//! connection itself.
//!
//! # Pieces
//!
//! - [`StreamingRegistry`] – the process-wide map of client IP → session.
//!   Guarantees at most one live session per client.
//! - [`StreamingSession`] – one external process bound to one destination
//!   address.
//! - [`command`] – builds the encoder command line from the streaming
//!   settings.
//! - [`ProcessLauncher`] / [`ProcessHandle`] and [`AddressResolver`] – the
//!   boundaries to the OS, implemented in `infrastructure` and replaced by
//!   mocks in tests.

use std::net::IpAddr;

use thiserror::Error;

pub mod command;
pub mod registry;
pub mod session;

pub use command::{build_command_line, CaptureBackend, STREAMER_PROGRAM};
pub use registry::StreamingRegistry;
pub use session::{SessionState, StreamingSession};

// ── Process-launch boundary ───────────────────────────────────────────────────

/// Error type for process launch failures.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("command line is empty")]
    EmptyCommandLine,

    #[error("unbalanced quote in command line")]
    UnbalancedQuote,

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// An owned handle to a running (or exited) external process.
pub trait ProcessHandle: Send {
    /// OS process id.
    fn id(&self) -> u32;

    /// Returns `false` once the process has exited.
    fn is_alive(&mut self) -> bool;

    /// Kills the process if it is still running.  No-op after exit.
    fn terminate(&mut self) -> std::io::Result<()>;
}

/// Starts external processes from a single command-line string.
///
/// The production implementation spawns OS processes; tests use
/// `infrastructure::streaming::mock::MockLauncher`.
pub trait ProcessLauncher: Send + Sync {
    /// Spawns `command_line` without waiting for it to finish.
    ///
    /// With `log_output` the child's stdout/stderr go to the server's own;
    /// otherwise they are discarded.
    fn launch(
        &self,
        command_line: &str,
        log_output: bool,
    ) -> Result<Box<dyn ProcessHandle>, LaunchError>;
}

// ── Address-resolution boundary ───────────────────────────────────────────────

/// Error type for host name resolution.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("could not resolve '{host}': {source}")]
    Lookup {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no usable address found for '{0}'")]
    NoAddress(String),
}

/// Turns a host string into a numeric IP address.
#[cfg_attr(test, mockall::automock)]
pub trait AddressResolver: Send + Sync {
    fn resolve(&self, host: &str) -> Result<IpAddr, ResolutionError>;
}
