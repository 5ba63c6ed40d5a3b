//! # rfb-core
//!
//! Shared control-plane library for the RFB server: the process-wide
//! configuration record, its credentials and persistence format, the
//! reload/shutdown broadcaster, and the password obfuscation codec.
//!
//! This crate has no dependencies on OS process APIs or sockets.
//!
//! # Architecture overview
//!
//! An RFB (VNC) server runs one or more threads per client connection plus an
//! administration thread.  All of them consult one [`ServerConfig`]:
//!
//! - **`config`** – the configuration record ([`ConfigState`]), the reentrant
//!   lock around it ([`ServerConfig`] / [`ConfigGuard`]), the three VNC
//!   credentials, the opaque access-control and port-mapping containers, and
//!   the versioned snapshot codec used to persist everything.
//!
//! - **`events`** – [`ConfigReloadBroadcaster`], which tells subscribed
//!   components when a new configuration became current or the server is
//!   shutting down.
//!
//! - **`password`** – the reversible hex form used to keep VNC passwords out
//!   of plain sight in stored settings.

pub mod config;
pub mod events;
pub mod password;

pub use config::{
    CaptureMode, ConfigGuard, ConfigIoError, ConfigState, CredentialKind, ServerConfig,
    StreamingSettings, PASSWORD_SIZE,
};
pub use events::{ConfigListener, ConfigReloadBroadcaster, ListenerError};
pub use password::PasswordFormatError;
