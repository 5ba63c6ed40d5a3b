//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module handles:
//!
//! - Locating the snapshot file in the platform-appropriate directory.
//! - Loading it into a [`ServerConfig`](rfb_core::config::ServerConfig),
//!   falling back to defaults on first run.
//! - Writing changes back to disk.

pub mod config;
