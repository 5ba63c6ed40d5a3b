//! Infrastructure layer for the server.
//!
//! Contains OS-facing adapters: process spawning and name resolution for
//! streaming, file-system storage for the configuration, and the
//! process-scoped [`context::ServerContext`] that wires them together.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `rfb_core`, but MUST NOT be imported by the `application` layer outside
//! of tests.

pub mod context;
pub mod storage;
pub mod streaming;
