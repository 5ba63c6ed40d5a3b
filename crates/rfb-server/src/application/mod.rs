//! Application layer for the server.
//!
//! Use cases live here; the OS is reached only through the traits they
//! declare (`ProcessLauncher`, `AddressResolver`), which the
//! `infrastructure` layer implements.
//!
//! # Use cases
//!
//! - [`streaming`] – start, replace and stop the per-client screen broadcast.

pub mod streaming;
