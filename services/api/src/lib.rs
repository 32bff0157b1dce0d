//! Call Bridge API Library Crate
//!
//! Configuration, shared state, HTTP handlers, routing and the media-stream
//! bridge. The `bridge` binary is a thin wrapper around this library.

pub mod config;
pub mod handlers;
pub mod router;
pub mod state;
pub mod ws;
