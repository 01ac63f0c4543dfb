//! Wallet shard server library.
//!
//! Exposes the API router, configuration, logging, and metrics so
//! integration tests can drive the service without binding a socket.

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
