//! Growth RPC - CLI orchestrator
//!
//! This crate provides the `growth` binary, its configuration and the command
//! functions it dispatches to.

pub mod commands;
pub mod config;
pub mod context;

pub use config::AppConfig;
pub use context::AppContext;
