//! coretray - Supervise an external proxy core from a resident shell
//!
//! The library holds the settings store, the process supervisor, and the
//! interactive shell that drives them. The `coretray` binary wraps it in a CLI.

pub mod core;
pub mod persistence;
pub mod shell;

/// Application name constant
pub const APP_NAME: &str = "coretray";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
