//! # Pressing Common
//!
//! Shared plumbing for the Pressing offline agent crates.
//!
//! ## Features
//!
//! - Logging configuration and subscriber setup
//! - Wall-clock helpers used to stamp cache records

use std::time::{SystemTime, UNIX_EPOCH};

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat};

/// Milliseconds since the Unix epoch.
///
/// Clocks set before 1970 report zero rather than failing.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
