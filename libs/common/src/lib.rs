//! Home Heat Control basic library
//!
//! Ambient functions shared by every host embedding the engine:
//! - logging setup (console + optional daily rolling file) with a reloadable filter

pub mod logging;

pub use logging::{get_log_level, init_with_config, set_log_level, LogConfig};
