//! Logger setup for hosts and tests.
//!
//! The engine itself only emits through the `log` facade: capacity and
//! device warnings, CPU retries, and evaluation lifecycle at debug level.

mod init;

pub use init::{init_logging, LoggingConfig, DEFAULT_FILTER};
