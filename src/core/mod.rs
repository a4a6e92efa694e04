//! Core abstractions shared across the proxy: errors, config, logging.

pub mod config;
pub mod error;
pub mod logging;

pub use config::Config;
pub use error::{GuardianError, GuardianResult};
