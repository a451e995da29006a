//! Runtime configuration.
//!
//! Configuration is loaded from a TOML file (every section optional,
//! falling back to defaults) and validated before the controller starts.

pub mod config;
pub mod types;

pub use config::Config;
pub use types::{DuelConfig, RuntimeConfig, SessionConfig};
