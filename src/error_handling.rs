//! Error types for every subsystem.
//!
//! Each subsystem owns one error enum; engine-level failures are
//! translated into these at the `container_runtime` boundary so no raw
//! engine error ever crosses into session or stream logic.

pub mod types;

pub use types::*;
