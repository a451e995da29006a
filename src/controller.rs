//! Application controller.
//!
//! Wires the runtime client, registries, matchmaking service and web
//! server together and owns the periodic sweeps.

pub mod controller_handler;

pub use controller_handler::Controller;
