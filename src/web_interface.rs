//! Web interface.
//!
//! JSON endpoints for sandbox and duel operations plus the WebSocket
//! terminal endpoint. Authentication policy lives upstream: the
//! identity proxy injects `x-user-id` / `x-admin` headers and this
//! layer only enforces ownership and admin checks against them.

pub mod routes;
pub mod types;
pub mod web_server;

pub use types::{Identity, WebState};
pub use web_server::WebServer;
