//! Terminal stream bridge.
//!
//! One bridge instance serves one WebSocket connection: it validates
//! the presented session, picks a terminal backend once at attach time
//! (the live container TTY, or the simulated shell when the container
//! is absent or the engine misbehaves), then pumps bytes both ways
//! until the client disconnects or the session dies.

pub mod backend;
pub mod bridge;
pub mod simulated;

pub use backend::{LiveContainerStream, TerminalBackend};
pub use bridge::{handle_connection, TerminalParams};
pub use simulated::SimulatedStream;
