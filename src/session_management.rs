//! Terminal session management.
//!
//! A terminal session is a token-authorized right to stream with one
//! container for a bounded time. The [`SessionRegistry`] is the single
//! owner of live session state; the durable store only receives
//! write-through copies for audit.

pub mod session;
pub mod session_registry;

pub use session::{TerminalSession, PENDING_CONTAINER};
pub use session_registry::SessionRegistry;
