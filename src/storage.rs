//! Storage subsystem
//!
//! Abstractions and implementation for the durable store behind the
//! sandbox core: terminal session audit rows, duel matches, rating
//! records, queue entry mirrors and direct challenges.
//!
//! Components:
//! - `storage_trait`: the Storage trait defining a uniform API.
//! - `database_storage`: SQLite implementation over sqlx.

pub mod database_storage;
pub mod storage_trait;

#[cfg(test)]
pub mod null_storage;

pub use database_storage::DatabaseStorage;
pub use storage_trait::Storage;
