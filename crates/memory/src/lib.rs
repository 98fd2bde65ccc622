//! Persistent memory store implementations for keepsake.

pub mod sqlite;

pub use sqlite::SqliteStore;
