//! SQLite-backed, generation-partitioned response cache.
//!
//! This module provides the persistent store behind the interception layer
//! using SQLite with async access via tokio-rusqlite. It supports:
//!
//! - Named generations that are created lazily and deleted as a unit
//! - Entries keyed by the SHA-256 of the canonical request URL
//! - Newer-wins upserts so a slow, older fetch never clobbers a fresh one
//! - WAL mode for concurrent access

pub mod connection;
pub mod hash;
pub mod migrations;
pub mod snapshot;
pub mod store;

pub use crate::Error;

pub use connection::CacheDb;
pub use snapshot::ResponseSnapshot;
pub use store::CacheStorage;
