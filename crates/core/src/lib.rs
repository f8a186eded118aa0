//! Core types and shared functionality for perch.
//!
//! This crate provides:
//! - Generation-partitioned response cache with SQLite backend
//! - Unified error types
//! - Configuration structures
//! - Request types shared by the fetcher and the interception layer

pub mod cache;
pub mod config;
pub mod error;
pub mod request;

pub use cache::{CacheDb, CacheStorage, ResponseSnapshot};
pub use config::{ConfigError, WorkerConfig};
pub use error::Error;
pub use request::{Request, RequestMode};
