//! Network side of perch.
//!
//! This crate provides the `Fetcher` seam the interception layer talks to, its
//! reqwest-backed implementation, and URL canonicalization shared by the
//! classifier and the cache keys.

pub mod fetch;

pub use fetch::{Fetcher, FetchConfig, HttpFetcher, UrlError, canonicalize, resolve_path};
