//! Unified error types for perch.
//!
//! Every variant carries a stable code prefix that the host protocol reports
//! back to the application shell.

use tokio_rusqlite::rusqlite;

/// Failure reported by the SQLite connection thread.
pub type StoreError = tokio_rusqlite::Error;

/// Unified error types for the interception layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The network request was rejected, timed out, or its task was aborted.
    #[error("NETWORK_UNAVAILABLE: {0}")]
    NetworkUnavailable(String),

    /// Persistent store open/read/write failed.
    #[error("STORE_UNAVAILABLE: {0}")]
    StoreUnavailable(StoreError),

    /// No cache entry found for the given URL.
    ///
    /// Part of the reported code set only: strategies fall through to the
    /// network or the root document on a miss and never return this.
    #[error("CACHE_MISS: {0}")]
    CacheMiss(String),

    /// Navigation fallback chain exhausted: no network, no entry, no root document.
    #[error("NO_FALLBACK: {0}")]
    NoFallbackAvailable(String),

    /// Migration failed to apply.
    #[error("MIGRATION_FAILED: {0}")]
    MigrationFailed(String),

    /// Invalid URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Invalid input (malformed host event, unknown method, ...).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Lifecycle event arrived in the wrong worker state.
    #[error("INVALID_STATE: {0}")]
    InvalidState(String),

    /// Non-OK status where only a successful response is acceptable.
    #[error("HTTP_ERROR: {0}")]
    HttpError(String),

    /// Fetch response too large.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),
}

impl Error {
    /// Stable machine-readable code, matching the display prefix.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NetworkUnavailable(_) => "NETWORK_UNAVAILABLE",
            Error::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            Error::CacheMiss(_) => "CACHE_MISS",
            Error::NoFallbackAvailable(_) => "NO_FALLBACK",
            Error::MigrationFailed(_) => "MIGRATION_FAILED",
            Error::InvalidUrl(_) => "INVALID_URL",
            Error::InvalidInput(_) => "INVALID_INPUT",
            Error::InvalidState(_) => "INVALID_STATE",
            Error::HttpError(_) => "HTTP_ERROR",
            Error::FetchTooLarge(_) => "FETCH_TOO_LARGE",
        }
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::StoreUnavailable(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::StoreUnavailable(tokio_rusqlite::Error::Close(c)),
            _ => Error::StoreUnavailable(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::StoreUnavailable(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::StoreUnavailable(tokio_rusqlite::Error::Error(err))
    }
}
