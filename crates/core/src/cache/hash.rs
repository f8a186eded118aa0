//! Entry key generation.

use sha2::{Digest, Sha256};

/// Compute the storage key for a request URL.
///
/// Entries are keyed by URL only; method and headers do not participate.
pub fn entry_key(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}
