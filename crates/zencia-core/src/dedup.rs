//! # Dedup Keys
//!
//! A dedup key identifies one logical user action across retries, so a
//! replayed action can be recognised instead of being applied twice.
//!
//! ```text
//!   <scope>:<sha256(content)[..16]>:<timestamp millis>
//!   e.g. 8fJ2kq:3f0a9c1d2b4e5f60:1760000000000
//! ```
//!
//! The timestamp is the one recorded when the action was first created,
//! never the time of the retry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use ts_rs::TS;

/// Number of hex characters of the content hash kept in the key.
const HASH_PREFIX_LEN: usize = 16;

/// Identifier of a single logical action (entity + content hash + timestamp).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(transparent)]
#[ts(export)]
pub struct DedupKey(String);

impl DedupKey {
    /// Derives the key for `content` submitted against `scope` at `at`.
    pub fn derive(scope: &str, content: &str, at: DateTime<Utc>) -> Self {
        let digest = Sha256::digest(content.as_bytes());
        let hash = hex::encode(digest);
        DedupKey(format!(
            "{}:{}:{}",
            scope,
            &hash[..HASH_PREFIX_LEN],
            at.timestamp_millis()
        ))
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DedupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
