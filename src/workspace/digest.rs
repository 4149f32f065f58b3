//! Content hashing and timestamp helpers.
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::env;

/// SHA-256 of `bytes` as lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// First 16 hex chars of a SHA-256, for human-facing identifiers.
pub fn short_digest(bytes: &[u8]) -> String {
    sha256_hex(bytes)[..16].to_string()
}

/// Incremental hasher over labelled parts.
///
/// Each part is length-prefixed so `("ab", "c")` and `("a", "bc")` differ.
pub struct Digester {
    hasher: Sha256,
}

impl Digester {
    pub fn new(domain: &str) -> Self {
        let mut digester = Self {
            hasher: Sha256::new(),
        };
        digester.update(domain.as_bytes());
        digester
    }

    pub fn update(&mut self, part: &[u8]) -> &mut Self {
        self.hasher.update((part.len() as u64).to_le_bytes());
        self.hasher.update(part);
        self
    }

    pub fn finish(self) -> String {
        format!("{:x}", self.hasher.finalize())
    }
}

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Build timestamp honoring `SOURCE_DATE_EPOCH` for reproducible output.
pub fn reproducible_now() -> Option<DateTime<Utc>> {
    let raw = env::var("SOURCE_DATE_EPOCH").ok()?;
    let secs: i64 = raw.trim().parse().ok()?;
    DateTime::from_timestamp(secs, 0)
}
