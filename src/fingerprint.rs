//! # Fingerprint Gate
//!
//! Content hash of the rendered plaintext manifest, used to skip encryption and
//! publication when nothing changed since the last successful run.
//!
//! The hash is an MD5 hex digest so that `unencrypted_hash` values persisted by
//! earlier runs stay comparable. It detects changes; it is not a security boundary.

use serde::{Deserialize, Serialize};

/// Hex-encoded content hash of a rendered manifest
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap a previously stored hash
    pub fn from_stored(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint of `plaintext`
#[must_use]
pub fn fingerprint(plaintext: &str) -> Fingerprint {
    Fingerprint(format!("{:x}", md5::compute(plaintext.as_bytes())))
}

/// Whether `new_plaintext` must be re-encrypted and republished.
///
/// True when there is no stored fingerprint (first run) or when it differs.
#[must_use]
pub fn should_republish(new_plaintext: &str, stored: Option<&Fingerprint>) -> bool {
    match stored {
        Some(stored) => fingerprint(new_plaintext) != *stored,
        None => true,
    }
}
