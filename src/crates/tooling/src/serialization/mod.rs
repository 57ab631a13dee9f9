//! Serialization utilities
//!
//! Deterministic digests for cache keys.

use sha2::{Digest, Sha256};

/// Hex SHA-256 digest over a sequence of string parts
///
/// Each part is length-prefixed before hashing, so `["ab", "c"]` and
/// `["a", "bc"]` produce different digests. The result is stable across
/// processes and platforms.
///
/// # Example
///
/// ```rust
/// use tooling::serialization::digest_parts;
///
/// let a = digest_parts(&["gpt-4", "system", "user"]);
/// let b = digest_parts(&["gpt-4", "system", "user"]);
/// assert_eq!(a, b);
/// assert_eq!(a.len(), 64);
/// assert_ne!(digest_parts(&["ab", "c"]), digest_parts(&["a", "bc"]));
/// ```
pub fn digest_parts(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}
