//! Deterministic compact token building
//!
//! Tokens are SHA-256 digests rendered as lowercase hex and truncated. The
//! optional namespace is folded into the hashed content so tokens derived
//! for different purposes never collide even on identical seeds.

use sha2::{Digest, Sha256};

/// Separator between namespace, fingerprint and identity components.
///
/// The ASCII unit separator is not a legal character in any component, so
/// distinct component sequences can never produce the same seed.
pub const SEED_SEPARATOR: char = '\u{1f}';

/// Build a deterministic compact token over `[0-9a-f]`.
pub fn compact_token(seed: &str, length: usize, namespace: Option<&str>) -> String {
    debug_assert!(length >= 1, "token length must be >= 1");

    let mut hasher = Sha256::new();
    if let Some(namespace) = namespace {
        hasher.update(namespace.trim().as_bytes());
        hasher.update(SEED_SEPARATOR.to_string().as_bytes());
    }
    hasher.update(seed.trim().as_bytes());

    let digest = hasher.finalize();
    let mut encoded = String::with_capacity(digest.len() * 2);
    for byte in digest {
        encoded.push_str(&format!("{byte:02x}"));
    }
    encoded.truncate(length);
    encoded
}
