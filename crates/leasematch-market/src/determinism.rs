//! Determinism verification utilities for cross-validator consistency.
//!
//! Every validator applying the same commands must end with byte-identical
//! state. The state root is a SHA-256 over every committed record in
//! ascending key order, so comparing two roots compares whole ledgers.

use leasematch_types::{KvStore, Result};
use sha2::{Digest, Sha256};

const DOMAIN: &[u8] = b"leasematch:state_root:v1:";

/// Hash every `(key, value)` pair of `store`, ascending by key.
///
/// Each key and value is length-prefixed so adjacent records cannot be
/// re-split into a colliding sequence.
pub fn compute_state_root(store: &dyn KvStore) -> Result<[u8; 32]> {
    let entries = store.iter_prefix(&[])?;
    let mut hasher = Sha256::new();
    hasher.update(DOMAIN);
    hasher.update((entries.len() as u64).to_le_bytes());
    for (key, value) in &entries {
        hasher.update((key.len() as u64).to_le_bytes());
        hasher.update(key);
        hasher.update((value.len() as u64).to_le_bytes());
        hasher.update(value);
    }
    let mut root = [0u8; 32];
    root.copy_from_slice(&hasher.finalize());
    Ok(root)
}

/// Recompute the root of `store` and compare it with `expected`.
pub fn verify_state_root(store: &dyn KvStore, expected: &[u8; 32]) -> Result<bool> {
    Ok(compute_state_root(store)? == *expected)
}

/// Lowercase hex form of a state root, for logs and comparisons in tests.
#[must_use]
pub fn state_root_hex(root: &[u8; 32]) -> String {
    hex::encode(root)
}
