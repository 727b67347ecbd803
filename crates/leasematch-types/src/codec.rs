//! Deterministic record encoding.
//!
//! Records are encoded as JSON. Persisted types only contain structs,
//! enums, `Vec`s and sorted attribute lists, so the same logical value always
//! produces identical bytes.

use serde::{Serialize, de::DeserializeOwned};

use crate::{LedgerError, Result};

/// # Errors
/// `Codec` if serialization fails.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| LedgerError::Codec(e.to_string()))
}

/// # Errors
/// `Codec` if `bytes` is not a valid encoding of `T`.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| LedgerError::Codec(e.to_string()))
}
