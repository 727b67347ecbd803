//! Byte-keyed store abstraction.
//!
//! - [`KvStore`]: get / set / delete / ascending prefix iteration
//! - [`MemStore`]: committed in-memory store (`BTreeMap`)
//! - [`CacheStore`]: per-transaction write buffer over a parent store;
//!   `commit()` writes through, dropping it discards every write
//! - [`KeyBuilder`]: order-preserving composite keys
//!
//! Iteration is always ascending by key so replay is deterministic.

use std::collections::BTreeMap;

use serde::{Serialize, de::DeserializeOwned};

use crate::{Result, codec};

/// A byte-keyed record store. Every method is fallible; failures are fatal.
pub trait KvStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;
    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()>;
    fn delete(&mut self, key: &[u8]) -> Result<()>;
    /// All entries whose key starts with `prefix`, ascending by key.
    fn iter_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;
}

/// Load and decode one record.
pub fn load<T: DeserializeOwned, S: KvStore + ?Sized>(store: &S, key: &[u8]) -> Result<Option<T>> {
    store.get(key)?.map(|bytes| codec::decode(&bytes)).transpose()
}

/// Encode and store one record.
pub fn save<T: Serialize, S: KvStore + ?Sized>(
    store: &mut S,
    key: Vec<u8>,
    value: &T,
) -> Result<()> {
    let bytes = codec::encode(value)?;
    store.set(key, bytes)
}

/// Load and decode every record under `prefix`, ascending by key.
pub fn load_prefix<T: DeserializeOwned, S: KvStore + ?Sized>(
    store: &S,
    prefix: &[u8],
) -> Result<Vec<T>> {
    store
        .iter_prefix(prefix)?
        .iter()
        .map(|(_, bytes)| codec::decode(bytes))
        .collect()
}

// ---------------------------------------------------------------------------
// MemStore
// ---------------------------------------------------------------------------

/// Committed in-memory store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemStore {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KvStore for MemStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.entries.insert(key, value);
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn iter_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(self
            .entries
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// CacheStore
// ---------------------------------------------------------------------------

/// Write buffer over a parent store.
///
/// Reads see buffered writes first. Nothing reaches the parent until
/// [`CacheStore::commit`].
pub struct CacheStore<'a> {
    parent: &'a mut dyn KvStore,
    /// `None` marks a buffered delete.
    overlay: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl<'a> CacheStore<'a> {
    pub fn new(parent: &'a mut dyn KvStore) -> Self {
        Self {
            parent,
            overlay: BTreeMap::new(),
        }
    }

    /// Number of buffered writes and deletes.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.overlay.len()
    }

    /// Apply every buffered write to the parent, in key order.
    pub fn commit(self) -> Result<()> {
        let Self { parent, overlay } = self;
        for (key, value) in overlay {
            match value {
                Some(value) => parent.set(key, value)?,
                None => parent.delete(&key)?,
            }
        }
        Ok(())
    }
}

impl KvStore for CacheStore<'_> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.overlay.get(key) {
            Some(buffered) => Ok(buffered.clone()),
            None => self.parent.get(key),
        }
    }

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.overlay.insert(key, Some(value));
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.overlay.insert(key.to_vec(), None);
        Ok(())
    }

    fn iter_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> =
            self.parent.iter_prefix(prefix)?.into_iter().collect();
        for (key, value) in self
            .overlay
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
        {
            match value {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        Ok(merged.into_iter().collect())
    }
}

// ---------------------------------------------------------------------------
// KeyBuilder
// ---------------------------------------------------------------------------

/// Composite key encoder.
///
/// Integers are big-endian and strings are length-prefixed, so the key of a
/// parent entity is a strict byte prefix of the keys of its children and
/// ascending key order matches field order.
#[derive(Debug, Clone)]
pub struct KeyBuilder(Vec<u8>);

impl KeyBuilder {
    #[must_use]
    pub fn new(prefix: u8) -> Self {
        Self(vec![prefix])
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn str(mut self, s: &str) -> Self {
        self.0.extend_from_slice(&(s.len() as u32).to_be_bytes());
        self.0.extend_from_slice(s.as_bytes());
        self
    }

    #[must_use]
    pub fn u8(mut self, v: u8) -> Self {
        self.0.push(v);
        self
    }

    #[must_use]
    pub fn u64(mut self, v: u64) -> Self {
        self.0.extend_from_slice(&v.to_be_bytes());
        self
    }

    #[must_use]
    pub fn u32(mut self, v: u32) -> Self {
        self.0.extend_from_slice(&v.to_be_bytes());
        self
    }

    #[must_use]
    pub fn build(self) -> Vec<u8> {
        self.0
    }
}
