//! Per-transaction execution context.
//!
//! A [`TxContext`] buffers every write, event and escrow notice produced by
//! one command. [`TxContext::commit`] publishes the events and then flushes
//! the writes; dropping the context (or any error before commit) leaves the
//! committed store untouched.

use std::collections::VecDeque;

use crate::{Account, CacheStore, EventSink, KvStore, LedgerError, LedgerEvent, Payment, Result};

/// Escrow state changes that subscribers must react to in the same
/// transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscrowNotice {
    AccountClosed(Account),
    PaymentClosed(Payment),
}

pub struct TxContext<'a> {
    store: CacheStore<'a>,
    height: u64,
    events: Vec<LedgerEvent>,
    notices: VecDeque<EscrowNotice>,
}

impl<'a> TxContext<'a> {
    pub fn new(parent: &'a mut dyn KvStore, height: u64) -> Self {
        Self {
            store: CacheStore::new(parent),
            height,
            events: Vec::new(),
            notices: VecDeque::new(),
        }
    }

    /// Current block height; the settlement clock.
    #[must_use]
    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn emit(&mut self, event: LedgerEvent) {
        self.events.push(event);
    }

    #[must_use]
    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    pub fn push_notice(&mut self, notice: EscrowNotice) {
        self.notices.push_back(notice);
    }

    pub fn pop_notice(&mut self) -> Option<EscrowNotice> {
        self.notices.pop_front()
    }

    /// Publish buffered events, then write buffered state through.
    ///
    /// # Errors
    /// `StateCorruption` if escrow notices were never dispatched; any sink
    /// or store error is returned unchanged.
    pub fn commit(self, sink: &mut dyn EventSink) -> Result<Vec<LedgerEvent>> {
        if !self.notices.is_empty() {
            return Err(LedgerError::StateCorruption(format!(
                "{} escrow notice(s) left undispatched",
                self.notices.len()
            )));
        }
        sink.publish(self.height, &self.events)?;
        self.store.commit()?;
        Ok(self.events)
    }
}

impl KvStore for TxContext<'_> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.store.get(key)
    }

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.store.set(key, value)
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.store.delete(key)
    }

    fn iter_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.store.iter_prefix(prefix)
    }
}
