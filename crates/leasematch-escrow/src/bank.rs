//! Store-backed bank: external balances the escrow ledger draws from.
//!
//! Balances are kept per `(address, denom)`. Value only enters through
//! [`Bank::mint`]; every other operation moves it between addresses, so the
//! total supply of a denomination changes only on mint.
//!
//! Escrowed value sits in module accounts (see
//! [`constants::ESCROW_MODULE_ACCOUNT`]).

use leasematch_types::{
    Address, DecCoin, KeyBuilder, KvStore, LedgerError, Result, constants, load, load_prefix, save,
};
use tracing::debug;

const BALANCE_PREFIX: u8 = 0x01;

fn balance_key(addr: &Address, denom: &str) -> Vec<u8> {
    KeyBuilder::new(BALANCE_PREFIX)
        .str(addr.as_str())
        .str(denom)
        .build()
}

/// The address of a named module account.
#[must_use]
pub fn module_address(name: &str) -> Address {
    Address::new(name)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Bank;

impl Bank {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Current balance of `addr` in `denom` (zero if never funded).
    ///
    /// # Errors
    /// Store or codec failure.
    pub fn balance(&self, store: &dyn KvStore, addr: &Address, denom: &str) -> Result<DecCoin> {
        Ok(load(store, &balance_key(addr, denom))?.unwrap_or_else(|| DecCoin::zero(denom)))
    }

    /// Create new value at `addr`. The only source of supply.
    ///
    /// # Errors
    /// `InvalidAmount` for an invalid or non-positive coin.
    pub fn mint(&self, store: &mut dyn KvStore, addr: &Address, coin: &DecCoin) -> Result<()> {
        if !coin.is_valid() || !coin.is_positive() {
            return Err(LedgerError::InvalidAmount(format!("cannot mint {coin}")));
        }
        addr.validate()?;
        self.credit(store, addr, coin)?;
        debug!(address = %addr, amount = %coin, "minted");
        Ok(())
    }

    /// Move `coin` from `from` into the named module account.
    ///
    /// # Errors
    /// `InsufficientFunds` if `from` cannot cover `coin`.
    pub fn send_to_module(
        &self,
        store: &mut dyn KvStore,
        from: &Address,
        module: &str,
        coin: &DecCoin,
    ) -> Result<()> {
        self.send(store, from, &module_address(module), coin)
    }

    /// Move `coin` out of the named module account to `to`.
    ///
    /// # Errors
    /// `InsufficientFunds` if the module account cannot cover `coin`; for
    /// the escrow module that means the ledger is corrupt.
    pub fn send_from_module(
        &self,
        store: &mut dyn KvStore,
        module: &str,
        to: &Address,
        coin: &DecCoin,
    ) -> Result<()> {
        self.send(store, &module_address(module), to, coin)
    }

    /// Sum of every balance in `denom`, module accounts included.
    ///
    /// # Errors
    /// Store or codec failure.
    pub fn total_supply(&self, store: &dyn KvStore, denom: &str) -> Result<DecCoin> {
        let all: Vec<DecCoin> = load_prefix(store, &[BALANCE_PREFIX])?;
        all.iter()
            .filter(|c| c.denom == denom)
            .try_fold(DecCoin::zero(denom), |acc, c| acc.checked_add(c))
    }

    /// Balance held by the escrow module.
    ///
    /// # Errors
    /// Store or codec failure.
    pub fn escrow_balance(&self, store: &dyn KvStore, denom: &str) -> Result<DecCoin> {
        self.balance(
            store,
            &module_address(constants::ESCROW_MODULE_ACCOUNT),
            denom,
        )
    }

    fn send(
        &self,
        store: &mut dyn KvStore,
        from: &Address,
        to: &Address,
        coin: &DecCoin,
    ) -> Result<()> {
        if !coin.is_valid() {
            return Err(LedgerError::InvalidAmount(format!("cannot send {coin}")));
        }
        if coin.is_zero() {
            return Ok(());
        }
        let available = self.balance(store, from, &coin.denom)?;
        if available.is_lt(coin)? {
            return Err(LedgerError::InsufficientFunds {
                address: from.clone(),
                needed: coin.clone(),
                available,
            });
        }
        self.set_balance(store, from, &available.checked_sub(coin)?)?;
        self.credit(store, to, coin)
    }

    fn credit(&self, store: &mut dyn KvStore, addr: &Address, coin: &DecCoin) -> Result<()> {
        let current = self.balance(store, addr, &coin.denom)?;
        self.set_balance(store, addr, &current.checked_add(coin)?)
    }

    fn set_balance(&self, store: &mut dyn KvStore, addr: &Address, coin: &DecCoin) -> Result<()> {
        let key = balance_key(addr, &coin.denom);
        if coin.is_zero() {
            store.delete(&key)
        } else {
            save(store, key, coin)
        }
    }
}
