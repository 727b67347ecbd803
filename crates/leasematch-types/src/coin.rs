//! Decimal coin amounts.
//!
//! Prices, rates and balances are all [`DecCoin`]s: a denomination plus a
//! `rust_decimal::Decimal` amount. Arithmetic between coins of different
//! denominations is an error, never a silent conversion.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{LedgerError, Result, constants};

/// An amount of a single denomination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DecCoin {
    pub denom: String,
    pub amount: Decimal,
}

impl DecCoin {
    #[must_use]
    pub fn new(denom: impl Into<String>, amount: Decimal) -> Self {
        Self {
            denom: denom.into(),
            amount,
        }
    }

    #[must_use]
    pub fn from_int(denom: impl Into<String>, amount: i64) -> Self {
        Self::new(denom, Decimal::from(amount))
    }

    #[must_use]
    pub fn zero(denom: impl Into<String>) -> Self {
        Self::new(denom, Decimal::ZERO)
    }

    /// Lowercase ASCII letter first, then letters, digits or `/`.
    #[must_use]
    pub fn is_valid_denom(denom: &str) -> bool {
        let len_ok = (constants::MIN_DENOM_LEN..=constants::MAX_DENOM_LEN).contains(&denom.len());
        let mut bytes = denom.bytes();
        let first_ok = bytes.next().is_some_and(|b| b.is_ascii_lowercase());
        len_ok
            && first_ok
            && bytes.all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'/')
    }

    /// Recognized denomination and non-negative amount.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        Self::is_valid_denom(&self.denom) && !self.amount.is_sign_negative()
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    #[must_use]
    pub fn is_positive(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    fn check_denom(&self, other: &Self) -> Result<()> {
        if self.denom == other.denom {
            Ok(())
        } else {
            Err(LedgerError::DenomMismatch {
                expected: self.denom.clone(),
                actual: other.denom.clone(),
            })
        }
    }

    /// # Errors
    /// `DenomMismatch` if the denominations differ, `InvalidAmount` on
    /// overflow.
    pub fn checked_add(&self, other: &Self) -> Result<Self> {
        self.check_denom(other)?;
        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or_else(|| LedgerError::InvalidAmount(format!("{self} + {other} overflows")))?;
        Ok(Self::new(self.denom.clone(), amount))
    }

    /// # Errors
    /// `DenomMismatch` if the denominations differ, `InvalidAmount` if the
    /// result would be negative or overflow.
    pub fn checked_sub(&self, other: &Self) -> Result<Self> {
        self.check_denom(other)?;
        let amount = self
            .amount
            .checked_sub(other.amount)
            .ok_or_else(|| LedgerError::InvalidAmount(format!("{self} - {other} overflows")))?;
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(LedgerError::InvalidAmount(format!(
                "{self} - {other} is negative"
            )));
        }
        Ok(Self::new(self.denom.clone(), amount))
    }

    /// `self < other`, same denomination required.
    ///
    /// # Errors
    /// `DenomMismatch` if the denominations differ.
    pub fn is_lt(&self, other: &Self) -> Result<bool> {
        self.check_denom(other)?;
        Ok(self.amount < other.amount)
    }

    /// Scale the amount, keeping the denomination.
    ///
    /// # Errors
    /// `InvalidAmount` if the product is not representable.
    pub fn scaled(&self, factor: Decimal) -> Result<Self> {
        let amount = self
            .amount
            .checked_mul(factor)
            .ok_or_else(|| LedgerError::InvalidAmount(format!("{self} x {factor} overflows")))?;
        Ok(Self::new(self.denom.clone(), amount))
    }

    /// Like [`DecCoin::scaled`], clamped to the largest representable amount.
    #[must_use]
    pub fn saturating_scaled(&self, factor: Decimal) -> Self {
        Self::new(self.denom.clone(), self.amount.saturating_mul(factor))
    }

    /// Same-denomination sum, clamped to the largest representable amount.
    ///
    /// # Errors
    /// `DenomMismatch` if the denominations differ.
    pub fn saturating_add(&self, other: &Self) -> Result<Self> {
        self.check_denom(other)?;
        Ok(Self::new(self.denom.clone(), self.amount.saturating_add(other.amount)))
    }

    /// The smaller of two same-denomination coins.
    #[must_use]
    pub fn min(self, other: Self) -> Self {
        if other.amount < self.amount { other } else { self }
    }
}

impl fmt::Display for DecCoin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}
