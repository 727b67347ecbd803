//! Supply conservation invariant checker.
//!
//! Invariants enforced by [`crate::Ledger::check_invariants`]:
//! ```text
//! ∀ denom: Σ bank balances                == Σ mints
//! ∀ denom: escrow module balance          == Σ account (balance + funds) + Σ payment balance
//! ```
//!
//! Value only enters through mints; escrow only moves it. A violation means
//! the ledger is corrupt and is reported as a fatal error.

use std::collections::BTreeMap;

use leasematch_types::{Account, DecCoin, LedgerError, Payment, Result};
use rust_decimal::Decimal;

/// Tracks per-denom minted supply and validates conservation.
#[derive(Debug, Clone, Default)]
pub struct SupplyConservation {
    /// Total minted per denom since genesis.
    mints: BTreeMap<String, Decimal>,
}

impl SupplyConservation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// `InvalidAmount` if the denom's total supply would overflow.
    pub fn record_mint(&mut self, coin: &DecCoin) -> Result<()> {
        let total = self.mints.entry(coin.denom.clone()).or_insert(Decimal::ZERO);
        *total = total
            .checked_add(coin.amount)
            .ok_or_else(|| LedgerError::InvalidAmount(format!("minting {coin} overflows supply")))?;
        Ok(())
    }

    #[must_use]
    pub fn expected_supply(&self, denom: &str) -> Decimal {
        self.mints.get(denom).copied().unwrap_or(Decimal::ZERO)
    }

    /// Denominations that have been minted, ascending.
    #[must_use]
    pub fn tracked_denoms(&self) -> Vec<String> {
        self.mints.keys().cloned().collect()
    }

    /// # Errors
    /// `StateCorruption` if `actual` differs from everything minted.
    pub fn verify(&self, denom: &str, actual: Decimal) -> Result<()> {
        let expected = self.expected_supply(denom);
        if actual != expected {
            return Err(LedgerError::StateCorruption(format!(
                "{denom}: bank supply {actual} != minted {expected}"
            )));
        }
        Ok(())
    }

    /// The escrow module must hold exactly what accounts and payments owe.
    ///
    /// # Errors
    /// `StateCorruption` on any difference.
    pub fn verify_escrow_backing(
        &self,
        denom: &str,
        escrow_balance: Decimal,
        accounts: &[Account],
        payments: &[Payment],
    ) -> Result<()> {
        let overflow = || LedgerError::StateCorruption(format!("{denom}: escrow totals overflow"));
        let held = accounts
            .iter()
            .filter(|a| a.balance.denom == denom)
            .flat_map(|a| [a.balance.amount, a.funds.amount])
            .try_fold(Decimal::ZERO, |acc, x| acc.checked_add(x))
            .ok_or_else(overflow)?;
        let accrued = payments
            .iter()
            .filter(|p| p.balance.denom == denom)
            .try_fold(Decimal::ZERO, |acc, p| acc.checked_add(p.balance.amount))
            .ok_or_else(overflow)?;
        if Some(escrow_balance) != held.checked_add(accrued) {
            return Err(LedgerError::StateCorruption(format!(
                "{denom}: escrow holds {escrow_balance}, accounts {held} + accrued payments {accrued}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leasematch_types::{
        AccountId, AccountState, Address, DeploymentId, PaymentId, PaymentState,
    };

    fn uakt(n: i64) -> DecCoin {
        DecCoin::from_int("uakt", n)
    }

    fn account(balance: i64, funds: i64) -> Account {
        Account {
            id: AccountId::for_deployment(&DeploymentId::new(Address::dummy("tenant"), 1)),
            owner: Address::dummy("tenant"),
            depositor: Address::dummy("tenant"),
            state: AccountState::Open,
            balance: uakt(balance),
            funds: uakt(funds),
            transferred: uakt(0),
            settled_at: 1,
        }
    }

    fn payment(balance: i64) -> Payment {
        Payment {
            account_id: account(0, 0).id,
            payment_id: PaymentId("lease".into()),
            owner: Address::dummy("provider"),
            state: PaymentState::Active,
            rate: uakt(1),
            balance: uakt(balance),
            withdrawn: uakt(0),
        }
    }

    #[test]
    fn empty_supply_is_zero() {
        let sc = SupplyConservation::new();
        assert_eq!(sc.expected_supply("uakt"), Decimal::ZERO);
        assert!(sc.verify("uakt", Decimal::ZERO).is_ok());
    }

    #[test]
    fn mints_accumulate_per_denom() {
        let mut sc = SupplyConservation::new();
        sc.record_mint(&uakt(1_000)).unwrap();
        sc.record_mint(&uakt(500)).unwrap();
        sc.record_mint(&DecCoin::from_int("uusd", 7)).unwrap();
        assert_eq!(sc.expected_supply("uakt"), Decimal::from(1_500));
        assert_eq!(sc.tracked_denoms(), vec!["uakt".to_string(), "uusd".to_string()]);
    }

    #[test]
    fn verify_fails_when_imbalanced() {
        let mut sc = SupplyConservation::new();
        sc.record_mint(&uakt(10)).unwrap();
        let err = sc.verify("uakt", Decimal::from(11)).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn escrow_backing() {
        let sc = SupplyConservation::new();
        let accounts = [account(30, 20)];
        let payments = [payment(5)];
        assert!(sc
            .verify_escrow_backing("uakt", Decimal::from(55), &accounts, &payments)
            .is_ok());
        assert!(sc
            .verify_escrow_backing("uakt", Decimal::from(50), &accounts, &payments)
            .is_err());
        assert!(sc
            .verify_escrow_backing("uusd", Decimal::ZERO, &accounts, &payments)
            .is_ok());
    }
}
