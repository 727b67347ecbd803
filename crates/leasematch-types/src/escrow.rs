//! Escrow accounts and payment streams.
//!
//! ## Account state machine
//!
//! ```text
//!   ┌──────┐ settlement shortfall ┌───────────┐
//!   │ OPEN ├─────────────────────▶│ OVERDRAWN │
//!   └──┬───┘                      └─────┬─────┘
//!      │ close                          │ close
//!      ▼                                ▼
//!   ┌──────────────────────────────────────┐
//!   │                CLOSED                │
//!   └──────────────────────────────────────┘
//! ```
//!
//! Payments follow `ACTIVE → CLOSED` or `ACTIVE → OVERDRAWN`; both are
//! terminal. Balances are never negative: a shortfall clamps the account to
//! zero and flips the state instead.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Address, BidId, DecCoin, DeploymentId, LeaseId, Result};

/// What an escrow account is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum AccountScope {
    /// Funds ongoing lease payments of a deployment.
    Deployment,
    /// Holds a provider's bid deposit.
    Bid,
}

impl fmt::Display for AccountScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deployment => write!(f, "deployment"),
            Self::Bid => write!(f, "bid"),
        }
    }
}

/// Escrow account identifier. `xid` embeds the owning marketplace ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct AccountId {
    pub scope: AccountScope,
    pub xid: String,
}

/// The marketplace entity an escrow account belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountOwner {
    Deployment(DeploymentId),
    Bid(BidId),
}

impl AccountId {
    #[must_use]
    pub fn for_deployment(id: &DeploymentId) -> Self {
        Self {
            scope: AccountScope::Deployment,
            xid: id.to_string(),
        }
    }

    #[must_use]
    pub fn for_bid(id: &BidId) -> Self {
        Self {
            scope: AccountScope::Bid,
            xid: id.to_string(),
        }
    }

    /// Recover the owning deployment or bid from `xid`.
    ///
    /// # Errors
    /// `InvalidId` if `xid` does not parse for this scope.
    pub fn owner(&self) -> Result<AccountOwner> {
        match self.scope {
            AccountScope::Deployment => self.xid.parse().map(AccountOwner::Deployment),
            AccountScope::Bid => self.xid.parse().map(AccountOwner::Bid),
        }
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scope, self.xid)
    }
}

/// Payment identifier within an account; for lease payments, the lease ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct PaymentId(pub String);

impl PaymentId {
    #[must_use]
    pub fn for_lease(id: &LeaseId) -> Self {
        Self(id.to_string())
    }

    /// # Errors
    /// `InvalidId` if this payment was not created for a lease.
    pub fn lease(&self) -> Result<LeaseId> {
        self.0.parse()
    }
}

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountState {
    Open,
    Overdrawn,
    Closed,
}

impl AccountState {
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Open, Self::Overdrawn | Self::Closed) | (Self::Overdrawn, Self::Closed)
        )
    }
}

impl fmt::Display for AccountState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::Overdrawn => write!(f, "OVERDRAWN"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentState {
    Active,
    Closed,
    Overdrawn,
}

impl PaymentState {
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!((self, target), (Self::Active, Self::Closed | Self::Overdrawn))
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl fmt::Display for PaymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::Closed => write!(f, "CLOSED"),
            Self::Overdrawn => write!(f, "OVERDRAWN"),
        }
    }
}

/// A funded escrow account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub owner: Address,
    /// Third party allowed to fund the account; equals `owner` when self-funded.
    pub depositor: Address,
    pub state: AccountState,
    /// Owner-funded balance, drawn first.
    pub balance: DecCoin,
    /// Depositor-funded balance, drawn after `balance`.
    pub funds: DecCoin,
    /// Total moved into payment streams so far.
    pub transferred: DecCoin,
    /// Height up to which payments have been accrued.
    pub settled_at: u64,
}

impl Account {
    /// Everything still available to pay from.
    ///
    /// # Errors
    /// `DenomMismatch` or `InvalidAmount` for a malformed account.
    pub fn available(&self) -> Result<DecCoin> {
        self.balance.checked_add(&self.funds)
    }
}

/// A metered draw-down stream against an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub account_id: AccountId,
    pub payment_id: PaymentId,
    /// Payee.
    pub owner: Address,
    pub state: PaymentState,
    /// Debited per block.
    pub rate: DecCoin,
    /// Accrued and not yet withdrawn.
    pub balance: DecCoin,
    /// Total paid out to the payee.
    pub withdrawn: DecCoin,
}
