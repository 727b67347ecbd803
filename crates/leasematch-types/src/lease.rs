//! Leases: the binding contract formed from a winning bid.
//!
//! A lease is created once per winning bid and never reopened; once
//! `Closed`, re-bidding requires a fresh order.

use serde::{Deserialize, Serialize};

use crate::{DecCoin, LeaseId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeaseState {
    Active,
    Closed,
}

impl LeaseState {
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!((self, target), (Self::Active, Self::Closed))
    }
}

impl std::fmt::Display for LeaseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}

/// Why a lease was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeaseCloseReason {
    /// Tenant closed the lease.
    Owner,
    /// Provider closed its bid.
    Provider,
    /// The deployment escrow account ran dry.
    InsufficientFunds,
    /// The group or deployment was torn down.
    GroupClosed,
}

impl std::fmt::Display for LeaseCloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Owner => write!(f, "OWNER"),
            Self::Provider => write!(f, "PROVIDER"),
            Self::InsufficientFunds => write!(f, "INSUFFICIENT_FUNDS"),
            Self::GroupClosed => write!(f, "GROUP_CLOSED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub id: LeaseId,
    pub state: LeaseState,
    /// Price per block, copied from the winning bid.
    pub price: DecCoin,
    pub created_at: u64,
    pub closed_at: Option<u64>,
    pub close_reason: Option<LeaseCloseReason>,
}

impl Lease {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == LeaseState::Active
    }
}
