//! Bids: a provider's priced offer against an open order.
//!
//! ```text
//!   ┌──────┐ lease created ┌────────┐
//!   │ OPEN ├──────────────▶│ ACTIVE ├──────┐
//!   └┬──┬──┘               └────────┘      │
//!    │  │ sibling won  ┌──────┐            ▼
//!    │  └─────────────▶│ LOST ├────────▶┌────────┐
//!    │                 └──────┘         │ CLOSED │
//!    └─────────────────────────────────▶└────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::{BidId, DecCoin, ResourcesOffer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BidState {
    Open,
    Active,
    Lost,
    Closed,
}

impl BidState {
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Open, Self::Active | Self::Lost | Self::Closed)
                | (Self::Active | Self::Lost, Self::Closed)
        )
    }

    /// Counts against the per-order bid limit.
    #[must_use]
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Open | Self::Active)
    }
}

impl std::fmt::Display for BidState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::Active => write!(f, "ACTIVE"),
            Self::Lost => write!(f, "LOST"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bid {
    pub id: BidId,
    pub state: BidState,
    /// Price per block.
    pub price: DecCoin,
    pub resources_offer: ResourcesOffer,
    pub created_at: u64,
}
