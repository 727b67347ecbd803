//! Orders: a standing request for the resources of one deployment group.
//!
//! ```text
//!   ┌──────┐ lease created ┌────────┐ lease closed ┌────────┐
//!   │ OPEN ├──────────────▶│ ACTIVE ├─────────────▶│ CLOSED │
//!   └──┬───┘               └────────┘              └────────┘
//!      │ group closed                                  ▲
//!      └───────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::{GroupSpec, LedgerError, OrderId, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderState {
    Open,
    Active,
    Closed,
}

impl OrderState {
    /// Transitions are monotonic; nothing returns to `Open`.
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Open, Self::Active | Self::Closed) | (Self::Active, Self::Closed)
        )
    }
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::Active => write!(f, "ACTIVE"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub state: OrderState,
    pub spec: GroupSpec,
    pub created_at: u64,
}

impl Order {
    /// Bids are only accepted while the order is open.
    ///
    /// # Errors
    /// `OrderNotOpen` otherwise.
    pub fn validate_can_bid(&self) -> Result<()> {
        if self.state == OrderState::Open {
            Ok(())
        } else {
            Err(LedgerError::OrderNotOpen {
                id: self.id.clone(),
                actual: self.state,
            })
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state == OrderState::Closed
    }
}
