//! Deployment groups.
//!
//! A group is the unit that orders are opened against. Its state decides
//! whether closing a lease re-opens a fresh order for re-bidding.
//!
//! ```text
//!   ┌──────┐ provider closed bid ┌────────┐
//!   │ OPEN ├────────────────────▶│ PAUSED │
//!   └┬──┬──┘◀────────────────────┴───┬────┘
//!    │  │         start              │
//!    │  │ escrow overdrawn           │
//!    │  ▼                            │
//!    │ ┌────────────────────┐        │
//!    │ │ INSUFFICIENT_FUNDS │◀───────┤
//!    │ └─────────┬──────────┘        │
//!    ▼           ▼                   ▼
//!   ┌──────────────────────────────────┐
//!   │              CLOSED              │
//!   └──────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::{GroupId, GroupSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupState {
    Open,
    Paused,
    InsufficientFunds,
    Closed,
}

impl GroupState {
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Open, Self::Paused | Self::InsufficientFunds | Self::Closed)
                | (Self::Paused, Self::Open | Self::InsufficientFunds | Self::Closed)
                | (Self::InsufficientFunds, Self::Closed)
        )
    }
}

impl std::fmt::Display for GroupState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::Paused => write!(f, "PAUSED"),
            Self::InsufficientFunds => write!(f, "INSUFFICIENT_FUNDS"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub state: GroupState,
    pub spec: GroupSpec,
    pub created_at: u64,
}

impl Group {
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == GroupState::Open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions() {
        assert!(GroupState::Open.can_transition_to(GroupState::Paused));
        assert!(GroupState::Paused.can_transition_to(GroupState::Open));
        assert!(GroupState::Paused.can_transition_to(GroupState::InsufficientFunds));
        assert!(GroupState::InsufficientFunds.can_transition_to(GroupState::Closed));
        assert!(!GroupState::InsufficientFunds.can_transition_to(GroupState::Open));
        assert!(!GroupState::Closed.can_transition_to(GroupState::Open));
        assert!(!GroupState::Closed.can_transition_to(GroupState::Closed));
    }
}
