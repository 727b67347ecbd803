//! Typed events emitted by every committed state transition.
//!
//! Events are part of the committed record: they are buffered in the
//! transaction and published to an [`EventSink`] right before the store
//! write. A sink failure aborts the whole command.

use serde::{Deserialize, Serialize};

use crate::{
    AccountId, BidId, DecCoin, GroupId, LeaseCloseReason, LeaseId, OrderId, PaymentId, Result,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    GroupCreated { id: GroupId },
    GroupPaused { id: GroupId },
    GroupStarted { id: GroupId },
    GroupInsufficientFunds { id: GroupId },
    GroupClosed { id: GroupId },
    OrderCreated { id: OrderId },
    OrderClosed { id: OrderId },
    BidCreated { id: BidId, price: DecCoin },
    BidLost { id: BidId },
    BidClosed { id: BidId },
    LeaseCreated { id: LeaseId, price: DecCoin },
    LeaseClosed { id: LeaseId, reason: LeaseCloseReason },
    AccountOpened { id: AccountId, deposit: DecCoin },
    AccountDeposited { id: AccountId, amount: DecCoin },
    AccountOverdrawn { id: AccountId },
    AccountClosed { id: AccountId },
    PaymentCreated { account: AccountId, payment: PaymentId, rate: DecCoin },
    PaymentWithdrawn { account: AccountId, payment: PaymentId, amount: DecCoin },
    PaymentClosed { account: AccountId, payment: PaymentId },
}

/// Receives the events of each committed transaction.
pub trait EventSink {
    /// # Errors
    /// Any error aborts the transaction that produced `events`.
    fn publish(&mut self, height: u64, events: &[LedgerEvent]) -> Result<()>;
}

impl EventSink for Vec<LedgerEvent> {
    fn publish(&mut self, _height: u64, events: &[LedgerEvent]) -> Result<()> {
        self.extend_from_slice(events);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Address;

    #[test]
    fn vec_sink_collects() {
        let mut sink: Vec<LedgerEvent> = Vec::new();
        let id = GroupId::new(Address::new("tenant"), 1, 1).order(1);
        sink.publish(3, &[LedgerEvent::OrderCreated { id: id.clone() }])
            .unwrap();
        assert_eq!(sink, vec![LedgerEvent::OrderCreated { id }]);
    }

    #[test]
    fn events_serialize_tagged() {
        let id = GroupId::new(Address::new("tenant"), 1, 1);
        let json = serde_json::to_string(&LedgerEvent::GroupClosed { id }).unwrap();
        assert!(json.contains(r#""type":"group_closed""#), "{json}");
    }
}
