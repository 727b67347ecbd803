//! Lease registry.
//!
//! A lease is created once from a winning bid and is terminal once Closed.
//! The registry never touches escrow.

use leasematch_types::{
    Bid, BidId, BidState, Group, KvStore, Lease, LeaseCloseReason, LeaseId, LeaseState,
    LedgerError, LedgerEvent, Order, OrderState, Result, TxContext, load, load_prefix, save,
};
use tracing::{debug, info};

use crate::bids::BidRegistry;
use crate::groups::GroupRegistry;
use crate::keys;
use crate::orders::OrderRegistry;

/// Result of matching a bid into a lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseMatch {
    pub lease: Lease,
    /// Sibling bids that were Open and are now Lost, ascending by provider.
    pub lost: Vec<BidId>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LeaseRegistry {
    orders: OrderRegistry,
    bids: BidRegistry,
    groups: GroupRegistry,
}

impl LeaseRegistry {
    pub fn get_lease(&self, store: &dyn KvStore, id: &LeaseId) -> Result<Option<Lease>> {
        load(store, &keys::lease_key(id))
    }

    /// # Errors
    /// `LeaseNotFound`.
    pub fn require_lease(&self, store: &dyn KvStore, id: &LeaseId) -> Result<Lease> {
        self.get_lease(store, id)?
            .ok_or_else(|| LedgerError::LeaseNotFound(id.clone()))
    }

    /// Every lease, ascending by key.
    pub fn all_leases(&self, store: &dyn KvStore) -> Result<Vec<Lease>> {
        load_prefix(store, &[keys::LEASE_PREFIX])
    }

    /// Check that `bid` can become a lease: bid, order and group all Open.
    ///
    /// # Errors
    /// The not-found or not-open error of whichever entity blocks, then
    /// `LeaseExists`.
    pub fn validate_lease(&self, store: &dyn KvStore, bid: &BidId) -> Result<(Bid, Order, Group)> {
        let bid = self.bids.require_bid(store, bid)?;
        if bid.state != BidState::Open {
            return Err(LedgerError::BidNotOpen {
                id: bid.id,
                actual: bid.state,
            });
        }
        let order = self.orders.require_order(store, &bid.id.order())?;
        if order.state != OrderState::Open {
            return Err(LedgerError::OrderNotOpen {
                id: order.id,
                actual: order.state,
            });
        }
        let group = self.groups.require_group(store, &bid.id.group())?;
        if !group.is_open() {
            return Err(LedgerError::GroupNotOpen {
                id: group.id,
                actual: group.state,
            });
        }
        if self.get_lease(store, &bid.id)?.is_some() {
            return Err(LedgerError::LeaseExists(bid.id));
        }
        Ok((bid, order, group))
    }

    /// Match `bid` into a lease: bid and order become Active, the lease is
    /// persisted, and every other Open bid on the order becomes Lost.
    pub fn create_lease(&self, ctx: &mut TxContext<'_>, bid: &BidId) -> Result<LeaseMatch> {
        let (bid, order, _) = self.validate_lease(&*ctx, bid)?;
        self.bids.on_bid_matched(ctx, &bid.id)?;
        self.orders.on_order_matched(ctx, &order.id)?;

        let lease = Lease {
            id: bid.id.clone(),
            state: LeaseState::Active,
            price: bid.price.clone(),
            created_at: ctx.height(),
            closed_at: None,
            close_reason: None,
        };
        save(ctx, keys::lease_key(&lease.id), &lease)?;
        ctx.emit(LedgerEvent::LeaseCreated {
            id: lease.id.clone(),
            price: lease.price.clone(),
        });

        let mut lost = Vec::new();
        for sibling in self.bids.bids_for_order(&*ctx, &order.id)? {
            if sibling.id != bid.id && sibling.state == BidState::Open {
                self.bids.on_bid_lost(ctx, &sibling.id)?;
                lost.push(sibling.id);
            }
        }
        info!(lease = %lease.id, price = %lease.price, lost = lost.len(), "lease created");
        Ok(LeaseMatch { lease, lost })
    }

    /// Flip the lease to Closed, recording why and when. Idempotent: an
    /// already Closed lease keeps its original reason.
    pub fn on_lease_closed(
        &self,
        ctx: &mut TxContext<'_>,
        id: &LeaseId,
        reason: LeaseCloseReason,
    ) -> Result<Lease> {
        let mut lease = self.require_lease(&*ctx, id)?;
        if !lease.is_active() {
            debug!(lease = %id, "lease already closed");
            return Ok(lease);
        }
        lease.state = LeaseState::Closed;
        lease.closed_at = Some(ctx.height());
        lease.close_reason = Some(reason);
        save(ctx, keys::lease_key(id), &lease)?;
        ctx.emit(LedgerEvent::LeaseClosed {
            id: id.clone(),
            reason,
        });
        info!(lease = %id, reason = ?reason, "lease closed");
        Ok(lease)
    }
}
