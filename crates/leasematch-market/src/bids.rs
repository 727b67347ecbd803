//! Bid registry.
//!
//! ## Bid state machine
//!
//! ```text
//!   OPEN ──lease created──▶ ACTIVE ──lease closed──▶ CLOSED
//!    │                                                ▲
//!    ├──another bid won──▶ LOST ──────────────────────┤
//!    └──withdrawn─────────────────────────────────────┘
//! ```
//!
//! One bid per `(order, provider)`; at most `order_max_bids` Open or Active
//! bids per order.

use leasematch_types::{
    Address, Bid, BidId, BidState, DecCoin, KvStore, Lease, LedgerError, LedgerEvent,
    MarketParams, OrderId, ResourcesOffer, Result, TxContext, load, load_prefix, save,
};
use tracing::{debug, warn};

use crate::keys;
use crate::matching::BidValidator;
use crate::orders::OrderRegistry;
use crate::providers::{AttributeSource, ProviderSource};

/// A provider's request to bid on an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBid {
    pub order: OrderId,
    pub provider: Address,
    pub price: DecCoin,
    pub resources_offer: ResourcesOffer,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BidRegistry {
    orders: OrderRegistry,
}

impl BidRegistry {
    pub fn get_bid(&self, store: &dyn KvStore, id: &BidId) -> Result<Option<Bid>> {
        load(store, &keys::bid_key(id))
    }

    /// # Errors
    /// `BidNotFound`.
    pub fn require_bid(&self, store: &dyn KvStore, id: &BidId) -> Result<Bid> {
        self.get_bid(store, id)?
            .ok_or_else(|| LedgerError::BidNotFound(id.clone()))
    }

    /// Every bid on `order`, ascending by provider.
    pub fn bids_for_order(&self, store: &dyn KvStore, order: &OrderId) -> Result<Vec<Bid>> {
        load_prefix(store, &keys::bid_prefix(order))
    }

    /// Open and Active bids on `order`. Scans only that order's bids.
    pub fn bid_count_for_order(&self, store: &dyn KvStore, order: &OrderId) -> Result<u32> {
        let live = self
            .bids_for_order(store, order)?
            .iter()
            .filter(|b| b.state.is_live())
            .count();
        u32::try_from(live)
            .map_err(|_| LedgerError::StateCorruption(format!("{live} bids on {order}")))
    }

    /// Validate and persist a new Open bid.
    ///
    /// Checks run in this order, each with its own error:
    /// provider address, order Open, price, resource offer, bid limit,
    /// duplicate, registered provider, attributes, capabilities.
    pub fn create_bid(
        &self,
        ctx: &mut TxContext<'_>,
        request: NewBid,
        params: &MarketParams,
        providers: &dyn ProviderSource,
        attributes: &dyn AttributeSource,
    ) -> Result<Bid> {
        let NewBid {
            order: order_id,
            provider,
            price,
            resources_offer,
        } = request;
        provider.validate()?;

        let order = self.orders.require_order(&*ctx, &order_id)?;
        order.validate_can_bid()?;

        let validator = BidValidator::new(params);
        validator.validate_price(&order, &price)?;
        validator.validate_offer(&order, &resources_offer)?;

        if self.bid_count_for_order(&*ctx, &order_id)? >= params.order_max_bids {
            warn!(
                order = %order_id,
                provider = %provider,
                max = params.order_max_bids,
                "bid rejected: order full"
            );
            return Err(LedgerError::TooManyBids {
                order: order_id,
                max: params.order_max_bids,
            });
        }

        let id = order_id.bid(provider.clone());
        if self.get_bid(&*ctx, &id)?.is_some() {
            return Err(LedgerError::BidExists(id));
        }

        let registered = providers
            .get_provider(&provider)
            .ok_or_else(|| LedgerError::UnknownProvider(provider.clone()))?;
        let audits = attributes.provider_attributes(&provider);
        if let Err(err) = validator.validate_placement(&order, &registered, &audits) {
            warn!(order = %order_id, provider = %provider, error = %err, "bid rejected");
            return Err(err);
        }

        let bid = Bid {
            id,
            state: BidState::Open,
            price,
            resources_offer,
            created_at: ctx.height(),
        };
        save(ctx, keys::bid_key(&bid.id), &bid)?;
        ctx.emit(LedgerEvent::BidCreated {
            id: bid.id.clone(),
            price: bid.price.clone(),
        });
        debug!(bid = %bid.id, price = %bid.price, "bid created");
        Ok(bid)
    }

    /// Withdraw a bid.
    ///
    /// - Open or Lost: closed directly
    /// - Active: only once its lease is Closed
    /// - Closed: no-op
    ///
    /// # Errors
    /// `LeaseStillActive` for an Active bid with an Active lease;
    /// `StateCorruption` for an Active bid without a lease.
    pub fn close_bid(&self, ctx: &mut TxContext<'_>, id: &BidId) -> Result<Bid> {
        let bid = self.require_bid(&*ctx, id)?;
        match bid.state {
            BidState::Closed => Ok(bid),
            BidState::Open | BidState::Lost => self.on_bid_closed(ctx, id),
            BidState::Active => {
                let lease: Lease = load(&*ctx, &keys::lease_key(id))?.ok_or_else(|| {
                    LedgerError::StateCorruption(format!("active bid {id} has no lease"))
                })?;
                if lease.is_active() {
                    return Err(LedgerError::LeaseStillActive(id.clone()));
                }
                self.on_bid_closed(ctx, id)
            }
        }
    }

    /// Open → Active.
    ///
    /// # Errors
    /// `BidNotOpen`.
    pub fn on_bid_matched(&self, ctx: &mut TxContext<'_>, id: &BidId) -> Result<Bid> {
        self.transition_from_open(ctx, id, BidState::Active)
    }

    /// Open → Lost.
    ///
    /// # Errors
    /// `BidNotOpen`.
    pub fn on_bid_lost(&self, ctx: &mut TxContext<'_>, id: &BidId) -> Result<Bid> {
        let bid = self.transition_from_open(ctx, id, BidState::Lost)?;
        ctx.emit(LedgerEvent::BidLost { id: id.clone() });
        Ok(bid)
    }

    /// Flip the bid to Closed. Idempotent; touches nothing else.
    pub fn on_bid_closed(&self, ctx: &mut TxContext<'_>, id: &BidId) -> Result<Bid> {
        let mut bid = self.require_bid(&*ctx, id)?;
        if bid.state == BidState::Closed {
            return Ok(bid);
        }
        debug!(bid = %id, from = %bid.state, "bid closed");
        bid.state = BidState::Closed;
        save(ctx, keys::bid_key(id), &bid)?;
        ctx.emit(LedgerEvent::BidClosed { id: id.clone() });
        Ok(bid)
    }

    fn transition_from_open(
        &self,
        ctx: &mut TxContext<'_>,
        id: &BidId,
        target: BidState,
    ) -> Result<Bid> {
        let mut bid = self.require_bid(&*ctx, id)?;
        if bid.state != BidState::Open {
            return Err(LedgerError::BidNotOpen {
                id: id.clone(),
                actual: bid.state,
            });
        }
        debug!(bid = %id, to = %target, "bid transition");
        bid.state = target;
        save(ctx, keys::bid_key(id), &bid)?;
        Ok(bid)
    }
}
