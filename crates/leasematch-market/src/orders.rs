//! Order registry.
//!
//! A group has at most one non-Closed order at a time. Each new order takes
//! the next sequence number after the group's highest existing one.

use leasematch_types::{
    GroupId, GroupSpec, KvStore, LedgerError, LedgerEvent, Order, OrderId, OrderState, Result,
    TxContext, load, load_prefix, save,
};
use tracing::debug;

use crate::keys;

#[derive(Debug, Clone, Copy, Default)]
pub struct OrderRegistry;

impl OrderRegistry {
    pub fn get_order(&self, store: &dyn KvStore, id: &OrderId) -> Result<Option<Order>> {
        load(store, &keys::order_key(id))
    }

    /// # Errors
    /// `OrderNotFound`.
    pub fn require_order(&self, store: &dyn KvStore, id: &OrderId) -> Result<Order> {
        self.get_order(store, id)?
            .ok_or_else(|| LedgerError::OrderNotFound(id.clone()))
    }

    /// Orders of a group, ascending by `oseq`.
    pub fn orders_for_group(&self, store: &dyn KvStore, id: &GroupId) -> Result<Vec<Order>> {
        load_prefix(store, &keys::orders_prefix(id))
    }

    /// Every order, ascending by key.
    pub fn all_orders(&self, store: &dyn KvStore) -> Result<Vec<Order>> {
        load_prefix(store, &[keys::ORDER_PREFIX])
    }

    /// Open the next order for `group`.
    ///
    /// # Errors
    /// `OrderExists` if the group still has an Open or Active order.
    pub fn create_order(
        &self,
        ctx: &mut TxContext<'_>,
        group: &GroupId,
        spec: &GroupSpec,
    ) -> Result<Order> {
        let existing = self.orders_for_group(&*ctx, group)?;
        if let Some(live) = existing.iter().find(|o| !o.is_closed()) {
            return Err(LedgerError::OrderExists {
                group: group.clone(),
                existing: live.id.clone(),
                state: live.state,
            });
        }
        let oseq = existing.last().map_or(1, |o| o.id.oseq + 1);
        let order = Order {
            id: group.order(oseq),
            state: OrderState::Open,
            spec: spec.clone(),
            created_at: ctx.height(),
        };
        save(ctx, keys::order_key(&order.id), &order)?;
        ctx.emit(LedgerEvent::OrderCreated {
            id: order.id.clone(),
        });
        debug!(order = %order.id, "order created");
        Ok(order)
    }

    /// Open → Active once a lease is created.
    ///
    /// # Errors
    /// `OrderNotOpen`.
    pub fn on_order_matched(&self, ctx: &mut TxContext<'_>, id: &OrderId) -> Result<Order> {
        let mut order = self.require_order(&*ctx, id)?;
        if order.state != OrderState::Open {
            return Err(LedgerError::OrderNotOpen {
                id: id.clone(),
                actual: order.state,
            });
        }
        order.state = OrderState::Active;
        save(ctx, keys::order_key(id), &order)?;
        debug!(order = %id, "order matched");
        Ok(order)
    }

    /// Idempotent.
    pub fn on_order_closed(&self, ctx: &mut TxContext<'_>, id: &OrderId) -> Result<Order> {
        let mut order = self.require_order(&*ctx, id)?;
        if order.is_closed() {
            return Ok(order);
        }
        order.state = OrderState::Closed;
        save(ctx, keys::order_key(id), &order)?;
        ctx.emit(LedgerEvent::OrderClosed { id: id.clone() });
        debug!(order = %id, "order closed");
        Ok(order)
    }
}
