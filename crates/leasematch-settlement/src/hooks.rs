//! Escrow hook subscribers.
//!
//! The escrow keeper queues an [`EscrowNotice`] whenever an account or a
//! payment closes, including closures caused by an overdraft during
//! settlement. The coordinator drains that queue after each escrow call and
//! hands every notice to the subscribers listed here, in list order.
//!
//! The lists are `'static` slices of plain functions: they are fixed when
//! the [`EscrowHooks`] value is built and cannot change while commands run.

use std::fmt;

use leasematch_types::{
    Account, AccountOwner, AccountState, BidState, EscrowNotice, LeaseCloseReason, Payment,
    PaymentState, Result, TxContext,
};
use tracing::{debug, warn};

use crate::coordinator::Coordinator;

pub type AccountClosedHook = fn(&Coordinator<'_>, &mut TxContext<'_>, &Account) -> Result<()>;
pub type PaymentClosedHook = fn(&Coordinator<'_>, &mut TxContext<'_>, &Payment) -> Result<()>;

const MARKET_ACCOUNT_HOOKS: &[AccountClosedHook] = &[close_market_for_account];
const MARKET_PAYMENT_HOOKS: &[PaymentClosedHook] = &[close_market_for_payment];

/// Ordered subscriber lists for escrow closures.
#[derive(Clone, Copy)]
pub struct EscrowHooks {
    on_account_closed: &'static [AccountClosedHook],
    on_payment_closed: &'static [PaymentClosedHook],
}

impl EscrowHooks {
    #[must_use]
    pub const fn new(
        on_account_closed: &'static [AccountClosedHook],
        on_payment_closed: &'static [PaymentClosedHook],
    ) -> Self {
        Self {
            on_account_closed,
            on_payment_closed,
        }
    }

    /// No subscribers: escrow closures never reach the marketplace.
    #[must_use]
    pub const fn none() -> Self {
        Self::new(&[], &[])
    }

    /// The marketplace reactions: close the lease, bid and order that an
    /// escrow closure belongs to.
    #[must_use]
    pub const fn market_defaults() -> Self {
        Self::new(MARKET_ACCOUNT_HOOKS, MARKET_PAYMENT_HOOKS)
    }

    pub(crate) fn dispatch(
        &self,
        coordinator: &Coordinator<'_>,
        ctx: &mut TxContext<'_>,
        notice: &EscrowNotice,
    ) -> Result<()> {
        match notice {
            EscrowNotice::AccountClosed(account) => {
                for hook in self.on_account_closed {
                    hook(coordinator, ctx, account)?;
                }
            }
            EscrowNotice::PaymentClosed(payment) => {
                for hook in self.on_payment_closed {
                    hook(coordinator, ctx, payment)?;
                }
            }
        }
        Ok(())
    }
}

impl Default for EscrowHooks {
    fn default() -> Self {
        Self::market_defaults()
    }
}

impl fmt::Debug for EscrowHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EscrowHooks")
            .field("on_account_closed", &self.on_account_closed.len())
            .field("on_payment_closed", &self.on_payment_closed.len())
            .finish()
    }
}

/// A lease payment stopped.
///
/// Overdrawn: the lease closes for insufficient funds and its group moves to
/// InsufficientFunds, so no replacement order is opened. Closed by anything
/// other than the lease itself: the lease closes as if its owner had closed it.
pub fn close_market_for_payment(
    coordinator: &Coordinator<'_>,
    ctx: &mut TxContext<'_>,
    payment: &Payment,
) -> Result<()> {
    let lease_id = payment.payment_id.lease()?;
    let Some(lease) = coordinator.leases.get_lease(&*ctx, &lease_id)? else {
        return Ok(());
    };
    if !lease.is_active() {
        debug!(lease = %lease_id, "payment closed for an already closed lease");
        return Ok(());
    }

    if payment.state == PaymentState::Overdrawn {
        warn!(lease = %lease_id, "lease payment overdrawn, closing lease");
        coordinator.close_lease_chain(ctx, &lease_id, LeaseCloseReason::InsufficientFunds)?;
        coordinator
            .groups
            .on_insufficient_funds(ctx, &lease_id.group())?;
    } else {
        coordinator.close_lease_chain(ctx, &lease_id, LeaseCloseReason::Owner)?;
        coordinator.reopen_order(ctx, &lease_id.group())?;
    }
    Ok(())
}

/// An escrow account closed.
///
/// Deployment account: every group of the deployment is torn down, ending in
/// InsufficientFunds when the account was overdrawn and Closed otherwise.
/// Bid account: a bid still Open is closed and an Active bid is treated as a
/// provider close.
pub fn close_market_for_account(
    coordinator: &Coordinator<'_>,
    ctx: &mut TxContext<'_>,
    account: &Account,
) -> Result<()> {
    match account.id.owner()? {
        AccountOwner::Deployment(deployment) => {
            let overdrawn = account.state == AccountState::Overdrawn;
            for group in coordinator.groups.groups_for_deployment(&*ctx, &deployment)? {
                if overdrawn {
                    coordinator.teardown_group(
                        ctx,
                        &group.id,
                        LeaseCloseReason::InsufficientFunds,
                    )?;
                    coordinator.groups.on_insufficient_funds(ctx, &group.id)?;
                } else {
                    coordinator.teardown_group(ctx, &group.id, LeaseCloseReason::GroupClosed)?;
                    coordinator.groups.close_group(ctx, &group.id)?;
                }
            }
        }
        AccountOwner::Bid(bid_id) => {
            let Some(bid) = coordinator.bids.get_bid(&*ctx, &bid_id)? else {
                return Ok(());
            };
            match bid.state {
                BidState::Open => {
                    coordinator.bids.on_bid_closed(ctx, &bid_id)?;
                }
                BidState::Active => coordinator.close_by_provider(ctx, &bid_id)?,
                BidState::Lost | BidState::Closed => {}
            }
        }
    }
    Ok(())
}
