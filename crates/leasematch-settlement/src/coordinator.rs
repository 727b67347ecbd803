//! Matching & settlement coordinator.
//!
//! The coordinator is the only mutation surface of the ledger. Each public
//! command runs inside one [`TxContext`]: it validates, drives the market
//! registries and the escrow keeper, then drains the escrow notice queue
//! through the [`EscrowHooks`]. Any error drops the context, so nothing a
//! failed command wrote is ever committed.
//!
//! ```text
//!   create_bid ──▶ BidRegistry::create_bid ──▶ escrow: open bid account
//!   create_lease ─▶ escrow: create payment ──▶ LeaseRegistry::create_lease
//!                                          └─▶ escrow: close lost bid accounts
//!   close_lease ──▶ lease, payment, bid (+ account), order closed
//!                                          └─▶ fresh order if group Open
//! ```

use leasematch_escrow::EscrowKeeper;
use leasematch_market::{
    AttributeSource, BidRegistry, BidValidator, GroupRegistry, LeaseRegistry, NewBid,
    OrderRegistry, ProviderSource,
};
use leasematch_types::{
    Account, AccountId, Address, Bid, BidId, BidState, DecCoin, DeploymentId, Group, GroupId,
    GroupSpec, GroupState, KvStore, Lease, LeaseCloseReason, LeaseId, LedgerError, Order,
    OrderId, OrderState, ParamSource, Payment, PaymentId, Result, TxContext,
};
use tracing::{debug, info};

use crate::hooks::EscrowHooks;

/// A tenant's request to open a deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDeployment {
    pub id: DeploymentId,
    /// One group (and one order) per spec, `gseq` starting at 1.
    pub groups: Vec<GroupSpec>,
    pub deposit: DecCoin,
    /// Funds the deployment account; usually the owner.
    pub depositor: Address,
}

/// Orchestrates the market registries and the escrow keeper.
///
/// Collaborators are borrowed, never looked up: parameters, providers and
/// audits come in through their read-only traits.
pub struct Coordinator<'a> {
    params: &'a dyn ParamSource,
    providers: &'a dyn ProviderSource,
    attributes: &'a dyn AttributeSource,
    escrow: EscrowKeeper,
    hooks: EscrowHooks,
    pub(crate) groups: GroupRegistry,
    pub(crate) orders: OrderRegistry,
    pub(crate) bids: BidRegistry,
    pub(crate) leases: LeaseRegistry,
}

impl<'a> Coordinator<'a> {
    pub fn new(
        params: &'a dyn ParamSource,
        providers: &'a dyn ProviderSource,
        attributes: &'a dyn AttributeSource,
        escrow: EscrowKeeper,
        hooks: EscrowHooks,
    ) -> Self {
        Self {
            params,
            providers,
            attributes,
            escrow,
            hooks,
            groups: GroupRegistry,
            orders: OrderRegistry,
            bids: BidRegistry::default(),
            leases: LeaseRegistry::default(),
        }
    }

    pub fn escrow(&self) -> &EscrowKeeper {
        &self.escrow
    }

    // -----------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------

    pub fn get_group(&self, store: &dyn KvStore, id: &GroupId) -> Result<Option<Group>> {
        self.groups.get_group(store, id)
    }

    pub fn get_order(&self, store: &dyn KvStore, id: &OrderId) -> Result<Option<Order>> {
        self.orders.get_order(store, id)
    }

    pub fn orders_for_group(&self, store: &dyn KvStore, id: &GroupId) -> Result<Vec<Order>> {
        self.orders.orders_for_group(store, id)
    }

    pub fn get_bid(&self, store: &dyn KvStore, id: &BidId) -> Result<Option<Bid>> {
        self.bids.get_bid(store, id)
    }

    pub fn bids_for_order(&self, store: &dyn KvStore, id: &OrderId) -> Result<Vec<Bid>> {
        self.bids.bids_for_order(store, id)
    }

    pub fn get_lease(&self, store: &dyn KvStore, id: &LeaseId) -> Result<Option<Lease>> {
        self.leases.get_lease(store, id)
    }

    // -----------------------------------------------------------------
    // Deployments and groups
    // -----------------------------------------------------------------

    /// Open the deployment escrow account, then one Open group and one Open
    /// order per spec.
    ///
    /// # Errors
    /// - `InvalidSpec` if no group is requested or a spec is invalid
    /// - `AccountExists` if the deployment already exists
    /// - `InsufficientFunds` if the depositor cannot cover the deposit
    pub fn create_deployment(
        &self,
        ctx: &mut TxContext<'_>,
        request: NewDeployment,
    ) -> Result<Vec<Group>> {
        let NewDeployment {
            id,
            groups: specs,
            deposit,
            depositor,
        } = request;
        if specs.is_empty() {
            return Err(LedgerError::InvalidSpec {
                reason: format!("deployment {id} has no groups"),
            });
        }

        self.escrow
            .open_account(ctx, AccountId::for_deployment(&id), &id.owner, &depositor, &deposit)?;

        let mut created = Vec::with_capacity(specs.len());
        for (gseq, spec) in (1u32..).zip(specs) {
            let group = self.groups.create_group(ctx, id.group(gseq), spec)?;
            self.orders.create_order(ctx, &group.id, &group.spec)?;
            created.push(group);
        }
        info!(deployment = %id, groups = created.len(), deposit = %deposit, "deployment created");
        Ok(created)
    }

    /// Top up the deployment account.
    pub fn deposit_deployment(
        &self,
        ctx: &mut TxContext<'_>,
        id: &DeploymentId,
        depositor: &Address,
        amount: &DecCoin,
    ) -> Result<Account> {
        let account = self
            .escrow
            .deposit(ctx, &AccountId::for_deployment(id), depositor, amount)?;
        self.dispatch(ctx)?;
        Ok(account)
    }

    /// Accrue every lease payment of the deployment up to the current
    /// height. An overdraft closes the affected leases through the hooks.
    pub fn settle_deployment(&self, ctx: &mut TxContext<'_>, id: &DeploymentId) -> Result<Account> {
        let account = self
            .escrow
            .settle_account(ctx, &AccountId::for_deployment(id))?;
        self.dispatch(ctx)?;
        Ok(account)
    }

    /// Close the group and everything hanging off it. Never re-opens an
    /// order. Idempotent.
    pub fn close_group(&self, ctx: &mut TxContext<'_>, id: &GroupId) -> Result<Group> {
        self.groups.require_group(&*ctx, id)?;
        self.teardown_group(ctx, id, LeaseCloseReason::GroupClosed)?;
        let group = self.groups.close_group(ctx, id)?;
        self.dispatch(ctx)?;
        Ok(group)
    }

    /// Close every group, then the deployment account (refunding what is
    /// left to the owner and depositor).
    pub fn close_deployment(&self, ctx: &mut TxContext<'_>, id: &DeploymentId) -> Result<Account> {
        let account_id = AccountId::for_deployment(id);
        if self.escrow.get_account(&*ctx, &account_id)?.is_none() {
            return Err(LedgerError::AccountNotFound(account_id));
        }
        for group in self.groups.groups_for_deployment(&*ctx, id)? {
            self.close_group(ctx, &group.id)?;
        }
        let account = self.escrow.close_account(ctx, &account_id)?;
        self.dispatch(ctx)?;
        info!(deployment = %id, "deployment closed");
        Ok(account)
    }

    /// Resume a Paused group with a fresh order.
    pub fn start_group(&self, ctx: &mut TxContext<'_>, id: &GroupId) -> Result<Order> {
        let group = self.groups.start_group(ctx, id)?;
        self.orders.create_order(ctx, &group.id, &group.spec)
    }

    // -----------------------------------------------------------------
    // Bids
    // -----------------------------------------------------------------

    /// Place a bid and lock its deposit in a bid-scoped escrow account.
    ///
    /// # Errors
    /// - `InvalidDeposit` if `deposit` is below the minimum (checked first)
    /// - every `BidRegistry::create_bid` error
    /// - `InsufficientFunds` if the provider cannot cover the deposit
    pub fn create_bid(
        &self,
        ctx: &mut TxContext<'_>,
        request: NewBid,
        deposit: &DecCoin,
    ) -> Result<Bid> {
        let params = self.params.market_params();
        BidValidator::new(&params).validate_deposit(deposit)?;

        let bid = self
            .bids
            .create_bid(ctx, request, &params, self.providers, self.attributes)?;
        self.escrow.open_account(
            ctx,
            AccountId::for_bid(&bid.id),
            &bid.id.provider,
            &bid.id.provider,
            deposit,
        )?;
        info!(bid = %bid.id, price = %bid.price, deposit = %deposit, "bid placed");
        Ok(bid)
    }

    /// Withdraw a bid.
    ///
    /// Open or Lost bids simply close. An Active bid with an Active lease is
    /// a provider walking away: the lease closes with reason Provider and the
    /// group is paused instead of re-ordered. The bid deposit is refunded in
    /// every case. Closing a Closed bid is a no-op.
    ///
    /// # Errors
    /// `StateCorruption` if an Active bid has no lease record.
    pub fn close_bid(&self, ctx: &mut TxContext<'_>, id: &BidId) -> Result<Bid> {
        let bid = self.bids.require_bid(&*ctx, id)?;
        if bid.state == BidState::Active {
            self.close_by_provider(ctx, id)?;
        } else {
            self.bids.close_bid(ctx, id)?;
            self.close_bid_account(ctx, id)?;
        }
        self.dispatch(ctx)?;
        self.bids.require_bid(&*ctx, id)
    }

    // -----------------------------------------------------------------
    // Leases
    // -----------------------------------------------------------------

    /// Turn an Open bid into an Active lease paid from the deployment
    /// account, refunding every losing bidder.
    ///
    /// # Errors
    /// - `BidNotOpen` / `OrderNotOpen` / `GroupNotOpen` / `LeaseExists`
    /// - escrow payment errors (`AccountNotOpen`, `DenomMismatch`, ...)
    pub fn create_lease(&self, ctx: &mut TxContext<'_>, id: &BidId) -> Result<Lease> {
        let (bid, _, _) = self.leases.validate_lease(&*ctx, id)?;

        self.escrow.create_payment(
            ctx,
            &AccountId::for_deployment(&id.deployment()),
            PaymentId::for_lease(id),
            &bid.id.provider,
            &bid.price,
        )?;
        let matched = self.leases.create_lease(ctx, id)?;
        for lost in &matched.lost {
            self.close_bid_account(ctx, lost)?;
        }
        self.dispatch(ctx)?;
        Ok(matched.lease)
    }

    /// Close an Active lease on the tenant's behalf and re-open the group's
    /// order if the group is still Open. Closing a Closed lease is a no-op.
    ///
    /// # Errors
    /// - `LeaseNotFound`
    /// - `OrderNotActive` / `BidNotActive` if the lease is Active but its
    ///   order or bid is not
    pub fn close_lease(&self, ctx: &mut TxContext<'_>, id: &LeaseId) -> Result<Lease> {
        let lease = self.leases.require_lease(&*ctx, id)?;
        if !lease.is_active() {
            debug!(lease = %id, "lease already closed");
            return Ok(lease);
        }
        let order = self.orders.require_order(&*ctx, &id.order())?;
        if order.state != OrderState::Active {
            return Err(LedgerError::OrderNotActive {
                id: order.id,
                actual: order.state,
            });
        }
        let bid = self.bids.require_bid(&*ctx, id)?;
        if bid.state != BidState::Active {
            return Err(LedgerError::BidNotActive {
                id: bid.id,
                actual: bid.state,
            });
        }

        let lease = self.close_lease_chain(ctx, id, LeaseCloseReason::Owner)?;
        self.dispatch(ctx)?;
        self.reopen_order(ctx, &id.group())?;
        Ok(lease)
    }

    /// Pay the provider what the lease has accrued so far. Works on Closed
    /// leases too; the stream is never closed by a withdrawal.
    pub fn withdraw_lease(&self, ctx: &mut TxContext<'_>, id: &LeaseId) -> Result<Payment> {
        self.leases.require_lease(&*ctx, id)?;
        let payment = self.escrow.withdraw_payment(
            ctx,
            &AccountId::for_deployment(&id.deployment()),
            &PaymentId::for_lease(id),
        )?;
        self.dispatch(ctx)?;
        Ok(payment)
    }

    // -----------------------------------------------------------------
    // Shared close sequences (also driven by the escrow hooks)
    // -----------------------------------------------------------------

    /// Close a lease together with its payment, bid, bid account and order.
    /// Every step is idempotent.
    pub(crate) fn close_lease_chain(
        &self,
        ctx: &mut TxContext<'_>,
        id: &LeaseId,
        reason: LeaseCloseReason,
    ) -> Result<Lease> {
        let lease = self.leases.on_lease_closed(ctx, id, reason)?;
        self.escrow.close_payment(
            ctx,
            &AccountId::for_deployment(&id.deployment()),
            &PaymentId::for_lease(id),
        )?;
        self.bids.on_bid_closed(ctx, id)?;
        self.close_bid_account(ctx, id)?;
        self.orders.on_order_closed(ctx, &id.order())?;
        Ok(lease)
    }

    /// Provider-initiated close of an Active bid.
    pub(crate) fn close_by_provider(&self, ctx: &mut TxContext<'_>, id: &BidId) -> Result<()> {
        let lease = self.lease_of_active_bid(&*ctx, id)?;
        if lease.is_active() {
            self.groups.on_bid_closed(ctx, &id.group())?;
            self.close_lease_chain(ctx, id, LeaseCloseReason::Provider)?;
        } else {
            self.bids.close_bid(ctx, id)?;
            self.close_bid_account(ctx, id)?;
        }
        Ok(())
    }

    /// Close every open order of a group with its bids and lease. The group
    /// state itself is left to the caller.
    pub(crate) fn teardown_group(
        &self,
        ctx: &mut TxContext<'_>,
        id: &GroupId,
        reason: LeaseCloseReason,
    ) -> Result<()> {
        for order in self.orders.orders_for_group(&*ctx, id)? {
            if order.is_closed() {
                continue;
            }
            for bid in self.bids.bids_for_order(&*ctx, &order.id)? {
                match bid.state {
                    BidState::Closed => {}
                    BidState::Active if self.lease_of_active_bid(&*ctx, &bid.id)?.is_active() => {
                        self.close_lease_chain(ctx, &bid.id, reason)?;
                    }
                    BidState::Open | BidState::Active | BidState::Lost => {
                        self.bids.on_bid_closed(ctx, &bid.id)?;
                        self.close_bid_account(ctx, &bid.id)?;
                    }
                }
            }
            self.orders.on_order_closed(ctx, &order.id)?;
        }
        debug!(group = %id, reason = ?reason, "group torn down");
        Ok(())
    }

    /// Open a replacement order if the group is still Open.
    pub(crate) fn reopen_order(
        &self,
        ctx: &mut TxContext<'_>,
        id: &GroupId,
    ) -> Result<Option<Order>> {
        let group = self.groups.on_lease_closed(&*ctx, id)?;
        if group.state != GroupState::Open {
            debug!(group = %id, state = %group.state, "group not open, no new order");
            return Ok(None);
        }
        let order = self.orders.create_order(ctx, &group.id, &group.spec)?;
        info!(order = %order.id, "order re-opened for re-bidding");
        Ok(Some(order))
    }

    fn close_bid_account(&self, ctx: &mut TxContext<'_>, id: &BidId) -> Result<Account> {
        self.escrow.close_account(ctx, &AccountId::for_bid(id))
    }

    fn lease_of_active_bid(&self, store: &dyn KvStore, id: &BidId) -> Result<Lease> {
        self.leases
            .get_lease(store, id)?
            .ok_or_else(|| LedgerError::StateCorruption(format!("active bid {id} has no lease")))
    }

    /// Hand every queued escrow notice to the hooks. Hooks may queue more
    /// notices; those are drained in the same loop.
    fn dispatch(&self, ctx: &mut TxContext<'_>) -> Result<()> {
        while let Some(notice) = ctx.pop_notice() {
            self.hooks.dispatch(self, ctx, &notice)?;
        }
        Ok(())
    }
}
