//! The ledger driver: committed store, block height and event journal.
//!
//! Each command builds a [`Coordinator`] over the ledger's configuration and
//! provider directory, runs inside a fresh [`TxContext`] and commits only if
//! it succeeds and the event sink accepts its events.

use std::collections::BTreeSet;

use leasematch_escrow::EscrowKeeper;
use leasematch_market::{NewBid, ProviderDirectory, compute_state_root};
use leasematch_types::{
    Account, AccountId, AccountState, Address, Attributes, Bid, BidId, BidState, DecCoin,
    DeploymentId, EventSink, Group, GroupId, KvStore, Lease, LeaseId, LedgerConfig, LedgerError,
    LedgerEvent, MemStore, Order, OrderId, OrderState, Payment, PaymentId, PaymentState, Provider,
    Result, TxContext, constants,
};
use tracing::{debug, warn};

use crate::coordinator::{Coordinator, NewDeployment};
use crate::hooks::EscrowHooks;
use crate::supply_conservation::SupplyConservation;

/// A single-writer ledger. Commands apply one at a time, in call order.
pub struct Ledger {
    store: MemStore,
    config: LedgerConfig,
    providers: ProviderDirectory,
    escrow: EscrowKeeper,
    hooks: EscrowHooks,
    /// External subscriber; events always land in `journal` as well.
    sink: Option<Box<dyn EventSink>>,
    journal: Vec<LedgerEvent>,
    supply: SupplyConservation,
    height: u64,
}

impl Ledger {
    #[must_use]
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            store: MemStore::new(),
            config,
            providers: ProviderDirectory::new(),
            escrow: EscrowKeeper::default(),
            hooks: EscrowHooks::market_defaults(),
            sink: None,
            journal: Vec::new(),
            supply: SupplyConservation::new(),
            height: constants::GENESIS_HEIGHT,
        }
    }

    /// # Errors
    /// `Configuration` on malformed or invalid JSON.
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(Self::new(LedgerConfig::from_json(raw)?))
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Box<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    #[must_use]
    pub fn with_hooks(mut self, hooks: EscrowHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    /// Move the settlement clock forward.
    pub fn advance(&mut self, blocks: u64) {
        self.height = self.height.saturating_add(blocks);
    }

    /// Every committed event, in commit order.
    pub fn events(&self) -> &[LedgerEvent] {
        &self.journal
    }

    pub fn store(&self) -> &MemStore {
        &self.store
    }

    // -----------------------------------------------------------------
    // Collaborator setup
    // -----------------------------------------------------------------

    pub fn register_provider(&mut self, provider: Provider) {
        self.providers.register(provider);
    }

    pub fn audit_provider(&mut self, owner: &Address, auditor: &Address, attributes: &Attributes) {
        self.providers.audit(owner, auditor, attributes);
    }

    /// Credit `coin` to `addr` out of thin air and record it as supply.
    pub fn mint(&mut self, addr: &Address, coin: &DecCoin) -> Result<()> {
        let mut supply = self.supply.clone();
        supply.record_mint(coin)?;
        self.escrow.bank().mint(&mut self.store, addr, coin)?;
        self.supply = supply;
        Ok(())
    }

    pub fn balance(&self, addr: &Address, denom: &str) -> Result<DecCoin> {
        self.escrow.bank().balance(&self.store, addr, denom)
    }

    // -----------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------

    pub fn create_deployment(&mut self, request: NewDeployment) -> Result<Vec<Group>> {
        self.execute("create_deployment", |c, ctx| c.create_deployment(ctx, request))
    }

    pub fn deposit_deployment(
        &mut self,
        id: &DeploymentId,
        depositor: &Address,
        amount: &DecCoin,
    ) -> Result<Account> {
        self.execute("deposit_deployment", |c, ctx| {
            c.deposit_deployment(ctx, id, depositor, amount)
        })
    }

    pub fn settle_deployment(&mut self, id: &DeploymentId) -> Result<Account> {
        self.execute("settle_deployment", |c, ctx| c.settle_deployment(ctx, id))
    }

    pub fn close_deployment(&mut self, id: &DeploymentId) -> Result<Account> {
        self.execute("close_deployment", |c, ctx| c.close_deployment(ctx, id))
    }

    pub fn close_group(&mut self, id: &GroupId) -> Result<Group> {
        self.execute("close_group", |c, ctx| c.close_group(ctx, id))
    }

    pub fn start_group(&mut self, id: &GroupId) -> Result<Order> {
        self.execute("start_group", |c, ctx| c.start_group(ctx, id))
    }

    pub fn create_bid(&mut self, request: NewBid, deposit: &DecCoin) -> Result<Bid> {
        self.execute("create_bid", |c, ctx| c.create_bid(ctx, request, deposit))
    }

    pub fn close_bid(&mut self, id: &BidId) -> Result<Bid> {
        self.execute("close_bid", |c, ctx| c.close_bid(ctx, id))
    }

    pub fn create_lease(&mut self, id: &BidId) -> Result<Lease> {
        self.execute("create_lease", |c, ctx| c.create_lease(ctx, id))
    }

    pub fn close_lease(&mut self, id: &LeaseId) -> Result<Lease> {
        self.execute("close_lease", |c, ctx| c.close_lease(ctx, id))
    }

    pub fn withdraw_lease(&mut self, id: &LeaseId) -> Result<Payment> {
        self.execute("withdraw_lease", |c, ctx| c.withdraw_lease(ctx, id))
    }

    /// Run one command atomically.
    fn execute<T>(
        &mut self,
        command: &'static str,
        op: impl FnOnce(&Coordinator<'_>, &mut TxContext<'_>) -> Result<T>,
    ) -> Result<T> {
        let coordinator = Coordinator::new(
            &self.config.market,
            &self.providers,
            &self.providers,
            self.escrow,
            self.hooks,
        );
        let mut ctx = TxContext::new(&mut self.store, self.height);
        let out = match op(&coordinator, &mut ctx) {
            Ok(out) => out,
            Err(err) => {
                warn!(
                    command,
                    height = self.height,
                    error = %err,
                    kind = %err.kind(),
                    "command rejected"
                );
                return Err(err);
            }
        };
        let events = match self.sink.as_deref_mut() {
            Some(sink) => ctx.commit(sink)?,
            None => ctx.commit(&mut Vec::<LedgerEvent>::new())?,
        };
        debug!(command, height = self.height, events = events.len(), "command committed");
        self.journal.extend(events);
        Ok(out)
    }

    // -----------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------

    fn reader(&self) -> Coordinator<'_> {
        Coordinator::new(
            &self.config.market,
            &self.providers,
            &self.providers,
            self.escrow,
            self.hooks,
        )
    }

    pub fn get_group(&self, id: &GroupId) -> Result<Option<Group>> {
        self.reader().get_group(&self.store, id)
    }

    pub fn get_order(&self, id: &OrderId) -> Result<Option<Order>> {
        self.reader().get_order(&self.store, id)
    }

    pub fn orders_for_group(&self, id: &GroupId) -> Result<Vec<Order>> {
        self.reader().orders_for_group(&self.store, id)
    }

    pub fn get_bid(&self, id: &BidId) -> Result<Option<Bid>> {
        self.reader().get_bid(&self.store, id)
    }

    pub fn bids_for_order(&self, id: &OrderId) -> Result<Vec<Bid>> {
        self.reader().bids_for_order(&self.store, id)
    }

    pub fn get_lease(&self, id: &LeaseId) -> Result<Option<Lease>> {
        self.reader().get_lease(&self.store, id)
    }

    pub fn get_account(&self, id: &AccountId) -> Result<Option<Account>> {
        self.escrow.get_account(&self.store, id)
    }

    pub fn get_payment(&self, lease: &LeaseId) -> Result<Option<Payment>> {
        self.escrow.get_payment(
            &self.store,
            &AccountId::for_deployment(&lease.deployment()),
            &PaymentId::for_lease(lease),
        )
    }

    /// Hash of the committed store.
    pub fn state_root(&self) -> Result<[u8; 32]> {
        compute_state_root(&self.store)
    }

    // -----------------------------------------------------------------
    // Invariants
    // -----------------------------------------------------------------

    /// Check every ledger-wide invariant against the committed store.
    ///
    /// # Errors
    /// `StateCorruption` naming the first violation found.
    pub fn check_invariants(&self) -> Result<()> {
        let store: &dyn KvStore = &self.store;
        let bank = self.escrow.bank();
        let accounts = self.escrow.accounts(store)?;
        let payments = self.escrow.payments(store)?;
        for denom in self.supply.tracked_denoms() {
            self.supply.verify(&denom, bank.total_supply(store, &denom)?.amount)?;
            self.supply.verify_escrow_backing(
                &denom,
                bank.escrow_balance(store, &denom)?.amount,
                &accounts,
                &payments,
            )?;
        }
        self.check_leases()?;
        self.check_bids()
    }

    /// An Active lease has an Active bid, order and payment; one per order.
    fn check_leases(&self) -> Result<()> {
        let reader = self.reader();
        let mut active_orders = BTreeSet::new();
        for lease in reader.leases.all_leases(&self.store)? {
            if !lease.is_active() {
                continue;
            }
            let order = lease.id.order();
            if !active_orders.insert(order.clone()) {
                return Err(corrupt(format!("order {order} has more than one active lease")));
            }
            let bid_state = reader.bids.require_bid(&self.store, &lease.id)?.state;
            let order_state = reader.orders.require_order(&self.store, &order)?.state;
            let payment_state = self.get_payment(&lease.id)?.map(|p| p.state);
            if bid_state != BidState::Active
                || order_state != OrderState::Active
                || payment_state != Some(PaymentState::Active)
            {
                return Err(corrupt(format!(
                    "active lease {} with bid {bid_state}, order {order_state}, payment {payment_state:?}",
                    lease.id
                )));
            }
        }
        Ok(())
    }

    /// At most one Active bid per order, none on an Open order, and a bid's
    /// deposit stays locked exactly while the bid is Open or Active.
    fn check_bids(&self) -> Result<()> {
        let reader = self.reader();
        for order in reader.orders.all_orders(&self.store)? {
            let bids = reader.bids.bids_for_order(&self.store, &order.id)?;
            let active = bids.iter().filter(|b| b.state == BidState::Active).count();
            if active > 1 || (active == 1 && order.state != OrderState::Active) {
                return Err(corrupt(format!(
                    "order {} in state {} has {active} active bids",
                    order.id, order.state
                )));
            }
            for bid in &bids {
                let account = self
                    .get_account(&AccountId::for_bid(&bid.id))?
                    .ok_or_else(|| corrupt(format!("bid {} has no deposit account", bid.id)))?;
                let locked = account.state != AccountState::Closed;
                if locked != bid.state.is_live() {
                    return Err(corrupt(format!(
                        "bid {} in state {} has deposit account {}",
                        bid.id, bid.state, account.state
                    )));
                }
            }
        }
        Ok(())
    }
}

fn corrupt(msg: String) -> LedgerError {
    LedgerError::StateCorruption(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use leasematch_types::GroupSpec;

    fn uakt(n: i64) -> DecCoin {
        DecCoin::from_int("uakt", n)
    }

    #[test]
    fn starts_at_genesis() {
        let ledger = Ledger::new(LedgerConfig::default());
        assert_eq!(ledger.height(), constants::GENESIS_HEIGHT);
        assert!(ledger.events().is_empty());
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn bad_config_rejected() {
        let raw = r#"{"market":{"bid_min_deposit":{"denom":"uakt","amount":"500"},"order_max_bids":0}}"#;
        let err = Ledger::from_json(raw).err().unwrap();
        assert!(matches!(err, LedgerError::Configuration(_)));
    }

    #[test]
    fn rejected_command_commits_nothing() {
        let mut ledger = Ledger::new(LedgerConfig::default());
        let owner = Address::dummy("tenant");
        ledger.mint(&owner, &uakt(100)).unwrap();
        let root = ledger.state_root().unwrap();

        let err = ledger
            .create_deployment(NewDeployment {
                id: DeploymentId::new(owner.clone(), 1),
                groups: vec![GroupSpec::dummy("web", 1)],
                deposit: uakt(1_000),
                depositor: owner,
            })
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert_eq!(ledger.state_root().unwrap(), root);
        assert!(ledger.events().is_empty());
    }

    #[test]
    fn mint_feeds_supply_check() {
        let mut ledger = Ledger::new(LedgerConfig::default());
        ledger.mint(&Address::dummy("a"), &uakt(10)).unwrap();
        ledger.mint(&Address::dummy("b"), &uakt(5)).unwrap();
        ledger.check_invariants().unwrap();
        assert_eq!(ledger.balance(&Address::dummy("b"), "uakt").unwrap(), uakt(5));
    }
}
