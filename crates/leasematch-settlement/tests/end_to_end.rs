//! End-to-end tests through the public [`Ledger`] driver.
//!
//! Each test funds a tenant and a handful of providers, opens a deployment
//! and drives it through bids, leases, settlement ticks and closures. After
//! every scenario the ledger-wide invariants are checked: supply
//! conservation, escrow backing, one active lease per order and the deposit
//! state of every bid.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use leasematch_market::NewBid;
use leasematch_settlement::{EscrowHooks, Ledger, NewDeployment};
use leasematch_types::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const PROVIDERS: [&str; 5] = ["alpha", "beta", "gamma", "delta", "epsilon"];
const PROVIDER_FUNDS: i64 = 10_000;
const BID_DEPOSIT: i64 = 500;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn uakt(n: i64) -> DecCoin {
    DecCoin::from_int("uakt", n)
}

fn config(max_bids: u32) -> String {
    format!(
        r#"{{"market":{{"bid_min_deposit":{{"denom":"uakt","amount":"{BID_DEPOSIT}"}},"order_max_bids":{max_bids}}}}}"#
    )
}

/// Helper: a ledger with one funded tenant and five registered providers.
struct Market {
    ledger: Ledger,
    tenant: Address,
}

impl Market {
    fn new(max_bids: u32) -> Self {
        Self::with_ledger(Ledger::from_json(&config(max_bids)).unwrap())
    }

    fn with_ledger(mut ledger: Ledger) -> Self {
        init_tracing();
        let tenant = Address::new("tenant");
        ledger.mint(&tenant, &uakt(1_000_000)).unwrap();
        for name in PROVIDERS {
            let owner = Address::new(name);
            ledger.register_provider(Provider {
                owner: owner.clone(),
                host_uri: format!("https://{name}.example"),
                attributes: Attributes::from_pairs([("region", "us-west")]),
            });
            ledger.mint(&owner, &uakt(PROVIDER_FUNDS)).unwrap();
        }
        Self { ledger, tenant }
    }

    /// Open deployment `dseq` with one group priced at `ceiling` per block.
    fn deploy(&mut self, dseq: u64, ceiling: i64, deposit: i64) -> OrderId {
        let id = DeploymentId::new(self.tenant.clone(), dseq);
        self.ledger
            .create_deployment(NewDeployment {
                id: id.clone(),
                groups: vec![GroupSpec::dummy("web", ceiling)],
                deposit: uakt(deposit),
                depositor: self.tenant.clone(),
            })
            .unwrap();
        id.group(1).order(1)
    }

    fn bid_with_deposit(
        &mut self,
        order: &OrderId,
        provider: &str,
        price: i64,
        deposit: i64,
    ) -> Result<Bid> {
        self.ledger.create_bid(
            NewBid {
                order: order.clone(),
                provider: Address::new(provider),
                price: uakt(price),
                resources_offer: ResourcesOffer::default(),
            },
            &uakt(deposit),
        )
    }

    fn bid(&mut self, order: &OrderId, provider: &str, price: i64) -> Result<Bid> {
        self.bid_with_deposit(order, provider, price, BID_DEPOSIT)
    }

    fn balance(&self, name: &str) -> DecCoin {
        self.ledger.balance(&Address::new(name), "uakt").unwrap()
    }

    fn bid_account(&self, id: &BidId) -> Option<Account> {
        self.ledger.get_account(&AccountId::for_bid(id)).unwrap()
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn deposit_below_minimum_is_rejected() {
    let mut m = Market::new(20);
    let order = m.deploy(1, 100, 1_000);

    let err = m.bid_with_deposit(&order, "alpha", 10, 100).unwrap_err();
    assert!(matches!(err, LedgerError::InvalidDeposit { .. }));
    assert_eq!(err.kind(), ErrorKind::ValidationFailure);

    let id = order.bid(Address::new("alpha"));
    assert!(m.ledger.get_bid(&id).unwrap().is_none());
    assert!(m.bid_account(&id).is_none());
    assert_eq!(m.balance("alpha"), uakt(PROVIDER_FUNDS));
    m.ledger.check_invariants().unwrap();
}

#[test]
fn bid_limit_per_order() {
    let mut m = Market::new(3);
    let order = m.deploy(1, 100, 1_000);
    for provider in &PROVIDERS[..3] {
        m.bid(&order, provider, 50).unwrap();
    }

    let err = m.bid(&order, "delta", 50).unwrap_err();
    assert!(matches!(err, LedgerError::TooManyBids { max: 3, .. }));
    assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
    assert_eq!(m.ledger.bids_for_order(&order).unwrap().len(), 3);

    // A withdrawn bid frees a slot.
    m.ledger.close_bid(&order.bid(Address::new("beta"))).unwrap();
    m.bid(&order, "delta", 50).unwrap();
    m.ledger.check_invariants().unwrap();
}

#[test]
fn losing_bids_are_refunded() {
    let mut m = Market::new(20);
    let order = m.deploy(1, 100, 1_000);
    let a = m.bid(&order, "alpha", 10).unwrap().id;
    let b = m.bid(&order, "beta", 8).unwrap().id;
    assert_eq!(m.balance("beta"), uakt(PROVIDER_FUNDS - BID_DEPOSIT));

    let lease = m.ledger.create_lease(&a).unwrap();
    assert_eq!(lease.state, LeaseState::Active);
    assert_eq!(lease.price, uakt(10));

    assert_eq!(m.ledger.get_bid(&a).unwrap().unwrap().state, BidState::Active);
    assert_eq!(m.ledger.get_order(&order).unwrap().unwrap().state, OrderState::Active);
    assert_eq!(m.ledger.get_bid(&b).unwrap().unwrap().state, BidState::Lost);
    assert_eq!(m.bid_account(&b).unwrap().state, AccountState::Closed);
    assert_eq!(m.balance("beta"), uakt(PROVIDER_FUNDS));

    // The winner's deposit stays locked for the life of the lease.
    assert_eq!(m.bid_account(&a).unwrap().state, AccountState::Open);
    assert_eq!(m.balance("alpha"), uakt(PROVIDER_FUNDS - BID_DEPOSIT));

    assert!(m.ledger.events().contains(&LedgerEvent::BidLost { id: b }));
    m.ledger.check_invariants().unwrap();
}

#[test]
fn closing_lease_reopens_order() {
    let mut m = Market::new(20);
    let order = m.deploy(1, 100, 1_000);
    let id = m.bid(&order, "alpha", 10).unwrap().id;
    m.ledger.create_lease(&id).unwrap();
    m.ledger.advance(5);

    let lease = m.ledger.close_lease(&id).unwrap();
    assert_eq!(lease.state, LeaseState::Closed);
    assert_eq!(lease.close_reason, Some(LeaseCloseReason::Owner));
    assert_eq!(lease.closed_at, Some(m.ledger.height()));
    assert_eq!(m.ledger.get_bid(&id).unwrap().unwrap().state, BidState::Closed);
    assert_eq!(m.ledger.get_order(&order).unwrap().unwrap().state, OrderState::Closed);

    let payment = m.ledger.get_payment(&id).unwrap().unwrap();
    assert_eq!(payment.state, PaymentState::Closed);
    assert_eq!(payment.withdrawn, uakt(50));

    let orders = m.ledger.orders_for_group(&order.group()).unwrap();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[1].id.oseq, 2);
    assert_eq!(orders[1].state, OrderState::Open);

    // Paid for five blocks, deposit returned.
    assert_eq!(m.balance("alpha"), uakt(PROVIDER_FUNDS + 50));
    let account = m
        .ledger
        .get_account(&AccountId::for_deployment(&order.deployment()))
        .unwrap()
        .unwrap();
    assert_eq!(account.balance, uakt(950));
    m.ledger.check_invariants().unwrap();

    // The fresh order takes bids again.
    m.bid(&orders[1].id, "beta", 9).unwrap();
}

#[test]
fn overdraft_closes_lease_like_an_explicit_close() {
    let mut m = Market::new(20);
    let order = m.deploy(1, 100, 500);
    let id = m.bid(&order, "alpha", 10).unwrap().id;
    let other = m.bid(&order, "beta", 20).unwrap().id;
    m.ledger.create_lease(&id).unwrap();

    m.ledger.advance(100);
    let account = m.ledger.settle_deployment(&order.deployment()).unwrap();
    assert_eq!(account.state, AccountState::Overdrawn);
    assert!(account.available().unwrap().is_zero());

    let lease = m.ledger.get_lease(&id).unwrap().unwrap();
    assert_eq!(lease.state, LeaseState::Closed);
    assert_eq!(lease.close_reason, Some(LeaseCloseReason::InsufficientFunds));
    assert_eq!(m.ledger.get_bid(&id).unwrap().unwrap().state, BidState::Closed);
    assert_eq!(m.ledger.get_bid(&other).unwrap().unwrap().state, BidState::Lost);
    assert_eq!(m.ledger.get_order(&order).unwrap().unwrap().state, OrderState::Closed);
    assert_eq!(m.ledger.get_payment(&id).unwrap().unwrap().state, PaymentState::Overdrawn);

    let group = m.ledger.get_group(&order.group()).unwrap().unwrap();
    assert_eq!(group.state, GroupState::InsufficientFunds);
    assert_eq!(m.ledger.orders_for_group(&order.group()).unwrap().len(), 1);

    // Everything the tenant deposited went to the provider, plus the deposit back.
    assert_eq!(m.balance("alpha"), uakt(PROVIDER_FUNDS + 500));
    m.ledger.check_invariants().unwrap();

    // A manual close afterwards is a no-op.
    let root = m.ledger.state_root().unwrap();
    let events = m.ledger.events().len();
    let again = m.ledger.close_lease(&id).unwrap();
    assert_eq!(again, lease);
    assert_eq!(m.ledger.state_root().unwrap(), root);
    assert_eq!(m.ledger.events().len(), events);
}

#[test]
fn overdraft_detected_on_withdraw() {
    let mut m = Market::new(20);
    let order = m.deploy(1, 100, 300);
    let id = m.bid(&order, "alpha", 100).unwrap().id;
    m.ledger.create_lease(&id).unwrap();
    m.ledger.advance(2);

    let payment = m.ledger.withdraw_lease(&id).unwrap();
    assert_eq!(payment.state, PaymentState::Active);
    assert_eq!(payment.withdrawn, uakt(200));

    m.ledger.advance(2);
    let payment = m.ledger.withdraw_lease(&id).unwrap();
    assert_eq!(payment.state, PaymentState::Overdrawn);
    assert_eq!(payment.withdrawn, uakt(300));
    let lease = m.ledger.get_lease(&id).unwrap().unwrap();
    assert_eq!(lease.close_reason, Some(LeaseCloseReason::InsufficientFunds));
    m.ledger.check_invariants().unwrap();
}

#[test]
fn settlement_after_a_huge_block_gap_overdraws() {
    let mut m = Market::new(20);
    let rate = 9_000_000_000_000_000_000;
    let order = m.deploy(1, rate, 1_000);
    let id = m.bid(&order, "alpha", rate).unwrap().id;
    m.ledger.create_lease(&id).unwrap();

    m.ledger.advance(100_000_000_000);
    let account = m.ledger.settle_deployment(&order.deployment()).unwrap();
    assert_eq!(account.state, AccountState::Overdrawn);

    let lease = m.ledger.get_lease(&id).unwrap().unwrap();
    assert_eq!(lease.close_reason, Some(LeaseCloseReason::InsufficientFunds));
    let group = m.ledger.get_group(&order.group()).unwrap().unwrap();
    assert_eq!(group.state, GroupState::InsufficientFunds);
    assert_eq!(m.balance("alpha"), uakt(PROVIDER_FUNDS + 1_000));
    m.ledger.check_invariants().unwrap();
}

#[test]
fn overdraft_across_groups_tears_down_the_deployment() {
    let mut m = Market::new(20);
    let id = DeploymentId::new(m.tenant.clone(), 7);
    m.ledger
        .create_deployment(NewDeployment {
            id: id.clone(),
            groups: vec![
                GroupSpec::dummy("web", 100),
                GroupSpec::dummy("db", 100),
                GroupSpec::dummy("cache", 100),
            ],
            deposit: uakt(300),
            depositor: m.tenant.clone(),
        })
        .unwrap();
    let web = m.bid(&id.group(1).order(1), "alpha", 10).unwrap().id;
    let lost = m.bid(&id.group(1).order(1), "gamma", 12).unwrap().id;
    let db = m.bid(&id.group(2).order(1), "beta", 20).unwrap().id;
    let open = m.bid(&id.group(3).order(1), "delta", 15).unwrap().id;
    m.ledger.create_lease(&web).unwrap();
    m.ledger.create_lease(&db).unwrap();
    m.ledger.check_invariants().unwrap();

    // Owes 1500 against 300: group 1 is paid first.
    m.ledger.advance(50);
    let account = m.ledger.settle_deployment(&id).unwrap();
    assert_eq!(account.state, AccountState::Overdrawn);

    for lease in [&web, &db] {
        let lease = m.ledger.get_lease(lease).unwrap().unwrap();
        assert_eq!(lease.state, LeaseState::Closed);
        assert_eq!(lease.close_reason, Some(LeaseCloseReason::InsufficientFunds));
        assert_eq!(m.ledger.get_bid(&lease.id).unwrap().unwrap().state, BidState::Closed);
        assert_eq!(m.bid_account(&lease.id).unwrap().state, AccountState::Closed);
    }
    assert_eq!(m.ledger.get_bid(&lost).unwrap().unwrap().state, BidState::Lost);
    assert_eq!(m.ledger.get_bid(&open).unwrap().unwrap().state, BidState::Closed);
    for bid in [&lost, &open] {
        assert_eq!(m.bid_account(bid).unwrap().state, AccountState::Closed);
    }
    for gseq in 1..=3 {
        let group = m.ledger.get_group(&id.group(gseq)).unwrap().unwrap();
        assert_eq!(group.state, GroupState::InsufficientFunds);
        for order in m.ledger.orders_for_group(&group.id).unwrap() {
            assert_eq!(order.state, OrderState::Closed);
        }
    }

    assert_eq!(m.balance("alpha"), uakt(PROVIDER_FUNDS + 300));
    for provider in ["beta", "gamma", "delta"] {
        assert_eq!(m.balance(provider), uakt(PROVIDER_FUNDS));
    }
    m.ledger.check_invariants().unwrap();

    let closed = m.ledger.close_deployment(&id).unwrap();
    assert_eq!(closed.state, AccountState::Closed);
    assert_eq!(m.balance("tenant"), uakt(1_000_000 - 300));
    m.ledger.check_invariants().unwrap();
}

#[test]
fn close_is_idempotent() {
    let mut m = Market::new(20);
    let order = m.deploy(1, 100, 1_000);
    let id = m.bid(&order, "alpha", 10).unwrap().id;
    let loser = m.bid(&order, "beta", 10).unwrap().id;
    m.ledger.create_lease(&id).unwrap();
    m.ledger.advance(3);

    let first = m.ledger.close_lease(&id).unwrap();
    let root = m.ledger.state_root().unwrap();
    let second = m.ledger.close_lease(&id).unwrap();
    assert_eq!(first, second);
    assert_eq!(m.ledger.state_root().unwrap(), root);

    let bid = m.ledger.close_bid(&id).unwrap();
    assert_eq!(bid.state, BidState::Closed);
    assert_eq!(m.ledger.state_root().unwrap(), root);

    let lost = m.ledger.close_bid(&loser).unwrap();
    assert_eq!(lost.state, BidState::Closed);
    let root = m.ledger.state_root().unwrap();
    assert_eq!(m.ledger.close_bid(&loser).unwrap(), lost);
    assert_eq!(m.ledger.state_root().unwrap(), root);
    m.ledger.check_invariants().unwrap();
}

#[test]
fn close_lease_errors() {
    let mut m = Market::new(20);
    let order = m.deploy(1, 100, 1_000);
    let id = m.bid(&order, "alpha", 10).unwrap().id;

    let err = m.ledger.close_lease(&id).unwrap_err();
    assert!(matches!(err, LedgerError::LeaseNotFound(_)));
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = m.ledger.withdraw_lease(&id).unwrap_err();
    assert!(matches!(err, LedgerError::LeaseNotFound(_)));
}

#[test]
fn create_lease_requires_open_bid_order_and_group() {
    let mut m = Market::new(20);
    let order = m.deploy(1, 100, 1_000);
    let a = m.bid(&order, "alpha", 10).unwrap().id;
    let b = m.bid(&order, "beta", 10).unwrap().id;
    m.ledger.create_lease(&a).unwrap();

    let err = m.ledger.create_lease(&b).unwrap_err();
    assert!(matches!(err, LedgerError::BidNotOpen { actual: BidState::Lost, .. }));
    let err = m.ledger.create_lease(&a).unwrap_err();
    assert!(matches!(err, LedgerError::BidNotOpen { actual: BidState::Active, .. }));

    // Provider walks away: group paused, a new order cannot be leased.
    m.ledger.close_bid(&a).unwrap();
    let group = m.ledger.get_group(&order.group()).unwrap().unwrap();
    assert_eq!(group.state, GroupState::Paused);
    let reopened = m.ledger.start_group(&order.group()).unwrap().id;
    assert_eq!(reopened.oseq, 2);
    let c = m.bid(&reopened, "gamma", 10).unwrap().id;
    m.ledger.close_group(&order.group()).unwrap();
    let err = m.ledger.create_lease(&c).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    m.ledger.check_invariants().unwrap();
}

#[test]
fn failed_lease_creation_leaves_bids_untouched() {
    let mut m = Market::new(20);
    let usd = DecCoin::from_int("uusd", 1_000);
    m.ledger.mint(&m.tenant.clone(), &usd).unwrap();
    let id = DeploymentId::new(m.tenant.clone(), 9);
    m.ledger
        .create_deployment(NewDeployment {
            id: id.clone(),
            groups: vec![GroupSpec::dummy("web", 100)],
            deposit: usd,
            depositor: m.tenant.clone(),
        })
        .unwrap();
    let order = id.group(1).order(1);
    let a = m.bid(&order, "alpha", 10).unwrap().id;
    let b = m.bid(&order, "beta", 10).unwrap().id;
    let root = m.ledger.state_root().unwrap();

    let err = m.ledger.create_lease(&a).unwrap_err();
    assert!(matches!(err, LedgerError::DenomMismatch { .. }));
    assert_eq!(m.ledger.state_root().unwrap(), root);
    assert_eq!(m.ledger.get_bid(&b).unwrap().unwrap().state, BidState::Open);
    assert!(m.ledger.get_lease(&a).unwrap().is_none());
    m.ledger.check_invariants().unwrap();
}

#[test]
fn withdraw_keeps_stream_running() {
    let mut m = Market::new(20);
    let order = m.deploy(1, 100, 1_000);
    let id = m.bid(&order, "alpha", 10).unwrap().id;
    m.ledger.create_lease(&id).unwrap();

    m.ledger.advance(3);
    let payment = m.ledger.withdraw_lease(&id).unwrap();
    assert_eq!(payment.state, PaymentState::Active);
    assert_eq!(payment.withdrawn, uakt(30));
    assert!(payment.balance.is_zero());

    // Nothing accrued since: the second withdrawal moves nothing.
    let root = m.ledger.state_root().unwrap();
    m.ledger.withdraw_lease(&id).unwrap();
    assert_eq!(m.ledger.state_root().unwrap(), root);

    m.ledger.close_lease(&id).unwrap();
    let payment = m.ledger.withdraw_lease(&id).unwrap();
    assert_eq!(payment.state, PaymentState::Closed);
    assert_eq!(payment.withdrawn, uakt(30));
    m.ledger.check_invariants().unwrap();
}

#[test]
fn close_deployment_refunds_depositor() {
    let mut m = Market::new(20);
    let sponsor = Address::new("sponsor");
    m.ledger.mint(&sponsor, &uakt(2_000)).unwrap();
    let id = DeploymentId::new(m.tenant.clone(), 4);
    m.ledger
        .create_deployment(NewDeployment {
            id: id.clone(),
            groups: vec![GroupSpec::dummy("web", 100), GroupSpec::dummy("db", 100)],
            deposit: uakt(2_000),
            depositor: sponsor.clone(),
        })
        .unwrap();
    m.ledger.deposit_deployment(&id, &m.tenant.clone(), &uakt(100)).unwrap();

    let web = m.bid(&id.group(1).order(1), "alpha", 10).unwrap().id;
    let db = m.bid(&id.group(2).order(1), "beta", 5).unwrap().id;
    m.ledger.create_lease(&web).unwrap();
    m.ledger.create_lease(&db).unwrap();
    m.ledger.advance(10);

    let account = m.ledger.close_deployment(&id).unwrap();
    assert_eq!(account.state, AccountState::Closed);
    for lease in [&web, &db] {
        let lease = m.ledger.get_lease(lease).unwrap().unwrap();
        assert_eq!(lease.close_reason, Some(LeaseCloseReason::GroupClosed));
    }
    for gseq in 1..=2 {
        let group = m.ledger.get_group(&id.group(gseq)).unwrap().unwrap();
        assert_eq!(group.state, GroupState::Closed);
    }

    // 150 paid out, drawn from the tenant's own top-up first.
    assert_eq!(m.ledger.balance(&sponsor, "uakt").unwrap(), uakt(1_950));
    assert_eq!(m.balance("tenant"), uakt(1_000_000 - 100));
    assert_eq!(m.balance("alpha"), uakt(PROVIDER_FUNDS + 100));
    assert_eq!(m.balance("beta"), uakt(PROVIDER_FUNDS + 50));
    m.ledger.check_invariants().unwrap();
}

#[test]
fn third_party_cannot_top_up() {
    let mut m = Market::new(20);
    let order = m.deploy(1, 100, 1_000);
    let stranger = Address::new("stranger");
    m.ledger.mint(&stranger, &uakt(100)).unwrap();
    let err = m
        .ledger
        .deposit_deployment(&order.deployment(), &stranger, &uakt(100))
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidAddress(_)));
}

#[test]
fn audited_attributes_gate_bids() {
    let mut m = Market::new(20);
    let auditor = Address::new("auditor");
    let mut spec = GroupSpec::dummy("audited", 100);
    spec.requirements = PlacementRequirements {
        signed_by: SignedBy {
            all_of: vec![auditor.clone()],
            any_of: vec![],
        },
        attributes: Attributes::from_pairs([("region", "us-west")]),
    };
    let id = DeploymentId::new(m.tenant.clone(), 2);
    m.ledger
        .create_deployment(NewDeployment {
            id: id.clone(),
            groups: vec![spec],
            deposit: uakt(1_000),
            depositor: m.tenant.clone(),
        })
        .unwrap();
    let order = id.group(1).order(1);

    let err = m.bid(&order, "alpha", 10).unwrap_err();
    assert!(matches!(err, LedgerError::AttributeMismatch(_)));

    m.ledger.audit_provider(
        &Address::new("alpha"),
        &auditor,
        &Attributes::from_pairs([("region", "us-west")]),
    );
    m.bid(&order, "alpha", 10).unwrap();

    let err = m.bid(&order, "stranger", 10).unwrap_err();
    assert!(matches!(err, LedgerError::UnknownProvider(_)));
}

#[test]
fn sink_failure_aborts_command() {
    struct FailingSink;
    impl EventSink for FailingSink {
        fn publish(&mut self, _height: u64, _events: &[LedgerEvent]) -> Result<()> {
            Err(LedgerError::EventSink("sink unavailable".into()))
        }
    }

    let ledger = Ledger::from_json(&config(20)).unwrap().with_sink(Box::new(FailingSink));
    let mut m = Market::with_ledger(ledger);
    let root = m.ledger.state_root().unwrap();

    let err = m
        .ledger
        .create_deployment(NewDeployment {
            id: DeploymentId::new(m.tenant.clone(), 1),
            groups: vec![GroupSpec::dummy("web", 100)],
            deposit: uakt(1_000),
            depositor: m.tenant.clone(),
        })
        .unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(m.ledger.state_root().unwrap(), root);
    assert!(m.ledger.events().is_empty());
    m.ledger.check_invariants().unwrap();
}

#[test]
fn sink_receives_events_with_height() {
    #[derive(Clone, Default)]
    struct SharedSink(Rc<RefCell<Vec<(u64, LedgerEvent)>>>);
    impl EventSink for SharedSink {
        fn publish(&mut self, height: u64, events: &[LedgerEvent]) -> Result<()> {
            self.0.borrow_mut().extend(events.iter().map(|e| (height, e.clone())));
            Ok(())
        }
    }

    let sink = SharedSink::default();
    let ledger = Ledger::from_json(&config(20)).unwrap().with_sink(Box::new(sink.clone()));
    let mut m = Market::with_ledger(ledger);
    let order = m.deploy(1, 100, 1_000);
    m.ledger.advance(4);
    let id = m.bid(&order, "alpha", 10).unwrap().id;

    let published = sink.0.borrow();
    assert_eq!(published.len(), m.ledger.events().len());
    assert!(published.contains(&(1, LedgerEvent::OrderCreated { id: order })));
    assert!(published.contains(&(5, LedgerEvent::BidCreated { id, price: uakt(10) })));
}

#[test]
fn without_hooks_an_overdraft_strands_the_lease() {
    let ledger = Ledger::from_json(&config(20))
        .unwrap()
        .with_hooks(EscrowHooks::none());
    let mut m = Market::with_ledger(ledger);
    let order = m.deploy(1, 100, 100);
    let id = m.bid(&order, "alpha", 10).unwrap().id;
    m.ledger.create_lease(&id).unwrap();
    m.ledger.advance(50);
    m.ledger.settle_deployment(&order.deployment()).unwrap();

    assert!(m.ledger.get_lease(&id).unwrap().unwrap().is_active());
    let err = m.ledger.check_invariants().unwrap_err();
    assert!(matches!(err, LedgerError::StateCorruption(_)));
}

#[test]
fn identical_histories_produce_identical_roots() {
    fn run() -> (Ledger, [u8; 32]) {
        let mut m = Market::new(20);
        let order = m.deploy(1, 100, 1_000);
        let a = m.bid(&order, "alpha", 10).unwrap().id;
        m.bid(&order, "beta", 12).unwrap();
        m.ledger.create_lease(&a).unwrap();
        m.ledger.advance(7);
        m.ledger.withdraw_lease(&a).unwrap();
        m.ledger.close_lease(&a).unwrap();
        let root = m.ledger.state_root().unwrap();
        (m.ledger, root)
    }

    let (first, root_a) = run();
    let (second, root_b) = run();
    assert_eq!(root_a, root_b);
    assert_eq!(first.events(), second.events());
    assert_eq!(first.store(), second.store());
}

// ---------------------------------------------------------------------------
// Randomised operation sequences
// ---------------------------------------------------------------------------

/// Remembers the furthest lifecycle stage seen per entity.
#[derive(Default)]
struct Lifecycle(BTreeMap<String, u8>);

impl Lifecycle {
    fn record(&mut self, key: String, stage: u8) {
        let seen = self.0.entry(key.clone()).or_insert(stage);
        assert!(stage >= *seen, "{key} moved backwards: {seen} -> {stage}");
        *seen = stage;
    }

    fn observe(&mut self, ledger: &Ledger, group: &GroupId) {
        for order in ledger.orders_for_group(group).unwrap() {
            let stage = match order.state {
                OrderState::Open => 0,
                OrderState::Active => 1,
                OrderState::Closed => 2,
            };
            self.record(format!("order {}", order.id), stage);
            for bid in ledger.bids_for_order(&order.id).unwrap() {
                let stage = match bid.state {
                    BidState::Open => 0,
                    BidState::Active | BidState::Lost => 1,
                    BidState::Closed => 2,
                };
                self.record(format!("bid {}", bid.id), stage);
                if let Some(lease) = ledger.get_lease(&bid.id).unwrap() {
                    self.record(format!("lease {}", lease.id), u8::from(!lease.is_active()));
                }
            }
        }
    }
}

#[test]
fn random_operations_preserve_invariants() {
    for seed in 0..16_u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut m = Market::new(3);
        let group = m.deploy(1, 100, 2_000).group();
        let deployment = group.deployment();
        let mut lifecycle = Lifecycle::default();

        for step in 0..150 {
            let provider = PROVIDERS[rng.gen_range(0..PROVIDERS.len())];
            let orders = m.ledger.orders_for_group(&group).unwrap();
            let order = orders.last().unwrap().id.clone();
            let bid = order.bid(Address::new(provider));
            let result = match rng.gen_range(0..20) {
                0..=4 => m.bid(&order, provider, rng.gen_range(1..120)).map(drop),
                5..=7 => m.ledger.create_lease(&bid).map(drop),
                8 | 9 => m.ledger.close_lease(&bid).map(drop),
                10 | 11 => m.ledger.close_bid(&bid).map(drop),
                12 | 13 => m.ledger.withdraw_lease(&bid).map(drop),
                14..=16 => {
                    m.ledger.advance(rng.gen_range(1..40));
                    m.ledger.settle_deployment(&deployment).map(drop)
                }
                17 => m
                    .ledger
                    .deposit_deployment(&deployment, &m.tenant, &uakt(rng.gen_range(1..1_000)))
                    .map(drop),
                _ if step > 120 && rng.gen_bool(0.5) => m.ledger.close_group(&group).map(drop),
                _ => m.ledger.start_group(&group).map(drop),
            };
            if let Err(err) = result {
                assert!(!err.is_fatal(), "seed {seed} step {step}: {err}");
            }
            if let Err(err) = m.ledger.check_invariants() {
                panic!("seed {seed} step {step}: {err}");
            }
            lifecycle.observe(&m.ledger, &group);
        }
    }
}
