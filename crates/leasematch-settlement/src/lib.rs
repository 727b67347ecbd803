//! # leasematch-settlement
//!
//! **Matching & settlement coordinator**: the atomic commands that move
//! orders, bids and leases through their lifecycles and keep the escrow
//! ledger in step with them.
//!
//! ## Architecture
//!
//! A command enters through [`Ledger`] and:
//! 1. Opens a transaction context over the committed store
//! 2. Runs the [`Coordinator`] operation (registries + escrow keeper)
//! 3. Drains escrow notices through the [`EscrowHooks`] subscribers
//! 4. Publishes the buffered events to the sink, then commits the store
//!
//! A failure at any step discards the whole transaction.
//!
//! [`SupplyConservation`] and [`Ledger::check_invariants`] verify that value
//! is only ever moved, never created or destroyed, and that no lease, bid,
//! order or payment is left half-closed.

pub mod coordinator;
pub mod hooks;
pub mod ledger;
pub mod supply_conservation;

pub use coordinator::{Coordinator, NewDeployment};
pub use hooks::{AccountClosedHook, EscrowHooks, PaymentClosedHook};
pub use ledger::Ledger;
pub use supply_conservation::SupplyConservation;
