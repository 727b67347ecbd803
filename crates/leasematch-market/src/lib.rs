//! # leasematch-market
//!
//! **Marketplace registries**: deployment groups, orders, bids and leases.
//!
//! ## Architecture
//!
//! 1. **GroupRegistry**: deployment groups and their Open / Paused /
//!    InsufficientFunds / Closed lifecycle
//! 2. **OrderRegistry**: one live order per group, sequential `oseq`
//! 3. **BidRegistry**: validated bids, per-order limits, withdrawal rules
//! 4. **LeaseRegistry**: winning bid → lease, losing siblings → Lost
//! 5. **BidValidator**: deposit, price, offer, attribute and capability gates
//! 6. **Determinism**: state-root hashing over the committed store
//!
//! The registries are pure state transitions over a
//! [`leasematch_types::TxContext`]. None of them calls into escrow; that is
//! the coordinator's job.

pub mod bids;
pub mod determinism;
pub mod groups;
pub mod keys;
pub mod leases;
pub mod matching;
pub mod orders;
pub mod providers;

pub use bids::{BidRegistry, NewBid};
pub use determinism::{compute_state_root, state_root_hex, verify_state_root};
pub use groups::GroupRegistry;
pub use leases::{LeaseMatch, LeaseRegistry};
pub use matching::BidValidator;
pub use orders::OrderRegistry;
pub use providers::{AttributeSource, ProviderDirectory, ProviderSource};
