//! # leasematch-types
//!
//! Shared types, errors, configuration and storage primitives for the
//! **LeaseMatch** marketplace ledger.
//!
//! This crate is the leaf dependency of the workspace. It defines:
//!
//! - **Identifiers**: [`Address`], [`DeploymentId`], [`GroupId`], [`OrderId`], [`BidId`], [`LeaseId`]
//! - **Money**: [`DecCoin`]
//! - **Requirements**: [`Attributes`], [`PlacementRequirements`], [`GroupSpec`], [`ResourcesOffer`]
//! - **Marketplace records**: [`Group`], [`Order`], [`Bid`], [`Lease`]
//! - **Escrow records**: [`Account`], [`Payment`], [`AccountId`], [`PaymentId`]
//! - **Configuration**: [`MarketParams`], [`LedgerConfig`], [`ParamSource`]
//! - **Events**: [`LedgerEvent`], [`EventSink`]
//! - **Storage**: [`KvStore`], [`MemStore`], [`CacheStore`], [`KeyBuilder`], [`TxContext`]
//! - **Errors**: [`LedgerError`] with `LM_ERR_` prefix codes
//! - **Constants**: system-wide limits and defaults

pub mod attributes;
pub mod bid;
pub mod codec;
pub mod coin;
pub mod config;
pub mod constants;
pub mod context;
pub mod deployment;
pub mod error;
pub mod escrow;
pub mod events;
pub mod ids;
pub mod lease;
pub mod order;
pub mod resources;
pub mod store;

// Re-export all primary types at crate root for ergonomic imports:
//   use leasematch_types::{Order, Bid, Lease, DecCoin, ...};

pub use attributes::*;
pub use bid::*;
pub use coin::*;
pub use config::*;
pub use context::*;
pub use deployment::*;
pub use error::*;
pub use escrow::*;
pub use events::*;
pub use ids::*;
pub use lease::*;
pub use order::*;
pub use resources::*;
pub use store::*;

// Constants and codec are accessed via `leasematch_types::constants::FOO`
// and `leasematch_types::codec::encode` (not re-exported).
