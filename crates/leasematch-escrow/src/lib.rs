//! # leasematch-escrow
//!
//! **Escrow Ledger**: funded accounts, metered payment streams, and the
//! bank they draw from.
//!
//! ## Architecture
//!
//! 1. **Bank**: store-backed external balances per `(address, denom)`;
//!    escrowed value is custodied by the `escrow` module account
//! 2. **EscrowKeeper**: opens, funds, settles and closes accounts; creates,
//!    withdraws and closes payments
//!
//! ## Flow
//!
//! ```text
//! depositor ──open/deposit──▶ escrow module ──settle──▶ payment balance
//!                                  │                         │
//!                                  └──close: refund          └──withdraw──▶ payee
//! ```
//!
//! Closures and overdrafts queue [`leasematch_types::EscrowNotice`]s on the
//! transaction; subscribers react to them before the transaction commits.

pub mod bank;
pub mod keeper;

pub use bank::Bank;
pub use keeper::EscrowKeeper;
