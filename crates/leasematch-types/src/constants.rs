//! System-wide constants for the LeaseMatch marketplace ledger.

/// Default settlement denomination.
pub const DEFAULT_DENOM: &str = "uakt";

/// Default minimum bid deposit, in [`DEFAULT_DENOM`].
pub const DEFAULT_BID_MIN_DEPOSIT_AMOUNT: i64 = 500_000;

/// Default maximum number of Open+Active bids per order.
pub const DEFAULT_ORDER_MAX_BIDS: u32 = 20;

/// Upper bound accepted for `order_max_bids` by config validation.
pub const MAX_ORDER_MAX_BIDS: u32 = 500;

/// Minimum denom length (e.g. `"akt"`).
pub const MIN_DENOM_LEN: usize = 3;

/// Maximum denom length.
pub const MAX_DENOM_LEN: usize = 128;

/// Name of the module account that custodies all escrowed value.
pub const ESCROW_MODULE_ACCOUNT: &str = "escrow";

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "LeaseMatch";

/// Height of the first block a fresh ledger executes at.
pub const GENESIS_HEIGHT: u64 = 1;
