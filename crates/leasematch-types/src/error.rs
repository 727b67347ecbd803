//! Error types for the LeaseMatch marketplace ledger.
//!
//! All errors use the `LM_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Order errors
//! - 2xx: Bid errors
//! - 3xx: Lease errors
//! - 4xx: Deployment group errors
//! - 5xx: Escrow errors
//! - 6xx: Bank errors
//! - 7xx: Validation errors
//! - 9xx: Fatal errors (store, codec, event sink, corrupted state)
//!
//! Every variant maps onto one [`ErrorKind`]. None of them is retryable:
//! the same command against the same state fails the same way.

use std::fmt;

use thiserror::Error;

use crate::{
    AccountId, AccountState, Address, BidId, BidState, DecCoin, GroupId, GroupState, LeaseId,
    LeaseState, OrderId, OrderState, PaymentId,
};

/// Coarse classification of a [`LedgerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A referenced order/bid/lease/group/account does not exist.
    NotFound,
    /// The entity exists but is in the wrong lifecycle state.
    InvalidState,
    /// Price, deposit, attribute or capacity mismatch against market rules.
    ValidationFailure,
    /// Bid-count limit or insufficient funds.
    ResourceExhausted,
    /// Store, codec or event-sink failure. Aborts the whole transaction.
    Fatal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "NOT_FOUND"),
            Self::InvalidState => write!(f, "INVALID_STATE"),
            Self::ValidationFailure => write!(f, "VALIDATION_FAILURE"),
            Self::ResourceExhausted => write!(f, "RESOURCE_EXHAUSTED"),
            Self::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Central error enum for all LeaseMatch operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    // =================================================================
    // Order Errors (1xx)
    // =================================================================
    #[error("LM_ERR_100: Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("LM_ERR_101: Order {id} not open: expected OPEN, got {actual}")]
    OrderNotOpen { id: OrderId, actual: OrderState },

    #[error("LM_ERR_102: Order {id} not active: expected ACTIVE, got {actual}")]
    OrderNotActive { id: OrderId, actual: OrderState },

    /// The group already has a non-terminal order.
    #[error("LM_ERR_103: Group {group} already has order {existing} in state {state}")]
    OrderExists {
        group: GroupId,
        existing: OrderId,
        state: OrderState,
    },

    // =================================================================
    // Bid Errors (2xx)
    // =================================================================
    #[error("LM_ERR_200: Bid not found: {0}")]
    BidNotFound(BidId),

    #[error("LM_ERR_201: Bid {id} not open: expected OPEN, got {actual}")]
    BidNotOpen { id: BidId, actual: BidState },

    #[error("LM_ERR_202: Bid {id} not active: expected ACTIVE, got {actual}")]
    BidNotActive { id: BidId, actual: BidState },

    #[error("LM_ERR_203: Bid already exists: {0}")]
    BidExists(BidId),

    #[error("LM_ERR_204: Too many bids on order {order}: maximum {max}")]
    TooManyBids { order: OrderId, max: u32 },

    #[error("LM_ERR_205: Bid price {price} above order ceiling {ceiling}")]
    BidOverOrder { price: DecCoin, ceiling: DecCoin },

    #[error("LM_ERR_206: Invalid bid price: {0}")]
    InvalidBidPrice(String),

    #[error("LM_ERR_207: Resource offer or provider capabilities do not match order {0}")]
    CapabilitiesMismatch(OrderId),

    #[error("LM_ERR_208: Provider attributes do not satisfy order {0} requirements")]
    AttributeMismatch(OrderId),

    #[error("LM_ERR_209: Unknown provider: {0}")]
    UnknownProvider(Address),

    #[error("LM_ERR_210: Invalid deposit: minimum {minimum}, received {received}")]
    InvalidDeposit { minimum: DecCoin, received: DecCoin },

    // =================================================================
    // Lease Errors (3xx)
    // =================================================================
    #[error("LM_ERR_300: Lease not found: {0}")]
    LeaseNotFound(LeaseId),

    #[error("LM_ERR_301: Lease {id} not active: expected ACTIVE, got {actual}")]
    LeaseNotActive { id: LeaseId, actual: LeaseState },

    #[error("LM_ERR_302: Lease already exists: {0}")]
    LeaseExists(LeaseId),

    /// An Active bid can only be closed once its lease is.
    #[error("LM_ERR_303: Lease {0} is still active")]
    LeaseStillActive(LeaseId),

    // =================================================================
    // Deployment Group Errors (4xx)
    // =================================================================
    #[error("LM_ERR_400: Group not found: {0}")]
    GroupNotFound(GroupId),

    #[error("LM_ERR_401: Group {id} not open: expected OPEN, got {actual}")]
    GroupNotOpen { id: GroupId, actual: GroupState },

    #[error("LM_ERR_402: Group already exists: {0}")]
    GroupExists(GroupId),

    #[error("LM_ERR_403: Group {id} not paused: expected PAUSED, got {actual}")]
    GroupNotPaused { id: GroupId, actual: GroupState },

    // =================================================================
    // Escrow Errors (5xx)
    // =================================================================
    #[error("LM_ERR_500: Escrow account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("LM_ERR_501: Escrow account already exists: {0}")]
    AccountExists(AccountId),

    #[error("LM_ERR_502: Escrow account {id} not open: expected OPEN, got {actual}")]
    AccountNotOpen { id: AccountId, actual: AccountState },

    #[error("LM_ERR_503: Escrow payment not found: {account}/{payment}")]
    PaymentNotFound {
        account: AccountId,
        payment: PaymentId,
    },

    #[error("LM_ERR_504: Escrow payment already exists: {account}/{payment}")]
    PaymentExists {
        account: AccountId,
        payment: PaymentId,
    },

    #[error("LM_ERR_505: Escrow account {id} still has {active} active payment(s)")]
    PaymentsStillActive { id: AccountId, active: usize },

    #[error("LM_ERR_506: Denomination mismatch: expected {expected}, got {actual}")]
    DenomMismatch { expected: String, actual: String },

    // =================================================================
    // Bank Errors (6xx)
    // =================================================================
    #[error("LM_ERR_600: Insufficient funds for {address}: need {needed}, have {available}")]
    InsufficientFunds {
        address: Address,
        needed: DecCoin,
        available: DecCoin,
    },

    #[error("LM_ERR_601: Invalid amount: {0}")]
    InvalidAmount(String),

    // =================================================================
    // Validation Errors (7xx)
    // =================================================================
    #[error("LM_ERR_700: Invalid address: {0:?}")]
    InvalidAddress(String),

    #[error("LM_ERR_701: Invalid group spec: {reason}")]
    InvalidSpec { reason: String },

    #[error("LM_ERR_702: Invalid identifier: {0:?}")]
    InvalidId(String),

    // =================================================================
    // Fatal (9xx)
    // =================================================================
    #[error("LM_ERR_900: Store failure: {0}")]
    Store(String),

    #[error("LM_ERR_901: Codec failure: {0}")]
    Codec(String),

    #[error("LM_ERR_902: Event sink failure: {0}")]
    EventSink(String),

    #[error("LM_ERR_903: Corrupted ledger state: {0}")]
    StateCorruption(String),

    #[error("LM_ERR_904: Configuration error: {0}")]
    Configuration(String),
}

impl LedgerError {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::OrderNotFound(_)
            | Self::BidNotFound(_)
            | Self::LeaseNotFound(_)
            | Self::GroupNotFound(_)
            | Self::AccountNotFound(_)
            | Self::PaymentNotFound { .. } => ErrorKind::NotFound,

            Self::OrderNotOpen { .. }
            | Self::OrderNotActive { .. }
            | Self::OrderExists { .. }
            | Self::BidNotOpen { .. }
            | Self::BidNotActive { .. }
            | Self::LeaseNotActive { .. }
            | Self::LeaseExists(_)
            | Self::LeaseStillActive(_)
            | Self::GroupNotOpen { .. }
            | Self::GroupExists(_)
            | Self::GroupNotPaused { .. }
            | Self::AccountExists(_)
            | Self::AccountNotOpen { .. }
            | Self::PaymentExists { .. }
            | Self::PaymentsStillActive { .. } => ErrorKind::InvalidState,

            Self::BidExists(_)
            | Self::BidOverOrder { .. }
            | Self::InvalidBidPrice(_)
            | Self::CapabilitiesMismatch(_)
            | Self::AttributeMismatch(_)
            | Self::UnknownProvider(_)
            | Self::InvalidDeposit { .. }
            | Self::DenomMismatch { .. }
            | Self::InvalidAmount(_)
            | Self::InvalidAddress(_)
            | Self::InvalidSpec { .. }
            | Self::InvalidId(_) => ErrorKind::ValidationFailure,

            Self::TooManyBids { .. } | Self::InsufficientFunds { .. } => {
                ErrorKind::ResourceExhausted
            }

            Self::Store(_)
            | Self::Codec(_)
            | Self::EventSink(_)
            | Self::StateCorruption(_)
            | Self::Configuration(_) => ErrorKind::Fatal,
        }
    }

    /// Whether this error must abort the enclosing block, not just the command.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Fatal
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, LedgerError>;

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.to_string())
    }
}
