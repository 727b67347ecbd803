//! Identifiers used throughout LeaseMatch.
//!
//! Every marketplace identifier is hierarchical and derived from its parent:
//!
//! ```text
//! DeploymentId(owner, dseq)
//!   └─ GroupId(.., gseq)
//!        └─ OrderId(.., oseq)
//!             └─ BidId(.., provider) == LeaseId
//! ```
//!
//! The canonical textual form joins the segments with `/`
//! (`owner/dseq/gseq/oseq/provider`). Escrow identifiers embed that form, so
//! hooks can recover the owning bid or lease from an account or payment ID.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{LedgerError, Result};

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// Opaque account address (tenant, provider, auditor or module account).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    #[must_use]
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Non-empty, printable ASCII, and free of the `/` segment separator.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty() && self.0.bytes().all(|b| b.is_ascii_graphic() && b != b'/')
    }

    /// # Errors
    /// Returns `InvalidAddress` when [`Address::is_valid`] is false.
    pub fn validate(&self) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(LedgerError::InvalidAddress(self.0.clone()))
        }
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Address {
    /// `name` as an address, unvalidated.
    pub fn dummy(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn next_segment<'a>(parts: &mut impl Iterator<Item = &'a str>, raw: &str) -> Result<&'a str> {
    parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| LedgerError::InvalidId(raw.to_string()))
}

fn parse_num<T: FromStr>(segment: &str, raw: &str) -> Result<T> {
    segment
        .parse()
        .map_err(|_| LedgerError::InvalidId(raw.to_string()))
}

// ---------------------------------------------------------------------------
// DeploymentId
// ---------------------------------------------------------------------------

/// A tenant deployment: `owner/dseq`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct DeploymentId {
    pub owner: Address,
    pub dseq: u64,
}

impl DeploymentId {
    #[must_use]
    pub fn new(owner: Address, dseq: u64) -> Self {
        Self { owner, dseq }
    }

    #[must_use]
    pub fn group(&self, gseq: u32) -> GroupId {
        GroupId::new(self.owner.clone(), self.dseq, gseq)
    }
}

impl fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.dseq)
    }
}

impl FromStr for DeploymentId {
    type Err = LedgerError;

    fn from_str(raw: &str) -> Result<Self> {
        let mut parts = raw.split('/');
        let owner = Address::new(next_segment(&mut parts, raw)?);
        let dseq = parse_num(next_segment(&mut parts, raw)?, raw)?;
        if parts.next().is_some() {
            return Err(LedgerError::InvalidId(raw.to_string()));
        }
        Ok(Self { owner, dseq })
    }
}

// ---------------------------------------------------------------------------
// GroupId
// ---------------------------------------------------------------------------

/// A deployment group: `owner/dseq/gseq`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct GroupId {
    pub owner: Address,
    pub dseq: u64,
    pub gseq: u32,
}

impl GroupId {
    #[must_use]
    pub fn new(owner: Address, dseq: u64, gseq: u32) -> Self {
        Self { owner, dseq, gseq }
    }

    #[must_use]
    pub fn deployment(&self) -> DeploymentId {
        DeploymentId::new(self.owner.clone(), self.dseq)
    }

    #[must_use]
    pub fn order(&self, oseq: u32) -> OrderId {
        OrderId::new(self.owner.clone(), self.dseq, self.gseq, oseq)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.owner, self.dseq, self.gseq)
    }
}

// ---------------------------------------------------------------------------
// OrderId
// ---------------------------------------------------------------------------

/// An order opened against a group: `owner/dseq/gseq/oseq`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct OrderId {
    pub owner: Address,
    pub dseq: u64,
    pub gseq: u32,
    pub oseq: u32,
}

impl OrderId {
    #[must_use]
    pub fn new(owner: Address, dseq: u64, gseq: u32, oseq: u32) -> Self {
        Self {
            owner,
            dseq,
            gseq,
            oseq,
        }
    }

    #[must_use]
    pub fn group(&self) -> GroupId {
        GroupId::new(self.owner.clone(), self.dseq, self.gseq)
    }

    #[must_use]
    pub fn deployment(&self) -> DeploymentId {
        DeploymentId::new(self.owner.clone(), self.dseq)
    }

    #[must_use]
    pub fn bid(&self, provider: Address) -> BidId {
        BidId {
            owner: self.owner.clone(),
            dseq: self.dseq,
            gseq: self.gseq,
            oseq: self.oseq,
            provider,
        }
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.owner, self.dseq, self.gseq, self.oseq)
    }
}

// ---------------------------------------------------------------------------
// BidId / LeaseId
// ---------------------------------------------------------------------------

/// A provider's bid on an order: `owner/dseq/gseq/oseq/provider`.
///
/// Exactly one bid can exist per (order, provider) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct BidId {
    pub owner: Address,
    pub dseq: u64,
    pub gseq: u32,
    pub oseq: u32,
    pub provider: Address,
}

/// A lease is identified by the bid it was created from.
pub type LeaseId = BidId;

impl BidId {
    #[must_use]
    pub fn order(&self) -> OrderId {
        OrderId::new(self.owner.clone(), self.dseq, self.gseq, self.oseq)
    }

    #[must_use]
    pub fn group(&self) -> GroupId {
        GroupId::new(self.owner.clone(), self.dseq, self.gseq)
    }

    #[must_use]
    pub fn deployment(&self) -> DeploymentId {
        DeploymentId::new(self.owner.clone(), self.dseq)
    }
}

impl fmt::Display for BidId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}",
            self.owner, self.dseq, self.gseq, self.oseq, self.provider
        )
    }
}

impl FromStr for BidId {
    type Err = LedgerError;

    fn from_str(raw: &str) -> Result<Self> {
        let mut parts = raw.split('/');
        let owner = Address::new(next_segment(&mut parts, raw)?);
        let dseq = parse_num(next_segment(&mut parts, raw)?, raw)?;
        let gseq = parse_num(next_segment(&mut parts, raw)?, raw)?;
        let oseq = parse_num(next_segment(&mut parts, raw)?, raw)?;
        let provider = Address::new(next_segment(&mut parts, raw)?);
        if parts.next().is_some() {
            return Err(LedgerError::InvalidId(raw.to_string()));
        }
        Ok(Self {
            owner,
            dseq,
            gseq,
            oseq,
            provider,
        })
    }
}
