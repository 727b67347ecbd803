//! Resource specifications: what a deployment group asks for and what a
//! provider offers in a bid.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Attributes, DecCoin, LedgerError, PlacementRequirements, Result};

/// A storage volume request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageVolume {
    pub name: String,
    pub bytes: u64,
    /// e.g. `class = beta2`, `persistent = true`.
    pub attributes: Attributes,
}

/// GPU request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuUnits {
    pub units: u32,
    /// e.g. `vendor/nvidia/model/a100 = true`.
    pub attributes: Attributes,
}

/// The resources of one replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUnits {
    /// Unit ID within the group spec.
    pub id: u32,
    pub cpu_millis: u64,
    pub memory_bytes: u64,
    pub storage: Vec<StorageVolume>,
    pub gpu: GpuUnits,
    pub endpoints: u32,
}

/// `count` replicas of `resources`, each priced at `price` per block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUnit {
    pub resources: ResourceUnits,
    pub count: u32,
    pub price: DecCoin,
}

impl ResourceUnit {
    /// `price × count`.
    ///
    /// # Errors
    /// `InvalidAmount` on overflow.
    pub fn total_price(&self) -> Result<DecCoin> {
        self.price.scaled(Decimal::from(self.count))
    }
}

/// The full specification of a deployment group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSpec {
    pub name: String,
    pub requirements: PlacementRequirements,
    pub resources: Vec<ResourceUnit>,
}

impl GroupSpec {
    /// Sum of `price × count` over all resource units.
    ///
    /// # Errors
    /// `InvalidSpec` if the spec has no resources, `DenomMismatch` if the
    /// unit prices use different denominations.
    pub fn price(&self) -> Result<DecCoin> {
        let (first, rest) = self
            .resources
            .split_first()
            .ok_or_else(|| LedgerError::InvalidSpec {
                reason: format!("group {:?} has no resources", self.name),
            })?;
        rest.iter()
            .try_fold(first.total_price()?, |acc, unit| acc.checked_add(&unit.total_price()?))
    }

    /// Structural validation run before a group or order is created.
    ///
    /// # Errors
    /// `InvalidSpec` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Err(LedgerError::InvalidSpec { reason });
        if self.name.is_empty() {
            return invalid("empty group name".to_string());
        }
        if self.resources.is_empty() {
            return invalid(format!("group {:?} has no resources", self.name));
        }
        let mut ids: Vec<u32> = self.resources.iter().map(|r| r.resources.id).collect();
        ids.sort_unstable();
        if ids.windows(2).any(|w| w[0] == w[1]) {
            return invalid(format!("group {:?} has duplicate resource ids", self.name));
        }
        for unit in &self.resources {
            if unit.count == 0 {
                return invalid(format!("resource {} has zero count", unit.resources.id));
            }
            if !unit.price.is_valid() {
                return invalid(format!(
                    "resource {} has invalid price {}",
                    unit.resources.id, unit.price
                ));
            }
        }
        self.price().map(|_| ())
    }
}

/// A provider's offer for one resource unit of the spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceOffer {
    pub resources: ResourceUnits,
    pub count: u32,
}

/// Offers accompanying a bid. Empty means "exactly the group spec".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcesOffer(pub Vec<ResourceOffer>);

impl ResourcesOffer {
    /// Offer every unit of `spec` exactly as requested.
    #[must_use]
    pub fn from_spec(spec: &GroupSpec) -> Self {
        Self(
            spec.resources
                .iter()
                .map(|u| ResourceOffer {
                    resources: u.resources.clone(),
                    count: u.count,
                })
                .collect(),
        )
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl GroupSpec {
    /// A single-unit spec priced at `price` per block in `uakt`.
    pub fn dummy(name: &str, price: i64) -> Self {
        Self {
            name: name.to_string(),
            requirements: PlacementRequirements::default(),
            resources: vec![ResourceUnit {
                resources: ResourceUnits::dummy(1),
                count: 1,
                price: DecCoin::from_int(crate::constants::DEFAULT_DENOM, price),
            }],
        }
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl ResourceUnits {
    pub fn dummy(id: u32) -> Self {
        Self {
            id,
            cpu_millis: 1000,
            memory_bytes: 512 * 1024 * 1024,
            storage: vec![StorageVolume {
                name: "default".to_string(),
                bytes: 1024 * 1024 * 1024,
                attributes: Attributes::default(),
            }],
            gpu: GpuUnits::default(),
            endpoints: 1,
        }
    }
}
