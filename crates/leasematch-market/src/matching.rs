//! Bid validation: the hard gate every bid passes before it is persisted.
//!
//! Each check maps to one specific error so a rejected provider knows
//! exactly which rule it failed:
//!
//! | check | error |
//! |---|---|
//! | deposit denom / minimum | `InvalidDeposit` |
//! | price valid, same denom, under ceiling | `InvalidBidPrice` / `DenomMismatch` / `BidOverOrder` |
//! | offer matches the group's resource units | `CapabilitiesMismatch` |
//! | self + audited attributes, auditor sign-off | `AttributeMismatch` |
//! | storage class and GPU model capabilities | `CapabilitiesMismatch` |

use leasematch_types::{
    Address, Attribute, Attributes, AuditedAttributes, DecCoin, GroupSpec, LedgerError,
    MarketParams, Order, Provider, ResourcesOffer, Result,
};

const STORAGE_CAPABILITY: &str = "capabilities/storage/";
const GPU_CAPABILITY: &str = "capabilities/gpu/";

/// Validates bids against marketplace parameters and order requirements.
pub struct BidValidator<'a> {
    params: &'a MarketParams,
}

impl<'a> BidValidator<'a> {
    #[must_use]
    pub fn new(params: &'a MarketParams) -> Self {
        Self { params }
    }

    /// The deposit must be in the minimum's denomination and at least as large.
    ///
    /// # Errors
    /// `InvalidDeposit`.
    pub fn validate_deposit(&self, deposit: &DecCoin) -> Result<()> {
        let minimum = &self.params.bid_min_deposit;
        if deposit.denom != minimum.denom
            || !deposit.is_valid()
            || deposit.amount < minimum.amount
        {
            return Err(LedgerError::InvalidDeposit {
                minimum: minimum.clone(),
                received: deposit.clone(),
            });
        }
        Ok(())
    }

    /// # Errors
    /// `InvalidBidPrice`, `DenomMismatch` or `BidOverOrder`.
    pub fn validate_price(&self, order: &Order, price: &DecCoin) -> Result<()> {
        if !price.is_valid() {
            return Err(LedgerError::InvalidBidPrice(price.to_string()));
        }
        let spec_price = order.spec.price()?;
        if price.denom != spec_price.denom {
            return Err(LedgerError::DenomMismatch {
                expected: spec_price.denom,
                actual: price.denom.clone(),
            });
        }
        if let Some(ceiling) = self.params.ceiling_price(&order.spec)? {
            if ceiling.is_lt(price)? {
                return Err(LedgerError::BidOverOrder {
                    price: price.clone(),
                    ceiling,
                });
            }
        }
        Ok(())
    }

    /// # Errors
    /// `CapabilitiesMismatch` if the offer does not match the group spec.
    pub fn validate_offer(&self, order: &Order, offer: &ResourcesOffer) -> Result<()> {
        if offer_matches(offer, &order.spec) {
            Ok(())
        } else {
            Err(LedgerError::CapabilitiesMismatch(order.id.clone()))
        }
    }

    /// Attribute and auditor requirements first, then resource capabilities.
    ///
    /// # Errors
    /// `AttributeMismatch` or `CapabilitiesMismatch`.
    pub fn validate_placement(
        &self,
        order: &Order,
        provider: &Provider,
        audits: &[AuditedAttributes],
    ) -> Result<()> {
        if !requirements_match(&order.spec, provider, audits) {
            return Err(LedgerError::AttributeMismatch(order.id.clone()));
        }
        if !capabilities_match(&order.spec, &provider.attributes) {
            return Err(LedgerError::CapabilitiesMismatch(order.id.clone()));
        }
        Ok(())
    }
}

/// An empty offer means "exactly the spec". Otherwise every resource unit
/// must be offered once, unchanged, with the same count.
#[must_use]
pub fn offer_matches(offer: &ResourcesOffer, spec: &GroupSpec) -> bool {
    if offer.0.is_empty() {
        return true;
    }
    if offer.0.len() != spec.resources.len() {
        return false;
    }
    spec.resources.iter().all(|unit| {
        let mut offered = offer.0.iter().filter(|o| o.resources.id == unit.resources.id);
        match (offered.next(), offered.next()) {
            (Some(o), None) => o.count == unit.count && o.resources == unit.resources,
            _ => false,
        }
    })
}

/// Placement requirements of `spec` against the provider's own attributes and
/// its audits.
///
/// - required attributes must be present in the merged self + audited set
/// - every `all_of` auditor must have attested the required attributes
/// - if `any_of` is non-empty, at least one of them must have
#[must_use]
pub fn requirements_match(
    spec: &GroupSpec,
    provider: &Provider,
    audits: &[AuditedAttributes],
) -> bool {
    let required = &spec.requirements.attributes;
    let merged = Attributes::merge(
        std::iter::once(&provider.attributes).chain(audits.iter().map(|a| &a.attributes)),
    );
    if !required.subset_of(&merged) {
        return false;
    }

    let signed = |auditor: &Address| {
        audits
            .iter()
            .any(|a| &a.auditor == auditor && required.subset_of(&a.attributes))
    };
    let signed_by = &spec.requirements.signed_by;
    if !signed_by.all_of.iter().all(signed) {
        return false;
    }
    signed_by.any_of.is_empty() || signed_by.any_of.iter().any(signed)
}

/// Resource capabilities the provider advertises under `capabilities/...`.
///
/// - a storage volume with attributes needs one provider storage class group
///   (`capabilities/storage/<n>/<name>`) containing all of them
/// - a GPU request with attributes needs at least one of them under
///   `capabilities/gpu/`
#[must_use]
pub fn capabilities_match(spec: &GroupSpec, provider: &Attributes) -> bool {
    let storage_groups = storage_capabilities(provider);
    let gpu = Attributes::new(
        provider
            .iter()
            .filter_map(|a| {
                a.key
                    .strip_prefix(GPU_CAPABILITY)
                    .map(|k| Attribute::new(k, a.value.clone()))
            })
            .collect(),
    );

    spec.resources.iter().all(|unit| {
        let storage_ok = unit.resources.storage.iter().all(|volume| {
            volume.attributes.is_empty()
                || storage_groups
                    .iter()
                    .any(|(_, group)| volume.attributes.subset_of(group))
        });
        let request = &unit.resources.gpu;
        let gpu_ok = request.units == 0
            || request.attributes.is_empty()
            || request.attributes.iter().any(|a| gpu.contains(a));
        storage_ok && gpu_ok
    })
}

/// Group `capabilities/storage/<n>/<name> = value` by `<n>`, ascending.
fn storage_capabilities(provider: &Attributes) -> Vec<(String, Attributes)> {
    let mut groups: Vec<(String, Attributes)> = Vec::new();
    for attr in provider.iter() {
        let Some((index, name)) = attr
            .key
            .strip_prefix(STORAGE_CAPABILITY)
            .and_then(|rest| rest.split_once('/'))
        else {
            continue;
        };
        let entry = Attribute::new(name, attr.value.clone());
        match groups.iter_mut().find(|(i, _)| i == index) {
            Some((_, group)) => group.0.push(entry),
            None => groups.push((index.to_string(), Attributes::new(vec![entry]))),
        }
    }
    groups.sort_by(|a, b| a.0.cmp(&b.0));
    groups
}
