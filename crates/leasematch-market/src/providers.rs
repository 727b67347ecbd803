//! Read-only provider and audit lookups consumed by bid validation.

use std::collections::BTreeMap;

use leasematch_types::{Address, Attributes, AuditedAttributes, Provider};

/// Registered providers.
pub trait ProviderSource {
    fn get_provider(&self, owner: &Address) -> Option<Provider>;
}

/// Auditor-signed provider attributes.
pub trait AttributeSource {
    /// Every audit of `owner`, ascending by auditor. Empty if none.
    fn provider_attributes(&self, owner: &Address) -> Vec<AuditedAttributes>;
}

/// In-memory provider and audit registry.
#[derive(Debug, Clone, Default)]
pub struct ProviderDirectory {
    providers: BTreeMap<Address, Provider>,
    /// Keyed by `(provider, auditor)`.
    audits: BTreeMap<(Address, Address), AuditedAttributes>,
}

impl ProviderDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a provider.
    pub fn register(&mut self, provider: Provider) {
        self.providers.insert(provider.owner.clone(), provider);
    }

    /// Record `auditor`'s attestation of `owner`, merged with any earlier one.
    pub fn audit(&mut self, owner: &Address, auditor: &Address, attributes: &Attributes) {
        let entry = self
            .audits
            .entry((owner.clone(), auditor.clone()))
            .or_insert_with(|| AuditedAttributes {
                owner: owner.clone(),
                auditor: auditor.clone(),
                attributes: Attributes::default(),
            });
        entry.attributes = Attributes::merge([&entry.attributes, attributes]);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl ProviderSource for ProviderDirectory {
    fn get_provider(&self, owner: &Address) -> Option<Provider> {
        self.providers.get(owner).cloned()
    }
}

impl AttributeSource for ProviderDirectory {
    fn provider_attributes(&self, owner: &Address) -> Vec<AuditedAttributes> {
        self.audits
            .range((owner.clone(), Address::new(""))..)
            .take_while(|((o, _), _)| o == owner)
            .map(|(_, a)| a.clone())
            .collect()
    }
}
