//! Provider and placement attributes.
//!
//! Attribute lists are persisted and hashed, so every list that is built by
//! merging is stable-sorted by key (then value) and de-duplicated. Nothing in
//! this module depends on hash-map iteration order.

use serde::{Deserialize, Serialize};

use crate::Address;

/// A single `key = value` attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Attribute {
    pub key: String,
    pub value: String,
}

impl Attribute {
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// An ordered attribute list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes(pub Vec<Attribute>);

impl Attributes {
    #[must_use]
    pub fn new(attrs: Vec<Attribute>) -> Self {
        Self(attrs)
    }

    /// Build from `(key, value)` pairs.
    #[must_use]
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self(pairs.into_iter().map(|(k, v)| Attribute::new(k, v)).collect())
    }

    /// Concatenate several lists, then stable-sort by key and drop exact duplicates.
    #[must_use]
    pub fn merge<'a>(lists: impl IntoIterator<Item = &'a Attributes>) -> Self {
        let mut merged: Vec<Attribute> = lists
            .into_iter()
            .flat_map(|l| l.0.iter().cloned())
            .collect();
        merged.sort_by(|a, b| a.key.cmp(&b.key).then_with(|| a.value.cmp(&b.value)));
        merged.dedup();
        Self(merged)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.0.iter()
    }

    #[must_use]
    pub fn contains(&self, attr: &Attribute) -> bool {
        self.0.iter().any(|a| a == attr)
    }

    /// First value recorded for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|a| a.key == key).map(|a| a.value.as_str())
    }

    /// Every attribute of `self` also appears in `other`.
    #[must_use]
    pub fn subset_of(&self, other: &Self) -> bool {
        self.0.iter().all(|a| other.contains(a))
    }
}

/// Which auditors must have signed off on a provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedBy {
    /// Every one of these auditors must have audited the provider.
    pub all_of: Vec<Address>,
    /// At least one of these auditors must have audited the provider.
    pub any_of: Vec<Address>,
}

impl SignedBy {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.all_of.is_empty() && self.any_of.is_empty()
    }
}

/// Placement requirements a provider must satisfy to bid on an order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementRequirements {
    pub signed_by: SignedBy,
    pub attributes: Attributes,
}

/// Attributes attested for `owner` by `auditor`.
///
/// A provider's own attributes are represented with `auditor == owner`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditedAttributes {
    pub owner: Address,
    pub auditor: Address,
    pub attributes: Attributes,
}

/// A registered provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub owner: Address,
    pub host_uri: String,
    pub attributes: Attributes,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_sorts_and_dedups() {
        let a = Attributes::from_pairs([("region", "us-west"), ("tier", "1")]);
        let b = Attributes::from_pairs([("audited", "true"), ("region", "us-west")]);
        let merged = Attributes::merge([&a, &b]);
        let keys: Vec<&str> = merged.iter().map(|a| a.key.as_str()).collect();
        assert_eq!(keys, vec!["audited", "region", "tier"]);
    }

    #[test]
    fn merge_is_order_independent() {
        let a = Attributes::from_pairs([("z", "1"), ("a", "2")]);
        let b = Attributes::from_pairs([("m", "3")]);
        assert_eq!(Attributes::merge([&a, &b]), Attributes::merge([&b, &a]));
    }

    #[test]
    fn same_key_different_values_both_kept() {
        let a = Attributes::from_pairs([("region", "us-west")]);
        let b = Attributes::from_pairs([("region", "eu-central")]);
        let merged = Attributes::merge([&a, &b]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.get("region"), Some("eu-central"));
    }

    #[test]
    fn subset() {
        let req = Attributes::from_pairs([("region", "us-west")]);
        let have = Attributes::from_pairs([("region", "us-west"), ("tier", "1")]);
        assert!(req.subset_of(&have));
        assert!(!have.subset_of(&req));
        assert!(Attributes::default().subset_of(&req));
    }
}
