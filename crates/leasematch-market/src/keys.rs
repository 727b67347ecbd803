//! Store key layout for marketplace records.
//!
//! ```text
//! 0x20 | owner | dseq | gseq                          group
//! 0x21 | owner | dseq | gseq | oseq                   order
//! 0x22 | owner | dseq | gseq | oseq | provider        bid
//! 0x23 | owner | dseq | gseq | oseq | provider        lease
//! ```
//!
//! Child keys extend their parent's, so the groups of a deployment, the
//! orders of a group and the bids of an order are each one prefix scan.

use leasematch_types::{BidId, DeploymentId, GroupId, KeyBuilder, LeaseId, OrderId};

pub const GROUP_PREFIX: u8 = 0x20;
pub const ORDER_PREFIX: u8 = 0x21;
pub const BID_PREFIX: u8 = 0x22;
pub const LEASE_PREFIX: u8 = 0x23;

fn deployment(prefix: u8, id: &DeploymentId) -> KeyBuilder {
    KeyBuilder::new(prefix).str(id.owner.as_str()).u64(id.dseq)
}

fn group(prefix: u8, id: &GroupId) -> KeyBuilder {
    KeyBuilder::new(prefix)
        .str(id.owner.as_str())
        .u64(id.dseq)
        .u32(id.gseq)
}

fn order(prefix: u8, id: &OrderId) -> KeyBuilder {
    KeyBuilder::new(prefix)
        .str(id.owner.as_str())
        .u64(id.dseq)
        .u32(id.gseq)
        .u32(id.oseq)
}

#[must_use]
pub fn group_key(id: &GroupId) -> Vec<u8> {
    group(GROUP_PREFIX, id).build()
}

#[must_use]
pub fn groups_prefix(id: &DeploymentId) -> Vec<u8> {
    deployment(GROUP_PREFIX, id).build()
}

#[must_use]
pub fn order_key(id: &OrderId) -> Vec<u8> {
    order(ORDER_PREFIX, id).build()
}

#[must_use]
pub fn orders_prefix(id: &GroupId) -> Vec<u8> {
    group(ORDER_PREFIX, id).build()
}

#[must_use]
pub fn bid_key(id: &BidId) -> Vec<u8> {
    order(BID_PREFIX, &id.order()).str(id.provider.as_str()).build()
}

/// Every bid placed on `id`.
#[must_use]
pub fn bid_prefix(id: &OrderId) -> Vec<u8> {
    order(BID_PREFIX, id).build()
}

#[must_use]
pub fn lease_key(id: &LeaseId) -> Vec<u8> {
    order(LEASE_PREFIX, &id.order()).str(id.provider.as_str()).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use leasematch_types::Address;

    #[test]
    fn bid_prefix_covers_only_its_order() {
        let order1 = GroupId::new(Address::dummy("tenant"), 1, 1).order(1);
        let order2 = GroupId::new(Address::dummy("tenant"), 1, 1).order(2);
        let bid = order1.bid(Address::dummy("provider"));
        assert!(bid_key(&bid).starts_with(&bid_prefix(&order1)));
        assert!(!bid_key(&bid).starts_with(&bid_prefix(&order2)));
    }

    #[test]
    fn groups_nest_under_deployment() {
        let dep = DeploymentId::new(Address::dummy("tenant"), 7);
        assert!(group_key(&dep.group(3)).starts_with(&groups_prefix(&dep)));
        let other = DeploymentId::new(Address::dummy("tenant"), 70);
        assert!(!group_key(&other.group(3)).starts_with(&groups_prefix(&dep)));
    }

    #[test]
    fn leases_and_bids_do_not_collide() {
        let id = GroupId::new(Address::dummy("tenant"), 1, 1)
            .order(1)
            .bid(Address::dummy("provider"));
        assert_ne!(bid_key(&id), lease_key(&id));
    }
}
