//! Network-layer routing.
//!
//! The route table is keyed by `(network, mask)` with a side map counting how
//! many entries exist per mask. Lookup scans the masks most specific first
//! and returns the first table hit, so a /32 host route always beats a /8
//! aggregate and the default route `0.0.0.0/0` matches last.

use crate::acl::Acl;
use crate::address::{Cidr, Ipv4Address, Ipv4Mask};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One route: where traffic for a destination network goes next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    /// The address of the next router toward the destination, or
    /// [`Ipv4Address::UNSPECIFIED`] for a directly connected network.
    pub next_hop: Ipv4Address,
    /// Lower is preferred when the same prefix is offered twice.
    pub metric: u32,
}

impl RouteEntry {
    /// A route for a directly connected network: traffic is delivered to the
    /// destination itself rather than to another router.
    pub fn connected() -> Self {
        Self {
            next_hop: Ipv4Address::UNSPECIFIED,
            metric: 0,
        }
    }

    pub fn via(next_hop: Ipv4Address, metric: u32) -> Self {
        Self { next_hop, metric }
    }

    pub fn is_connected(&self) -> bool {
        self.next_hop == Ipv4Address::UNSPECIFIED
    }
}

/// A longest-prefix-match route table.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    table: BTreeMap<(Ipv4Address, Ipv4Mask), RouteEntry>,
    masks: BTreeMap<Ipv4Mask, u32>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a route. When the exact prefix is already present, the entry
    /// with the lower metric wins; the loser is discarded.
    pub fn add(&mut self, destination: Cidr, entry: RouteEntry) {
        let key = (destination.network(), destination.mask());
        match self.table.get(&key) {
            Some(existing) if existing.metric <= entry.metric => return,
            Some(_) => {
                self.table.insert(key, entry);
            }
            None => {
                self.table.insert(key, entry);
                *self.masks.entry(destination.mask()).or_insert(0) += 1;
            }
        }
    }

    /// Removes the route for an exact prefix, if present.
    pub fn remove(&mut self, destination: Cidr) -> Option<RouteEntry> {
        let key = (destination.network(), destination.mask());
        let removed = self.table.remove(&key)?;
        if let Some(count) = self.masks.get_mut(&destination.mask()) {
            *count -= 1;
            if *count == 0 {
                self.masks.remove(&destination.mask());
            }
        }
        Some(removed)
    }

    /// The longest matching prefix for an address, or `None` when the
    /// destination is unreachable.
    pub fn lookup(&self, address: Ipv4Address) -> Option<(Cidr, RouteEntry)> {
        for mask in self.masks.keys().rev() {
            let network = mask.mask(address);
            if let Some(entry) = self.table.get(&(network, *mask)) {
                return Some((Cidr::new(network, *mask), *entry));
            }
        }
        None
    }

    /// All routes in prefix order, for snapshots.
    pub fn iter(&self) -> impl Iterator<Item = (Cidr, RouteEntry)> + '_ {
        self.table
            .iter()
            .map(|((network, mask), entry)| (Cidr::new(*network, *mask), *entry))
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// The routing state of a router node: its table and its one ACL.
///
/// The forwarding algorithm itself runs in the engine, which owns the graph
/// the router forwards into; this struct holds only the router's own state.
#[derive(Debug)]
pub struct Router {
    pub table: RouteTable,
    pub acl: Acl,
}

impl Router {
    pub fn new(acl: Acl) -> Self {
        Self {
            table: RouteTable::new(),
            acl,
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new(Acl::default_permit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cidr(text: &str) -> Cidr {
        text.parse().unwrap()
    }

    fn addr(text: &str) -> Ipv4Address {
        text.parse().unwrap()
    }

    #[test]
    fn longest_prefix_wins() {
        let mut table = RouteTable::new();
        table.add(cidr("10.0.0.0/8"), RouteEntry::via(addr("192.168.1.1"), 1));
        table.add(cidr("10.1.0.0/16"), RouteEntry::via(addr("192.168.1.2"), 1));
        let (prefix, entry) = table.lookup(addr("10.1.2.3")).unwrap();
        assert_eq!(prefix, cidr("10.1.0.0/16"));
        assert_eq!(entry.next_hop, addr("192.168.1.2"));
        let (prefix, _) = table.lookup(addr("10.2.0.1")).unwrap();
        assert_eq!(prefix, cidr("10.0.0.0/8"));
    }

    #[test]
    fn lower_metric_wins_ties() {
        let mut table = RouteTable::new();
        table.add(cidr("10.0.0.0/8"), RouteEntry::via(addr("192.168.1.1"), 10));
        table.add(cidr("10.0.0.0/8"), RouteEntry::via(addr("192.168.1.2"), 1));
        let (_, entry) = table.lookup(addr("10.0.0.1")).unwrap();
        assert_eq!(entry.next_hop, addr("192.168.1.2"));
        // A worse metric later does not displace the winner.
        table.add(cidr("10.0.0.0/8"), RouteEntry::via(addr("192.168.1.3"), 5));
        let (_, entry) = table.lookup(addr("10.0.0.1")).unwrap();
        assert_eq!(entry.next_hop, addr("192.168.1.2"));
    }

    #[test]
    fn default_route_matches_last() {
        let mut table = RouteTable::new();
        table.add(cidr("0.0.0.0/0"), RouteEntry::via(addr("192.168.1.254"), 1));
        table.add(cidr("172.16.0.0/12"), RouteEntry::connected());
        let (_, entry) = table.lookup(addr("172.16.5.5")).unwrap();
        assert!(entry.is_connected());
        let (_, entry) = table.lookup(addr("8.8.8.8")).unwrap();
        assert_eq!(entry.next_hop, addr("192.168.1.254"));
    }

    #[test]
    fn no_match_is_unreachable() {
        let mut table = RouteTable::new();
        table.add(cidr("10.0.0.0/8"), RouteEntry::connected());
        assert!(table.lookup(addr("11.0.0.1")).is_none());
    }

    #[test]
    fn remove_clears_mask_bookkeeping() {
        let mut table = RouteTable::new();
        table.add(cidr("10.0.0.0/8"), RouteEntry::connected());
        assert!(table.remove(cidr("10.0.0.0/8")).is_some());
        assert!(table.lookup(addr("10.0.0.1")).is_none());
        assert!(table.remove(cidr("10.0.0.0/8")).is_none());
    }
}
