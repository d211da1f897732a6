use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::RouterId;

/// One advertised link, as last heard from its advertising router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopologyEntry {
    pub router_id: RouterId,
    pub subnet: Ipv4Addr,
    pub mask: Ipv4Addr,
    /// Router at the far end of the link, `0.0.0.0` for a stub network.
    pub neighbor_id: RouterId,
    /// Address the advertising router was reached through.
    pub next_hop: Ipv4Addr,
    pub sequence: u16,
    pub last_refresh: DateTime<Utc>,
}

impl TopologyEntry {
    pub fn key(&self) -> TopologyKey {
        (self.router_id, self.subnet, self.mask)
    }
}

pub type TopologyKey = (RouterId, Ipv4Addr, Ipv4Addr);

/// Link-state database.
///
/// Entries are keyed by (advertising router, subnet, mask) and kept in key
/// order, which gives the route computation a deterministic iteration order.
/// The last accepted sequence number of every advertising router is tracked
/// separately so that a router whose links all aged out can start over.
#[derive(Debug, Default)]
pub struct TopologyDb {
    entries: BTreeMap<TopologyKey, TopologyEntry>,
    sequences: HashMap<RouterId, u16>,
}

impl TopologyDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an update numbered `sequence` from `router_id` is strictly
    /// newer than the last one accepted. Unknown routers are always fresh.
    ///
    /// Sequence numbers compare in serial-number arithmetic (RFC 1982), so
    /// an advertiser wrapping from 65535 to 0 keeps being accepted. A
    /// number exactly half the space away is never newer.
    pub fn is_fresh(&self, router_id: RouterId, sequence: u16) -> bool {
        self.sequences
            .get(&router_id)
            .is_none_or(|&last| (sequence.wrapping_sub(last) as i16) > 0)
    }

    pub fn last_sequence(&self, router_id: RouterId) -> Option<u16> {
        self.sequences.get(&router_id).copied()
    }

    /// Records `sequence` as the last accepted update from `router_id`.
    pub fn accept(&mut self, router_id: RouterId, sequence: u16) {
        self.sequences.insert(router_id, sequence);
    }

    /// Inserts or refreshes a link entry.
    pub fn upsert(&mut self, entry: TopologyEntry) {
        self.entries.insert(entry.key(), entry);
    }

    /// Removes every entry not refreshed within `timeout` and returns how many
    /// were dropped.
    pub fn expire(&mut self, now: DateTime<Utc>, timeout: Duration) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.signed_duration_since(entry.last_refresh) <= timeout);
        let removed = before - self.entries.len();

        if removed > 0 {
            let entries = &self.entries;
            self.sequences
                .retain(|router_id, _| entries.keys().any(|(id, _, _)| id == router_id));
        }

        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = &TopologyEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Owned copy of every entry, in key order.
    pub fn snapshot(&self) -> Vec<TopologyEntry> {
        self.entries.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(router: u8, subnet: u8, sequence: u16, at: DateTime<Utc>) -> TopologyEntry {
        TopologyEntry {
            router_id: Ipv4Addr::new(10, 0, 0, router),
            subnet: Ipv4Addr::new(192, 168, subnet, 0),
            mask: Ipv4Addr::new(255, 255, 255, 0),
            neighbor_id: Ipv4Addr::UNSPECIFIED,
            next_hop: Ipv4Addr::new(10, 0, 0, router),
            sequence,
            last_refresh: at,
        }
    }

    #[test]
    fn freshness_is_strict() {
        let mut db = TopologyDb::new();
        let rid = Ipv4Addr::new(10, 0, 0, 1);

        assert!(db.is_fresh(rid, 0));
        db.accept(rid, 7);
        assert!(!db.is_fresh(rid, 6));
        assert!(!db.is_fresh(rid, 7));
        assert!(db.is_fresh(rid, 8));
    }

    #[test]
    fn freshness_survives_sequence_wrap() {
        let mut db = TopologyDb::new();
        let rid = Ipv4Addr::new(10, 0, 0, 1);

        db.accept(rid, u16::MAX);
        assert!(db.is_fresh(rid, 0));
        assert!(db.is_fresh(rid, 10));
        assert!(!db.is_fresh(rid, u16::MAX - 1));

        db.accept(rid, 0);
        assert!(!db.is_fresh(rid, u16::MAX));
        assert!(!db.is_fresh(rid, 0x8000));
    }

    #[test]
    fn upsert_refreshes_in_place() {
        let now = Utc::now();
        let mut db = TopologyDb::new();
        db.upsert(entry(1, 1, 1, now));
        db.upsert(entry(1, 1, 2, now));

        assert_eq!(db.len(), 1);
        assert_eq!(db.iter().next().map(|e| e.sequence), Some(2));
    }

    #[test]
    fn expire_drops_stale_links_and_forgets_silent_routers() {
        let now = Utc::now();
        let mut db = TopologyDb::new();
        db.upsert(entry(1, 1, 3, now - Duration::seconds(60)));
        db.upsert(entry(2, 2, 9, now));
        db.accept(Ipv4Addr::new(10, 0, 0, 1), 3);
        db.accept(Ipv4Addr::new(10, 0, 0, 2), 9);

        assert_eq!(db.expire(now, Duration::seconds(35)), 1);
        assert_eq!(db.len(), 1);
        assert_eq!(db.last_sequence(Ipv4Addr::new(10, 0, 0, 1)), None);
        assert_eq!(db.last_sequence(Ipv4Addr::new(10, 0, 0, 2)), Some(9));
        assert_eq!(db.expire(now, Duration::seconds(35)), 0);
    }
}
