use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteSource {
    Direct,
    Static,
    Protocol,
}

impl RouteSource {
    pub fn admin_distance(&self) -> u8 {
        match self {
            RouteSource::Direct => 0,
            RouteSource::Static => 1,
            RouteSource::Protocol => 110,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteEntry {
    pub destination: Ipv4Addr,
    pub mask: Ipv4Addr,
    /// `0.0.0.0` when the destination is directly connected.
    pub gateway: Ipv4Addr,
    pub interface: String,
    pub source: RouteSource,
}

impl RouteEntry {
    pub fn new(
        destination: Ipv4Addr,
        mask: Ipv4Addr,
        gateway: Ipv4Addr,
        interface: impl Into<String>,
        source: RouteSource,
    ) -> Self {
        Self {
            destination: destination & mask,
            mask,
            gateway,
            interface: interface.into(),
            source,
        }
    }

    pub fn admin_distance(&self) -> u8 {
        self.source.admin_distance()
    }

    /// Connected and static routes, the ones advertised in link-state updates
    /// and never touched by recomputation.
    pub fn is_local(&self) -> bool {
        self.admin_distance() <= 1
    }

    pub fn matches(&self, target: Ipv4Addr) -> bool {
        target & self.mask == self.destination
    }

    /// Address the packet is sent to: the gateway, or the destination itself
    /// on a connected network.
    pub fn next_hop(&self, destination: Ipv4Addr) -> Ipv4Addr {
        if self.gateway.is_unspecified() {
            destination
        } else {
            self.gateway
        }
    }

    pub fn prefix(&self) -> Option<Ipv4Net> {
        let prefix = ipnet::ipv4_mask_to_prefix(self.mask).ok()?;
        Ipv4Net::new(self.destination, prefix).ok()
    }
}

/// Routing table. Local routes come first, followed by the dynamic routes of
/// the last completed computation.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    entries: Vec<RouteEntry>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Longest-prefix match. Among matches with equal masks the entry listed
    /// first wins, so local routes take precedence over dynamic ones.
    pub fn lookup(&self, target: Ipv4Addr) -> Option<&RouteEntry> {
        let mut best: Option<&RouteEntry> = None;

        for entry in &self.entries {
            if !entry.matches(target) {
                continue;
            }
            if best.is_none_or(|best| u32::from(entry.mask) > u32::from(best.mask)) {
                best = Some(entry);
            }
        }

        best
    }

    /// Installs a connected or static route, replacing a local route for the
    /// same prefix.
    pub fn add_local(&mut self, entry: RouteEntry) {
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|e| e.is_local() && e.destination == entry.destination && e.mask == entry.mask)
        {
            *existing = entry;
            return;
        }

        let position = self
            .entries
            .iter()
            .position(|e| !e.is_local())
            .unwrap_or(self.entries.len());
        self.entries.insert(position, entry);
    }

    /// Swaps the whole dynamic route set for `routes`.
    pub fn replace_dynamic(&mut self, routes: Vec<RouteEntry>) {
        self.entries.retain(RouteEntry::is_local);
        self.entries.extend(routes.into_iter().filter(|r| !r.is_local()));
    }

    pub fn local_routes(&self) -> impl Iterator<Item = &RouteEntry> {
        self.entries.iter().filter(|e| e.is_local())
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(dest: [u8; 4], mask: [u8; 4], iface: &str, source: RouteSource) -> RouteEntry {
        RouteEntry::new(dest.into(), mask.into(), Ipv4Addr::UNSPECIFIED, iface, source)
    }

    fn iface_for(table: &RoutingTable, target: [u8; 4]) -> Option<&str> {
        table.lookup(target.into()).map(|r| r.interface.as_str())
    }

    #[test]
    fn longest_prefix_wins() {
        let mut table = RoutingTable::new();
        table.replace_dynamic(vec![
            route([10, 0, 0, 0], [255, 0, 0, 0], "A", RouteSource::Protocol),
            route([10, 1, 0, 0], [255, 255, 0, 0], "B", RouteSource::Protocol),
        ]);

        assert_eq!(iface_for(&table, [10, 1, 2, 3]), Some("B"));
        assert_eq!(iface_for(&table, [10, 2, 0, 0]), Some("A"));
        assert!(table.lookup(Ipv4Addr::new(192, 168, 0, 1)).is_none());
    }

    #[test]
    fn equal_masks_prefer_local_route() {
        let mut table = RoutingTable::new();
        table.replace_dynamic(vec![route(
            [10, 1, 0, 0],
            [255, 255, 0, 0],
            "dyn",
            RouteSource::Protocol,
        )]);
        table.add_local(route([10, 1, 0, 0], [255, 255, 0, 0], "static", RouteSource::Static));

        assert_eq!(iface_for(&table, [10, 1, 0, 9]), Some("static"));
    }

    #[test]
    fn recomputation_keeps_local_routes() {
        let mut table = RoutingTable::new();
        table.add_local(route([10, 0, 1, 0], [255, 255, 255, 0], "eth0", RouteSource::Direct));
        table.replace_dynamic(vec![route(
            [10, 0, 9, 0],
            [255, 255, 255, 0],
            "eth0",
            RouteSource::Protocol,
        )]);
        table.replace_dynamic(Vec::new());

        assert_eq!(table.len(), 1);
        assert_eq!(table.local_routes().count(), 1);
    }

    #[test]
    fn default_route_matches_everything() {
        let mut table = RoutingTable::new();
        table.add_local(RouteEntry::new(
            Ipv4Addr::UNSPECIFIED,
            Ipv4Addr::UNSPECIFIED,
            Ipv4Addr::new(10, 0, 1, 254),
            "eth0",
            RouteSource::Static,
        ));

        let route = table.lookup(Ipv4Addr::new(8, 8, 8, 8)).unwrap();
        assert_eq!(route.next_hop(Ipv4Addr::new(8, 8, 8, 8)), Ipv4Addr::new(10, 0, 1, 254));
    }
}
