use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};
use std::net::Ipv4Addr;

use crate::RouterId;
use crate::protocol::routing_table::{RouteEntry, RouteSource};
use crate::protocol::scheduler::TopologySnapshot;

#[derive(Debug, PartialEq, Eq)]
struct State {
    cost: u32,
    router: RouterId,
    // Index into the snapshot's adjacencies: the link the path leaves through.
    first_hop: usize,
}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap; ties pop the lowest router id first.
        other
            .cost
            .cmp(&self.cost)
            .then_with(|| other.router.cmp(&self.router))
            .then_with(|| other.first_hop.cmp(&self.first_hop))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Computes the dynamic routes seen from `source`.
///
/// Links cost one hop each. `source` reaches the routers of its live
/// adjacencies; two other routers are linked only when each advertises the
/// other. Every advertised subnet that is not already routed locally gets a
/// route through the first hop towards the closest router advertising it.
pub fn compute_routes(source: RouterId, snapshot: &TopologySnapshot) -> Vec<RouteEntry> {
    let links = advertised_links(source, snapshot);

    let mut distances: HashMap<RouterId, (u32, usize)> = HashMap::new();
    let mut heap = BinaryHeap::new();
    distances.insert(source, (0, usize::MAX));

    for (index, adjacency) in snapshot.adjacencies.iter().enumerate() {
        if adjacency.neighbor_id == source || distances.contains_key(&adjacency.neighbor_id) {
            continue;
        }
        distances.insert(adjacency.neighbor_id, (1, index));
        heap.push(State {
            cost: 1,
            router: adjacency.neighbor_id,
            first_hop: index,
        });
    }

    while let Some(State {
        cost,
        router,
        first_hop,
    }) = heap.pop()
    {
        // Skip if we've already found a better path
        if distances.get(&router).is_some_and(|&(best, _)| cost > best) {
            continue;
        }

        let Some(neighbors) = links.get(&router) else {
            continue;
        };
        for &neighbor in neighbors {
            if !links.get(&neighbor).is_some_and(|back| back.contains(&router)) {
                continue;
            }
            let new_cost = cost + 1;
            if distances.get(&neighbor).is_none_or(|&(best, _)| new_cost < best) {
                distances.insert(neighbor, (new_cost, first_hop));
                heap.push(State {
                    cost: new_cost,
                    router: neighbor,
                    first_hop,
                });
            }
        }
    }

    let connected: HashSet<(Ipv4Addr, Ipv4Addr)> = snapshot.connected.iter().copied().collect();
    let mut best: BTreeMap<(Ipv4Addr, Ipv4Addr), (u32, usize)> = BTreeMap::new();

    // Entries arrive in (router id, subnet, mask) order, so on equal cost the
    // first advertiser in that order is kept.
    for entry in &snapshot.entries {
        if entry.router_id == source || connected.contains(&(entry.subnet, entry.mask)) {
            continue;
        }
        let Some(&(cost, first_hop)) = distances.get(&entry.router_id) else {
            continue;
        };
        let key = (entry.subnet, entry.mask);
        if best.get(&key).is_none_or(|&(current, _)| cost < current) {
            best.insert(key, (cost, first_hop));
        }
    }

    best.into_iter()
        .filter_map(|((subnet, mask), (_, first_hop))| {
            let adjacency = snapshot.adjacencies.get(first_hop)?;
            Some(RouteEntry::new(
                subnet,
                mask,
                adjacency.neighbor_ip,
                adjacency.iface.clone(),
                RouteSource::Protocol,
            ))
        })
        .collect()
}

// Routers each router claims as neighbors, stub networks excluded.
fn advertised_links(
    source: RouterId,
    snapshot: &TopologySnapshot,
) -> HashMap<RouterId, HashSet<RouterId>> {
    let mut links: HashMap<RouterId, HashSet<RouterId>> = HashMap::new();

    for entry in &snapshot.entries {
        if entry.neighbor_id.is_unspecified() {
            continue;
        }
        links.entry(entry.router_id).or_default().insert(entry.neighbor_id);
    }

    // Our own side of each link comes from the live adjacencies.
    let own = links.entry(source).or_default();
    own.clear();
    own.extend(snapshot.adjacencies.iter().map(|adj| adj.neighbor_id));

    links
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::network::TopologyEntry;
    use crate::protocol::scheduler::LocalAdjacency;

    const MASK: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 0);
    const R1: Ipv4Addr = Ipv4Addr::new(1, 1, 1, 1);
    const R2: Ipv4Addr = Ipv4Addr::new(2, 2, 2, 2);
    const R3: Ipv4Addr = Ipv4Addr::new(3, 3, 3, 3);

    fn link(router_id: RouterId, subnet: [u8; 4], neighbor_id: RouterId) -> TopologyEntry {
        TopologyEntry {
            router_id,
            subnet: subnet.into(),
            mask: MASK,
            neighbor_id,
            next_hop: router_id,
            sequence: 1,
            last_refresh: Utc::now(),
        }
    }

    fn via_r2(subnet: [u8; 4]) -> RouteEntry {
        let gateway = Ipv4Addr::new(10, 0, 12, 2);
        RouteEntry::new(subnet.into(), MASK, gateway, "eth0", RouteSource::Protocol)
    }

    // R1 --(10.0.12.0)-- R2 --(10.0.23.0)-- R3 --(192.168.3.0 stub)
    fn chain(r3_acknowledges_r2: bool) -> TopologySnapshot {
        let mut entries = vec![
            link(R2, [10, 0, 12, 0], R1),
            link(R2, [10, 0, 23, 0], R3),
            link(R3, [192, 168, 3, 0], Ipv4Addr::UNSPECIFIED),
        ];
        let r3_peer = if r3_acknowledges_r2 { R2 } else { Ipv4Addr::UNSPECIFIED };
        entries.push(link(R3, [10, 0, 23, 0], r3_peer));
        entries.sort_by_key(TopologyEntry::key);

        TopologySnapshot {
            entries,
            adjacencies: vec![LocalAdjacency {
                iface: "eth0".to_string(),
                neighbor_id: R2,
                neighbor_ip: Ipv4Addr::new(10, 0, 12, 2),
            }],
            connected: vec![(Ipv4Addr::new(10, 0, 12, 0), MASK)],
        }
    }

    #[test]
    fn routes_through_first_hop() {
        let routes = compute_routes(R1, &chain(true));

        assert_eq!(
            routes,
            vec![via_r2([10, 0, 23, 0]), via_r2([192, 168, 3, 0])]
        );
    }

    #[test]
    fn one_sided_links_are_ignored() {
        let routes = compute_routes(R1, &chain(false));

        // 10.0.23.0 is still reachable through R2's own advertisement.
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].destination, Ipv4Addr::new(10, 0, 23, 0));
    }

    #[test]
    fn no_adjacency_no_routes() {
        let mut snapshot = chain(true);
        snapshot.adjacencies.clear();
        assert!(compute_routes(R1, &snapshot).is_empty());
    }
}
