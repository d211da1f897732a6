use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, info};
use serde::Serialize;
use tokio::sync::{RwLock, watch};

use crate::RouterId;
use crate::algorithms::dijkstra;
use crate::network::TopologyEntry;
use crate::protocol::routing_table::RoutingTable;

/// A live adjacency as seen by the route computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalAdjacency {
    pub iface: String,
    pub neighbor_id: RouterId,
    pub neighbor_ip: Ipv4Addr,
}

/// Everything the route computation reads, copied out of the router state.
#[derive(Debug, Clone, Default)]
pub struct TopologySnapshot {
    pub entries: Vec<TopologyEntry>,
    pub adjacencies: Vec<LocalAdjacency>,
    /// (destination, mask) of every connected and static route.
    pub connected: Vec<(Ipv4Addr, Ipv4Addr)>,
}

#[derive(Debug, Clone)]
struct RecomputeRequest {
    generation: u64,
    snapshot: TopologySnapshot,
}

/// Runs route computations off the packet path.
///
/// Requests are numbered. Only the newest pending request is kept, so a burst
/// of updates collapses into one computation. A single worker task computes
/// and installs routes, so at most one computation runs at a time; the swap
/// of dynamic routes happens under the routing table's write lock. The worker
/// then publishes the generation it finished.
pub struct RecomputeScheduler {
    requests: watch::Sender<Option<RecomputeRequest>>,
    completed: watch::Receiver<u64>,
    next_generation: AtomicU64,
}

impl RecomputeScheduler {
    /// Spawns the worker on the current tokio runtime.
    pub fn start(router_id: RouterId, routing_table: Arc<RwLock<RoutingTable>>) -> Self {
        let (requests, request_rx) = watch::channel(None);
        let (completed_tx, completed) = watch::channel(0);

        tokio::spawn(recompute_task(router_id, routing_table, request_rx, completed_tx));

        Self {
            requests,
            completed,
            next_generation: AtomicU64::new(0),
        }
    }

    /// Queues a computation over `snapshot` and returns its generation.
    /// Callers must take the snapshot and schedule it without releasing the
    /// locks the snapshot was read under, so generations follow state order.
    pub fn schedule(&self, snapshot: TopologySnapshot) -> u64 {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        self.requests.send_if_modified(|pending| {
            if pending.as_ref().is_some_and(|p| p.generation > generation) {
                return false;
            }
            *pending = Some(RecomputeRequest {
                generation,
                snapshot,
            });
            true
        });
        debug!("Route recomputation {} scheduled", generation);
        generation
    }

    /// Last generation handed out by [`RecomputeScheduler::schedule`].
    pub fn scheduled(&self) -> u64 {
        self.next_generation.load(Ordering::Relaxed)
    }

    /// Last generation whose routes are installed.
    pub fn completed(&self) -> u64 {
        *self.completed.borrow()
    }

    /// Waits until `generation`, or a newer one, has been installed. Returns
    /// false if the worker is gone.
    pub async fn wait_for(&self, generation: u64) -> bool {
        let mut completed = self.completed.clone();
        completed.wait_for(|&done| done >= generation).await.is_ok()
    }
}

async fn recompute_task(
    router_id: RouterId,
    routing_table: Arc<RwLock<RoutingTable>>,
    mut requests: watch::Receiver<Option<RecomputeRequest>>,
    completed: watch::Sender<u64>,
) {
    while requests.changed().await.is_ok() {
        let Some(request) = requests.borrow_and_update().clone() else {
            continue;
        };

        let routes = dijkstra::compute_routes(router_id, &request.snapshot);
        let count = routes.len();
        routing_table.write().await.replace_dynamic(routes);
        completed.send_replace(request.generation);

        info!(
            "Routing table recomputed (generation {}, {} dynamic routes)",
            request.generation, count
        );
    }

    debug!("Recompute worker stopped");
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::protocol::routing_table::{RouteEntry, RouteSource};

    fn snapshot() -> TopologySnapshot {
        let neighbor = Ipv4Addr::new(2, 2, 2, 2);
        TopologySnapshot {
            entries: vec![TopologyEntry {
                router_id: neighbor,
                subnet: Ipv4Addr::new(10, 0, 9, 0),
                mask: Ipv4Addr::new(255, 255, 255, 0),
                neighbor_id: Ipv4Addr::UNSPECIFIED,
                next_hop: Ipv4Addr::new(10, 0, 1, 2),
                sequence: 1,
                last_refresh: Utc::now(),
            }],
            adjacencies: vec![LocalAdjacency {
                iface: "eth0".into(),
                neighbor_id: neighbor,
                neighbor_ip: Ipv4Addr::new(10, 0, 1, 2),
            }],
            connected: Vec::new(),
        }
    }

    #[tokio::test]
    async fn completed_generation_installs_routes() {
        let table = Arc::new(RwLock::new(RoutingTable::new()));
        table.write().await.add_local(RouteEntry::new(
            Ipv4Addr::new(10, 0, 1, 0),
            Ipv4Addr::new(255, 255, 255, 0),
            Ipv4Addr::UNSPECIFIED,
            "eth0",
            RouteSource::Direct,
        ));
        let scheduler = RecomputeScheduler::start(Ipv4Addr::new(1, 1, 1, 1), table.clone());

        let generation = scheduler.schedule(snapshot());
        assert!(scheduler.wait_for(generation).await);

        let table = table.read().await;
        assert_eq!(table.len(), 2);
        let route = table.lookup(Ipv4Addr::new(10, 0, 9, 7)).unwrap();
        assert_eq!(route.gateway, Ipv4Addr::new(10, 0, 1, 2));
        assert_eq!(route.source, RouteSource::Protocol);
    }

    #[tokio::test]
    async fn burst_settles_on_newest_snapshot() {
        let table = Arc::new(RwLock::new(RoutingTable::new()));
        let scheduler = RecomputeScheduler::start(Ipv4Addr::new(1, 1, 1, 1), table.clone());

        scheduler.schedule(snapshot());
        let last = scheduler.schedule(TopologySnapshot::default());
        assert_eq!(scheduler.scheduled(), last);
        assert!(scheduler.wait_for(last).await);

        assert!(scheduler.completed() >= last);
        assert!(table.read().await.is_empty());
    }
}
