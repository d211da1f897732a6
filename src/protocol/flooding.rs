use std::net::Ipv4Addr;
use std::sync::atomic::Ordering;

use chrono::Utc;
use log::{debug, info};
use pnet::util::MacAddr;

use crate::network::frame::{self, Ipv4Header, OSPF_PROTOCOL};
use crate::network::{Adjacency, Interface, TopologyEntry};
use crate::protocol::packet::{Lsa, LsUpdate, Packet};
use crate::router::{Router, build_snapshot};

impl Router {
    /// One advertisement per connected or static route, naming the neighbor
    /// on the route's interface when there is one.
    async fn local_lsas(&self) -> Vec<Lsa> {
        let interfaces = self.interfaces.read().await;
        let routing_table = self.routing_table.read().await;

        routing_table
            .local_routes()
            .map(|route| Lsa {
                subnet: route.destination,
                mask: route.mask,
                router_id: interfaces
                    .get(&route.interface)
                    .and_then(|iface| iface.adjacency)
                    .map_or(Ipv4Addr::UNSPECIFIED, |adj| adj.neighbor_id),
            })
            .collect()
    }

    /// Sends a link-state update on `iface` with the current sequence
    /// number. Nothing is sent if the interface has no adjacency.
    pub async fn originate(&self, iface: &str) {
        let Some((interface, adjacency)) = self
            .interfaces
            .read()
            .await
            .get(iface)
            .and_then(|i| i.adjacency.map(|adj| (i.clone(), adj)))
        else {
            return;
        };

        let update = LsUpdate::new(
            self.router_id,
            self.sequence.load(Ordering::Relaxed),
            self.timers.lsu_ttl,
            self.local_lsas().await,
        );
        let payload = Packet::LsUpdate(update).encode();
        self.send_update(&payload, &interface, adjacency).await;
    }

    /// Sends the same link-state update, stamped with the current sequence
    /// number, on every adjacent interface. Callers hold the send lock.
    pub async fn originate_all(&self) {
        let targets: Vec<(Interface, Adjacency)> = self
            .interfaces
            .read()
            .await
            .adjacent()
            .map(|(iface, adj)| (iface.clone(), adj))
            .collect();
        if targets.is_empty() {
            return;
        }

        let update = LsUpdate::new(
            self.router_id,
            self.sequence.load(Ordering::Relaxed),
            self.timers.lsu_ttl,
            self.local_lsas().await,
        );
        debug!(
            "Originating LSU seq {} with {} advertisements on {} interfaces",
            update.sequence,
            update.lsas.len(),
            targets.len()
        );
        let payload = Packet::LsUpdate(update).encode();
        for (iface, adjacency) in &targets {
            self.send_update(&payload, iface, *adjacency).await;
        }
    }

    /// Periodic origination: every adjacent interface gets the same sequence
    /// number, then the counter advances once.
    pub async fn lsu_round(&self) {
        let _send = self.send_lock.lock().await;
        self.originate_all().await;
        self.sequence.fetch_add(1, Ordering::Relaxed);
    }

    /// Processes a link-state update received on `iface` from `source`.
    ///
    /// Self-originated and stale updates are dropped. Accepted ones refresh
    /// the topology, trigger a route computation and, while the hop budget
    /// lasts, are relayed on every other adjacent interface.
    pub async fn on_update(&self, source: Ipv4Addr, update: LsUpdate, iface: &str) {
        let advertiser = update.hdr.router_id;
        if advertiser == self.router_id {
            debug!("Dropping own LSU relayed back on {}", iface);
            return;
        }

        {
            let interfaces = self.interfaces.read().await;
            let mut topology = self.topology.lock().await;
            if !topology.is_fresh(advertiser, update.sequence) {
                debug!(
                    "Dropping LSU from {} seq {}: last accepted {:?}",
                    advertiser,
                    update.sequence,
                    topology.last_sequence(advertiser)
                );
                return;
            }

            let now = Utc::now();
            topology.accept(advertiser, update.sequence);
            for lsa in &update.lsas {
                topology.upsert(TopologyEntry {
                    router_id: advertiser,
                    subnet: lsa.subnet,
                    mask: lsa.mask,
                    neighbor_id: lsa.router_id,
                    next_hop: source,
                    sequence: update.sequence,
                    last_refresh: now,
                });
            }
            info!(
                "Accepted LSU from {} seq {} ({} advertisements)",
                advertiser,
                update.sequence,
                update.lsas.len()
            );

            let routing_table = self.routing_table.read().await;
            self.scheduler
                .schedule(build_snapshot(&interfaces, &topology, &routing_table));
        }

        let ttl = update.ttl.saturating_sub(1);
        if ttl == 0 {
            debug!("LSU from {} seq {} absorbed", advertiser, update.sequence);
            return;
        }

        let targets: Vec<(Interface, Adjacency)> = self
            .interfaces
            .read()
            .await
            .adjacent()
            .filter(|(i, _)| i.name != iface)
            .map(|(i, adj)| (i.clone(), adj))
            .collect();

        let sequence = update.sequence;
        let payload = Packet::LsUpdate(LsUpdate { ttl, ..update }).encode();
        for (interface, adjacency) in &targets {
            debug!(
                "Relaying LSU from {} seq {} to {} on {}",
                advertiser, sequence, adjacency.neighbor_id, interface.name
            );
            self.send_update(&payload, interface, *adjacency).await;
        }
    }

    async fn send_update(&self, payload: &[u8], iface: &Interface, adjacency: Adjacency) {
        let mut header = Ipv4Header::new(iface.ip, adjacency.neighbor_ip, OSPF_PROTOCOL);
        header.dont_fragment = true;

        let frame = frame::build_ipv4_frame(iface.mac, MacAddr::zero(), &header, payload);
        self.dispatch(frame, adjacency.neighbor_ip, iface).await;
    }
}
