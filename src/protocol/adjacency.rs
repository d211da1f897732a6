use std::net::Ipv4Addr;
use std::sync::atomic::Ordering;

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};

use crate::network::Adjacency;
use crate::network::frame::{self, ALL_SPF_ROUTERS, ALL_SPF_ROUTERS_MAC, Ipv4Header, OSPF_PROTOCOL};
use crate::protocol::packet::{Hello, Packet};
use crate::router::{Router, build_snapshot};

impl Router {
    /// Processes a HELLO received on `iface` from `source`.
    ///
    /// The first HELLO from an unknown router brings the adjacency up, which
    /// floods a link-state update on every adjacent interface and advances
    /// the sequence number once.
    pub async fn on_hello(&self, source: Ipv4Addr, hello: &Hello, iface: &str) {
        let neighbor_id = hello.hdr.router_id;
        if neighbor_id == self.router_id {
            return;
        }

        let is_new = {
            let mut interfaces = self.interfaces.write().await;
            let Some(interface) = interfaces.get_mut(iface) else {
                return;
            };

            if hello.network_mask != interface.mask {
                debug!(
                    "HELLO from {} on {} dropped: mask {} does not match {}",
                    neighbor_id, iface, hello.network_mask, interface.mask
                );
                return;
            }
            if hello.hello_interval != self.timers.hello_interval {
                debug!(
                    "HELLO from {} on {} dropped: interval {} does not match {}",
                    neighbor_id, iface, hello.hello_interval, self.timers.hello_interval
                );
                return;
            }

            interface.mask = hello.network_mask;
            interface.adjacency = Some(Adjacency {
                neighbor_id,
                neighbor_ip: source,
            });

            self.neighbors.lock().await.refresh(neighbor_id, Utc::now())
        };

        if !is_new {
            return;
        }

        info!("New neighbor {} ({}) on {}", neighbor_id, source, iface);
        {
            let _send = self.send_lock.lock().await;
            self.originate_all().await;
            self.sequence.fetch_add(1, Ordering::Relaxed);
        }
        self.schedule_recompute().await;
    }

    /// Counts down every interface's HELLO timer and sends a HELLO on those
    /// that reach zero.
    pub async fn hello_sweep(&self) {
        let _send = self.send_lock.lock().await;

        let due: Vec<_> = {
            let mut interfaces = self.interfaces.write().await;
            interfaces
                .iter_mut()
                .filter_map(|iface| {
                    iface.hello_countdown = iface.hello_countdown.saturating_sub(1);
                    if iface.hello_countdown > 0 {
                        return None;
                    }
                    iface.hello_countdown = self.timers.hello_interval;
                    Some(iface.clone())
                })
                .collect()
        };

        for iface in due {
            let hello = Hello::new(self.router_id, iface.mask, self.timers.hello_interval);
            let packet = Packet::Hello(hello);
            let frame = frame::build_ipv4_frame(
                iface.mac,
                ALL_SPF_ROUTERS_MAC,
                &Ipv4Header::new(iface.ip, ALL_SPF_ROUTERS, OSPF_PROTOCOL),
                &packet.encode(),
            );
            debug!("Sending HELLO on {}", iface.name);
            self.transmit.send(&iface.name, frame);
        }
    }

    /// Drops neighbors silent for longer than the neighbor timeout along
    /// with the adjacencies pointing at them.
    pub async fn liveness_sweep(&self, now: DateTime<Utc>) {
        let dead_interval = Duration::seconds(self.timers.neighbor_timeout as i64);

        let mut interfaces = self.interfaces.write().await;
        let dead = self.neighbors.lock().await.expire(now, dead_interval);
        if dead.is_empty() {
            return;
        }

        for neighbor_id in &dead {
            let cleared = interfaces.clear_adjacency(*neighbor_id);
            if cleared.is_empty() {
                warn!("Neighbor {} expired but no interface referenced it", neighbor_id);
            } else {
                info!("Neighbor {} down on {}", neighbor_id, cleared.join(", "));
            }
        }

        let topology = self.topology.lock().await;
        let routing_table = self.routing_table.read().await;
        self.scheduler
            .schedule(build_snapshot(&interfaces, &topology, &routing_table));
    }
}
