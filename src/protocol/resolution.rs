use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use pnet::packet::arp::ArpOperations;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::util::MacAddr;

use crate::network::Interface;
use crate::network::arp::{PendingRequest, RequestAction};
use crate::network::frame;
use crate::protocol::icmp::IcmpError;
use crate::router::Router;

impl Router {
    /// Sends `frame` to `next_hop` out of `iface`, resolving the link
    /// address first. On a miss the frame is queued and an ARP request goes
    /// out unless one was sent within the last second. Callers hold no
    /// router lock other than the send lock.
    pub async fn dispatch(&self, mut frame: Vec<u8>, next_hop: Ipv4Addr, iface: &Interface) {
        let now = Utc::now();
        let action = {
            let mut arp = self.arp.lock().await;
            match arp.lookup(next_hop, now) {
                Some(mac) => {
                    drop(arp);
                    frame::set_link_addrs(&mut frame, iface.mac, mac);
                    self.transmit.send(&iface.name, frame);
                    return;
                }
                None => {
                    if !arp.queue(next_hop, frame, &iface.name) {
                        warn!("Pending queue for {} full, dropping frame", next_hop);
                        return;
                    }
                    arp.poll_request(next_hop, now)
                }
            }
        };

        if let RequestAction::Send { iface } = action {
            self.send_arp_request(next_hop, &iface).await;
        }
    }

    async fn send_arp_request(&self, target: Ipv4Addr, iface: &str) {
        let Some(interface) = self.interfaces.read().await.get(iface).cloned() else {
            return;
        };
        debug!("ARP request for {} on {}", target, iface);
        self.transmit.send(
            iface,
            frame::build_arp_request(interface.mac, interface.ip, target),
        );
    }

    /// Handles an ARP frame received on `iface`. Requests for one of our
    /// addresses are answered; requests and replies addressed to us record
    /// the sender and release frames waiting on it.
    pub async fn handle_arp(&self, frame: &[u8], iface: &str) {
        let Some(arp) = frame::arp_view(frame) else {
            return;
        };
        let Some(interface) = self.interfaces.read().await.get(iface).cloned() else {
            return;
        };
        if arp.get_target_proto_addr() != interface.ip {
            return;
        }

        let sender_ip = arp.get_sender_proto_addr();
        let sender_mac = arp.get_sender_hw_addr();
        let operation = arp.get_operation();

        let released = self.arp.lock().await.insert(sender_ip, sender_mac, Utc::now());

        if operation == ArpOperations::Request {
            debug!("ARP request from {} on {}", sender_ip, iface);
            self.transmit.send(
                iface,
                frame::build_arp_reply(interface.mac, interface.ip, sender_mac, sender_ip),
            );
        } else if operation == ArpOperations::Reply {
            debug!("ARP reply: {} is at {}", sender_ip, sender_mac);
        }

        if let Some(request) = released {
            self.flush_pending(request, sender_mac).await;
        }
    }

    async fn flush_pending(&self, request: PendingRequest, mac: MacAddr) {
        let interfaces = self.interfaces.read().await.clone();
        let count = request.frames.len();

        for mut pending in request.frames {
            let Some(out) = interfaces.get(&pending.iface) else {
                continue;
            };
            frame::set_link_addrs(&mut pending.frame, out.mac, mac);
            self.transmit.send(&pending.iface, pending.frame);
        }

        if count > 0 {
            info!("Released {} frames waiting on {}", count, request.ip);
        }
    }

    /// Periodic ARP duty: evicts stale entries, retries unresolved
    /// addresses and gives up on those out of attempts, reporting each of
    /// their frames to its sender as host unreachable.
    pub async fn arp_sweep(&self, now: DateTime<Utc>) {
        let sweep = self.arp.lock().await.sweep(now);

        if sweep.evicted > 0 {
            debug!("{} ARP entries expired", sweep.evicted);
        }

        for (target, iface) in &sweep.resend {
            self.send_arp_request(*target, iface).await;
        }

        for request in sweep.abandoned {
            warn!(
                "No ARP reply from {} after {} requests, dropping {} frames",
                request.ip,
                request.times_sent,
                request.frames.len()
            );
            for pending in &request.frames {
                let Some(original) = frame::ipv4_bytes(&pending.frame) else {
                    continue;
                };
                let Some(source) = Ipv4Packet::new(original).map(|ip| ip.get_source()) else {
                    continue;
                };
                // Our own traffic has nobody to report to.
                if self.interfaces.read().await.is_local(source) {
                    continue;
                }
                self.send_icmp(IcmpError::HostUnreachable, source, original).await;
            }
        }
    }
}
