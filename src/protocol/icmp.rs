use std::net::Ipv4Addr;

use log::debug;
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::util::MacAddr;

use crate::network::frame::{self, Ipv4Header};
use crate::router::Router;

/// ICMP messages this router generates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcmpError {
    NetUnreachable,
    HostUnreachable,
    PortUnreachable,
    TimeExceeded,
}

impl IcmpError {
    pub fn type_code(self) -> (u8, u8) {
        match self {
            IcmpError::NetUnreachable => (3, 0),
            IcmpError::HostUnreachable => (3, 1),
            IcmpError::PortUnreachable => (3, 3),
            IcmpError::TimeExceeded => (11, 0),
        }
    }
}

impl Router {
    /// Sends an ICMP error of `icmp_type`/`code` to `destination`, quoting
    /// the start of `original`, an IP datagram without link header.
    ///
    /// The message leaves through the route towards `destination` with the
    /// outgoing interface as source. Without such a route it is dropped.
    pub async fn send_icmp_error(
        &self,
        icmp_type: u8,
        code: u8,
        destination: Ipv4Addr,
        original: &[u8],
    ) {
        let Some(route) = self.routing_table.read().await.lookup(destination).cloned() else {
            debug!("No route to {}, ICMP {}/{} abandoned", destination, icmp_type, code);
            return;
        };
        let Some(out) = self.interfaces.read().await.get(&route.interface).cloned() else {
            return;
        };

        let mut header = Ipv4Header::new(out.ip, destination, IpNextHeaderProtocols::Icmp);
        if let Some(ip) = Ipv4Packet::new(original) {
            header.dscp = ip.get_dscp();
            header.ecn = ip.get_ecn();
            header.identification = ip.get_identification();
        }

        let payload = frame::build_icmp_error(icmp_type, code, original);
        let frame = frame::build_ipv4_frame(out.mac, MacAddr::zero(), &header, &payload);

        debug!("ICMP {}/{} to {} via {}", icmp_type, code, destination, out.name);
        self.dispatch(frame, route.next_hop(destination), &out).await;
    }

    pub async fn send_icmp(&self, error: IcmpError, destination: Ipv4Addr, original: &[u8]) {
        let (icmp_type, code) = error.type_code();
        self.send_icmp_error(icmp_type, code, destination, original).await;
    }
}
