use log::debug;
use pnet::packet::MutablePacket;
use pnet::packet::Packet as _;
use pnet::packet::ethernet::MutableEthernetPacket;
use pnet::packet::icmp::{self, IcmpCode, IcmpPacket, IcmpTypes, MutableIcmpPacket};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::{self, Ipv4Packet, MutableIpv4Packet};

use crate::network::frame::{self, DEFAULT_TTL, ETHERNET_HEADER_LEN};
use crate::protocol::icmp::IcmpError;
use crate::router::Router;

impl Router {
    /// Decides the fate of an IPv4 frame received on `iface`: answered
    /// locally, forwarded towards its destination, or refused with an ICMP
    /// error to its source.
    pub async fn forward(&self, received: &[u8], iface: &str) {
        let Some(original) = frame::ipv4_bytes(received) else {
            return;
        };
        let Some(ip) = Ipv4Packet::new(original) else {
            return;
        };
        let source = ip.get_source();
        let destination = ip.get_destination();

        if self.interfaces.read().await.is_local(destination) {
            if ip.get_next_level_protocol() != IpNextHeaderProtocols::Icmp {
                debug!(
                    "{:?} datagram from {} for us, port unreachable",
                    ip.get_next_level_protocol(),
                    source
                );
                self.send_icmp(IcmpError::PortUnreachable, source, original).await;
                return;
            }
            let is_echo = IcmpPacket::new(ip.payload())
                .is_some_and(|icmp| icmp.get_icmp_type() == IcmpTypes::EchoRequest);
            if is_echo {
                self.echo_reply(received, iface);
            } else {
                debug!("Ignoring ICMP from {} for {}", source, destination);
            }
            return;
        }

        let ttl = ip.get_ttl().saturating_sub(1);

        let Some(route) = self.routing_table.read().await.lookup(destination).cloned() else {
            debug!("No route to {}, net unreachable to {}", destination, source);
            self.send_icmp(IcmpError::NetUnreachable, source, original).await;
            return;
        };

        if ttl < 1 {
            debug!("TTL expired for {} -> {}", source, destination);
            self.send_icmp(IcmpError::TimeExceeded, source, original).await;
            return;
        }

        let Some(out) = self.interfaces.read().await.get(&route.interface).cloned() else {
            return;
        };

        let mut frame = received[..ETHERNET_HEADER_LEN + original.len()].to_vec();
        if let Some(mut ip) = MutableIpv4Packet::new(&mut frame[ETHERNET_HEADER_LEN..]) {
            ip.set_ttl(ttl);
        }
        frame::refresh_ipv4_checksum(&mut frame);

        self.dispatch(frame, route.next_hop(destination), &out).await;
    }

    // Turns an echo request around in place and sends it back out of the
    // interface it came in on.
    fn echo_reply(&self, received: &[u8], iface: &str) {
        let Some(original) = frame::ipv4_bytes(received) else {
            return;
        };
        let mut reply = received[..ETHERNET_HEADER_LEN + original.len()].to_vec();

        if let Some(mut eth) = MutableEthernetPacket::new(&mut reply) {
            let source = eth.get_source();
            eth.set_source(eth.get_destination());
            eth.set_destination(source);
        }

        let Some(mut ip) = MutableIpv4Packet::new(&mut reply[ETHERNET_HEADER_LEN..]) else {
            return;
        };
        let source = ip.get_source();
        ip.set_source(ip.get_destination());
        ip.set_destination(source);
        ip.set_ttl(DEFAULT_TTL);

        if let Some(mut echo) = MutableIcmpPacket::new(ip.payload_mut()) {
            echo.set_icmp_type(IcmpTypes::EchoReply);
            echo.set_icmp_code(IcmpCode::new(0));
            let checksum = icmp::checksum(&echo.to_immutable());
            echo.set_checksum(checksum);
        }

        let checksum = ipv4::checksum(&ip.to_immutable());
        ip.set_checksum(checksum);

        debug!("Echo reply to {} on {}", source, iface);
        self.transmit.send(iface, reply);
    }
}
