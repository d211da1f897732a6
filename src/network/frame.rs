//! Ethernet, IPv4, ARP and ICMP framing helpers built on `pnet` packet views.

use std::net::Ipv4Addr;

use pnet::packet::arp::{ArpHardwareTypes, ArpOperations, ArpPacket, MutableArpPacket};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket, MutableEthernetPacket};
use pnet::packet::icmp::{self, IcmpPacket};
use pnet::packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};
use pnet::packet::ipv4::{self, Ipv4Flags, Ipv4Packet, MutableIpv4Packet};
use pnet::packet::util;
use pnet::util::MacAddr;

pub const ETHERNET_HEADER_LEN: usize = 14;
pub const IPV4_HEADER_LEN: usize = 20;
pub const ARP_PACKET_LEN: usize = 28;
pub const ICMP_HEADER_LEN: usize = 8;
/// Bytes of the offending datagram quoted in an ICMP error: its IP header
/// plus the first 8 bytes of payload.
pub const ICMP_DATA_LEN: usize = IPV4_HEADER_LEN + 8;
/// TTL stamped on every datagram this router originates.
pub const DEFAULT_TTL: u8 = 64;

pub const OSPF_PROTOCOL: IpNextHeaderProtocol = IpNextHeaderProtocol(89);
/// AllSPFRouters.
pub const ALL_SPF_ROUTERS: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 5);
/// Link-layer group address mapped from 224.0.0.5.
pub const ALL_SPF_ROUTERS_MAC: MacAddr = MacAddr(0x01, 0x00, 0x5e, 0x00, 0x00, 0x05);

/// Header fields of an IPv4 datagram originated by the router.
#[derive(Debug, Clone, Copy)]
pub struct Ipv4Header {
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub protocol: IpNextHeaderProtocol,
    pub ttl: u8,
    pub dscp: u8,
    pub ecn: u8,
    pub identification: u16,
    pub dont_fragment: bool,
}

impl Ipv4Header {
    pub fn new(source: Ipv4Addr, destination: Ipv4Addr, protocol: IpNextHeaderProtocol) -> Self {
        Self {
            source,
            destination,
            protocol,
            ttl: DEFAULT_TTL,
            dscp: 0,
            ecn: 0,
            identification: 0,
            dont_fragment: false,
        }
    }
}

/// Builds an Ethernet frame carrying an IPv4 datagram. The link addresses are
/// left zeroed when unknown and filled in once the next hop is resolved.
pub fn build_ipv4_frame(
    src_mac: MacAddr,
    dst_mac: MacAddr,
    header: &Ipv4Header,
    payload: &[u8],
) -> Vec<u8> {
    let total_len = IPV4_HEADER_LEN + payload.len();
    let mut buf = vec![0u8; ETHERNET_HEADER_LEN + total_len];

    if let Some(mut eth) = MutableEthernetPacket::new(&mut buf) {
        eth.set_source(src_mac);
        eth.set_destination(dst_mac);
        eth.set_ethertype(EtherTypes::Ipv4);
    }

    if let Some(mut ip) = MutableIpv4Packet::new(&mut buf[ETHERNET_HEADER_LEN..]) {
        ip.set_version(4);
        ip.set_header_length((IPV4_HEADER_LEN / 4) as u8);
        ip.set_dscp(header.dscp);
        ip.set_ecn(header.ecn);
        ip.set_total_length(total_len as u16);
        ip.set_identification(header.identification);
        if header.dont_fragment {
            ip.set_flags(Ipv4Flags::DontFragment);
        }
        ip.set_ttl(header.ttl);
        ip.set_next_level_protocol(header.protocol);
        ip.set_source(header.source);
        ip.set_destination(header.destination);
        ip.set_payload(payload);
        let checksum = ipv4::checksum(&ip.to_immutable());
        ip.set_checksum(checksum);
    }

    buf
}

pub fn build_arp_request(src_mac: MacAddr, src_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Vec<u8> {
    build_arp(
        ArpOperations::Request,
        src_mac,
        src_ip,
        MacAddr::broadcast(),
        MacAddr::zero(),
        target_ip,
    )
}

pub fn build_arp_reply(
    src_mac: MacAddr,
    src_ip: Ipv4Addr,
    dst_mac: MacAddr,
    dst_ip: Ipv4Addr,
) -> Vec<u8> {
    build_arp(ArpOperations::Reply, src_mac, src_ip, dst_mac, dst_mac, dst_ip)
}

fn build_arp(
    operation: pnet::packet::arp::ArpOperation,
    src_mac: MacAddr,
    src_ip: Ipv4Addr,
    eth_dst: MacAddr,
    target_mac: MacAddr,
    target_ip: Ipv4Addr,
) -> Vec<u8> {
    let mut buf = vec![0u8; ETHERNET_HEADER_LEN + ARP_PACKET_LEN];

    if let Some(mut eth) = MutableEthernetPacket::new(&mut buf) {
        eth.set_source(src_mac);
        eth.set_destination(eth_dst);
        eth.set_ethertype(EtherTypes::Arp);
    }

    if let Some(mut arp) = MutableArpPacket::new(&mut buf[ETHERNET_HEADER_LEN..]) {
        arp.set_hardware_type(ArpHardwareTypes::Ethernet);
        arp.set_protocol_type(EtherTypes::Ipv4);
        arp.set_hw_addr_len(6);
        arp.set_proto_addr_len(4);
        arp.set_operation(operation);
        arp.set_sender_hw_addr(src_mac);
        arp.set_sender_proto_addr(src_ip);
        arp.set_target_hw_addr(target_mac);
        arp.set_target_proto_addr(target_ip);
    }

    buf
}

/// ICMP error message quoting the start of `original`, an IP datagram
/// without its link header.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |     Type      |     Code      |          Checksum             |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |            unused             |         Next-Hop MTU          |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |      Internet Header + 64 bits of Original Data Datagram      |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
pub fn build_icmp_error(icmp_type: u8, code: u8, original: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; ICMP_HEADER_LEN + ICMP_DATA_LEN];
    buf[0] = icmp_type;
    buf[1] = code;

    let quoted = original.len().min(ICMP_DATA_LEN);
    buf[ICMP_HEADER_LEN..ICMP_HEADER_LEN + quoted].copy_from_slice(&original[..quoted]);

    let checksum = util::checksum(&buf, 1);
    buf[2..4].copy_from_slice(&checksum.to_be_bytes());
    buf
}

/// Bytes of the IPv4 datagram inside `frame`, trimmed to its total length.
pub fn ipv4_bytes(frame: &[u8]) -> Option<&[u8]> {
    let ip = Ipv4Packet::new(frame.get(ETHERNET_HEADER_LEN..)?)?;
    let total_len = ip.get_total_length() as usize;
    frame.get(ETHERNET_HEADER_LEN..ETHERNET_HEADER_LEN + total_len)
}

/// Payload of the IPv4 datagram inside `frame`.
pub fn ipv4_payload(frame: &[u8]) -> Option<&[u8]> {
    let datagram = ipv4_bytes(frame)?;
    let header_len = Ipv4Packet::new(datagram)?.get_header_length() as usize * 4;
    datagram.get(header_len..)
}

/// Structural checks applied to every received frame: Ethernet length, and
/// for IPv4 the header length, total length and header checksum, plus the
/// ICMP checksum when the datagram carries ICMP.
pub fn is_valid(frame: &[u8]) -> bool {
    let Some(eth) = EthernetPacket::new(frame) else {
        return false;
    };

    match eth.get_ethertype() {
        EtherTypes::Arp => frame.len() >= ETHERNET_HEADER_LEN + ARP_PACKET_LEN,
        EtherTypes::Ipv4 => is_valid_ipv4(&frame[ETHERNET_HEADER_LEN..]),
        _ => true,
    }
}

fn is_valid_ipv4(bytes: &[u8]) -> bool {
    let Some(ip) = Ipv4Packet::new(bytes) else {
        return false;
    };
    let header_len = ip.get_header_length() as usize * 4;
    let total_len = ip.get_total_length() as usize;
    if ip.get_version() != 4
        || header_len < IPV4_HEADER_LEN
        || total_len < header_len
        || total_len > bytes.len()
    {
        return false;
    }
    if ipv4::checksum(&ip) != ip.get_checksum() {
        return false;
    }

    if ip.get_next_level_protocol() == IpNextHeaderProtocols::Icmp {
        let Some(packet) = IcmpPacket::new(&bytes[header_len..total_len]) else {
            return false;
        };
        return icmp::checksum(&packet) == packet.get_checksum();
    }

    true
}

/// Rewrites the link addresses of an outgoing frame.
pub fn set_link_addrs(frame: &mut [u8], src: MacAddr, dst: MacAddr) {
    if let Some(mut eth) = MutableEthernetPacket::new(frame) {
        eth.set_source(src);
        eth.set_destination(dst);
    }
}

/// Recomputes the header checksum of the IPv4 datagram inside `frame`.
pub fn refresh_ipv4_checksum(frame: &mut [u8]) {
    if let Some(mut ip) = frame
        .get_mut(ETHERNET_HEADER_LEN..)
        .and_then(MutableIpv4Packet::new)
    {
        let checksum = ipv4::checksum(&ip.to_immutable());
        ip.set_checksum(checksum);
    }
}

pub fn arp_view(frame: &[u8]) -> Option<ArpPacket<'_>> {
    ArpPacket::new(frame.get(ETHERNET_HEADER_LEN..)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC: Ipv4Addr = Ipv4Addr::new(10, 0, 1, 1);
    const DST: Ipv4Addr = Ipv4Addr::new(10, 0, 2, 9);

    fn udp_frame() -> Vec<u8> {
        build_ipv4_frame(
            MacAddr::new(2, 0, 0, 0, 0, 1),
            MacAddr::new(2, 0, 0, 0, 0, 2),
            &Ipv4Header::new(SRC, DST, IpNextHeaderProtocols::Udp),
            &[0u8; 12],
        )
    }

    #[test]
    fn built_frames_validate() {
        let frame = udp_frame();
        assert!(is_valid(&frame));
        assert_eq!(ipv4_payload(&frame).map(<[u8]>::len), Some(12));
    }

    #[test]
    fn corrupted_header_checksum_is_rejected() {
        let mut frame = udp_frame();
        frame[ETHERNET_HEADER_LEN + 8] ^= 0xff;
        assert!(!is_valid(&frame));

        refresh_ipv4_checksum(&mut frame);
        assert!(is_valid(&frame));
    }

    #[test]
    fn truncated_frame_is_rejected() {
        let frame = udp_frame();
        assert!(!is_valid(&frame[..ETHERNET_HEADER_LEN + 10]));
        assert!(!is_valid(&frame[..frame.len() - 1]));
    }

    #[test]
    fn icmp_error_quotes_header_and_eight_bytes() {
        let frame = udp_frame();
        let original = ipv4_bytes(&frame).unwrap();
        let message = build_icmp_error(3, 0, original);

        assert_eq!(message.len(), ICMP_HEADER_LEN + ICMP_DATA_LEN);
        assert_eq!(&message[ICMP_HEADER_LEN..], &original[..ICMP_DATA_LEN]);
        let packet = IcmpPacket::new(&message).unwrap();
        assert_eq!(icmp::checksum(&packet), packet.get_checksum());
    }

    #[test]
    fn arp_request_is_broadcast() {
        let frame = build_arp_request(MacAddr::new(2, 0, 0, 0, 0, 1), SRC, DST);
        let eth = EthernetPacket::new(&frame).unwrap();
        assert_eq!(eth.get_destination(), MacAddr::broadcast());

        let arp = arp_view(&frame).unwrap();
        assert_eq!(arp.get_operation(), ArpOperations::Request);
        assert_eq!(arp.get_target_proto_addr(), DST);
    }
}
