#![allow(dead_code)]

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

use pnet::packet::Packet as _;
use pnet::packet::ethernet::{EtherType, EthernetPacket};
use pnet::packet::icmp::IcmpPacket;
use pnet::packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::util;
use pnet::util::MacAddr;

use pwospf_router::Router;
use pwospf_router::config::TimerConfig;
use pwospf_router::network::frame::{
    self, ALL_SPF_ROUTERS, ALL_SPF_ROUTERS_MAC, Ipv4Header, OSPF_PROTOCOL,
};
use pwospf_router::network::{Interface, Transmit};
use pwospf_router::protocol::{Hello, Lsa, LsUpdate, Packet};

pub const MASK: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 0);

pub const ETH0_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 1, 1);
pub const ETH1_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 2, 1);
pub const ETH2_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 3, 1);
pub const ETH0_MAC: MacAddr = MacAddr(0x02, 0, 0, 0, 0x01, 0x01);
pub const ETH1_MAC: MacAddr = MacAddr(0x02, 0, 0, 0, 0x02, 0x01);
pub const ETH2_MAC: MacAddr = MacAddr(0x02, 0, 0, 0, 0x03, 0x01);

/// Host on the eth0 network.
pub const HOST_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 1, 50);
pub const HOST_MAC: MacAddr = MacAddr(0x02, 0, 0, 0, 0x01, 0x32);
/// Host on the eth1 network.
pub const SERVER_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 2, 9);
pub const SERVER_MAC: MacAddr = MacAddr(0x02, 0, 0, 0, 0x02, 0x09);

/// Neighbor router reachable through eth0.
pub const PEER_ID: Ipv4Addr = Ipv4Addr::new(2, 2, 2, 2);
pub const PEER_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 1, 2);
pub const PEER_MAC: MacAddr = MacAddr(0x02, 0, 0, 0, 0x01, 0x02);
/// Neighbor router reachable through eth1.
pub const OTHER_PEER_ID: Ipv4Addr = Ipv4Addr::new(4, 4, 4, 4);
pub const OTHER_PEER_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 2, 2);
pub const OTHER_PEER_MAC: MacAddr = MacAddr(0x02, 0, 0, 0, 0x02, 0x02);

/// Transport that keeps every frame handed to it.
#[derive(Default)]
pub struct RecordingTransmit {
    frames: Mutex<Vec<(String, Vec<u8>)>>,
}

impl RecordingTransmit {
    pub fn take(&self) -> Vec<(String, Vec<u8>)> {
        std::mem::take(&mut *self.frames.lock().unwrap())
    }
}

impl Transmit for RecordingTransmit {
    fn send(&self, iface: &str, frame: Vec<u8>) {
        self.frames.lock().unwrap().push((iface.to_string(), frame));
    }
}

/// Router with eth0, eth1 and eth2 on 10.0.{1,2,3}.0/24 and no periodic
/// tasks running.
pub async fn router() -> (Arc<Router>, Arc<RecordingTransmit>) {
    let transmit = Arc::new(RecordingTransmit::default());
    let interfaces = vec![
        Interface::new("eth0", ETH0_IP, MASK, ETH0_MAC),
        Interface::new("eth1", ETH1_IP, MASK, ETH1_MAC),
        Interface::new("eth2", ETH2_IP, MASK, ETH2_MAC),
    ];
    let router = Router::new(interfaces, TimerConfig::default(), transmit.clone())
        .await
        .unwrap();
    (router, transmit)
}

pub async fn learn_mac(router: &Router, ip: Ipv4Addr, mac: MacAddr) {
    router.arp.lock().await.insert(ip, mac, chrono::Utc::now());
}

pub fn ip_frame(
    src_mac: MacAddr,
    dst_mac: MacAddr,
    src: Ipv4Addr,
    dst: Ipv4Addr,
    protocol: IpNextHeaderProtocol,
    ttl: u8,
    payload: &[u8],
) -> Vec<u8> {
    let mut header = Ipv4Header::new(src, dst, protocol);
    header.ttl = ttl;
    header.identification = 0x1234;
    frame::build_ipv4_frame(src_mac, dst_mac, &header, payload)
}

pub fn udp_frame(src: Ipv4Addr, dst: Ipv4Addr, ttl: u8) -> Vec<u8> {
    let payload = [0x30, 0x39, 0x00, 0x35, 0x00, 0x0c, 0x00, 0x00, b'p', b'i', b'n', b'g'];
    ip_frame(HOST_MAC, ETH0_MAC, src, dst, IpNextHeaderProtocols::Udp, ttl, &payload)
}

pub fn echo_request(src: Ipv4Addr, dst: Ipv4Addr, ttl: u8) -> Vec<u8> {
    let mut icmp = vec![8, 0, 0, 0, 0x00, 0x07, 0x00, 0x01, 1, 2, 3, 4, 5, 6, 7, 8];
    let checksum = util::checksum(&icmp, 1);
    icmp[2..4].copy_from_slice(&checksum.to_be_bytes());
    ip_frame(HOST_MAC, ETH0_MAC, src, dst, IpNextHeaderProtocols::Icmp, ttl, &icmp)
}

pub fn hello_frame(
    src: Ipv4Addr,
    src_mac: MacAddr,
    router_id: Ipv4Addr,
    mask: Ipv4Addr,
    interval: u16,
) -> Vec<u8> {
    let packet = Packet::Hello(Hello::new(router_id, mask, interval));
    ip_frame(src_mac, ALL_SPF_ROUTERS_MAC, src, ALL_SPF_ROUTERS, OSPF_PROTOCOL, 1, &packet.encode())
}

pub fn lsu_frame(
    src: Ipv4Addr,
    src_mac: MacAddr,
    dst: Ipv4Addr,
    advertiser: Ipv4Addr,
    sequence: u16,
    ttl: u8,
    lsas: Vec<Lsa>,
) -> Vec<u8> {
    let packet = Packet::LsUpdate(LsUpdate::new(advertiser, sequence, ttl, lsas));
    ip_frame(src_mac, MacAddr::zero(), src, dst, OSPF_PROTOCOL, 64, &packet.encode())
}

pub fn lsa(subnet: [u8; 4], router_id: Ipv4Addr) -> Lsa {
    Lsa {
        subnet: subnet.into(),
        mask: MASK,
        router_id,
    }
}

pub fn ethertype(frame: &[u8]) -> EtherType {
    EthernetPacket::new(frame).unwrap().get_ethertype()
}

pub fn eth_addrs(frame: &[u8]) -> (MacAddr, MacAddr) {
    let eth = EthernetPacket::new(frame).unwrap();
    (eth.get_source(), eth.get_destination())
}

pub fn ipv4(frame: &[u8]) -> Ipv4Packet<'_> {
    Ipv4Packet::new(frame::ipv4_bytes(frame).unwrap()).unwrap()
}

/// (type, code) of the ICMP message inside `frame`.
pub fn icmp_type_code(frame: &[u8]) -> (u8, u8) {
    let icmp = IcmpPacket::new(frame::ipv4_payload(frame).unwrap()).unwrap();
    (icmp.get_icmp_type().0, icmp.get_icmp_code().0)
}

/// Bytes an ICMP error quotes from the offending datagram.
pub fn icmp_quote(frame: &[u8]) -> Vec<u8> {
    let icmp = IcmpPacket::new(frame::ipv4_payload(frame).unwrap()).unwrap();
    icmp.payload()[4..].to_vec()
}

pub fn decode_pwospf(frame: &[u8]) -> Packet {
    Packet::decode(frame::ipv4_payload(frame).unwrap()).unwrap()
}
