use std::net::Ipv4Addr;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use pnet::packet::util;
use serde::Serialize;

use crate::RouterId;
use crate::error::{DecodeError, DecodeResult};

// PWOSPF packet type.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
pub enum PacketType {
    Hello = 0x01,
    LsUpdate = 0x04,
}

impl PacketType {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(PacketType::Hello),
            0x04 => Some(PacketType::LsUpdate),
            _ => None,
        }
    }
}

// PWOSPF packet.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub enum Packet {
    Hello(Hello),
    LsUpdate(LsUpdate),
}

//
// PWOSPF packet header.
//
// Encoding format:
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |   Version #   |     Type      |         Packet length         |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                          Router ID                            |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                           Area ID                             |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |           Checksum            |             Autype            |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                       Authentication                          |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                       Authentication                          |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct PacketHdr {
    pub pkt_type: PacketType,
    pub router_id: RouterId,
    pub area_id: Ipv4Addr,
}

//
// PWOSPF Hello packet.
//
// Encoding format (packet body):
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                        Network Mask                           |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |         HelloInt              |           padding             |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Hello {
    pub hdr: PacketHdr,
    pub network_mask: Ipv4Addr,
    pub hello_interval: u16,
}

//
// PWOSPF Link State Update packet.
//
// Encoding format (packet body):
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |     Sequence                  |          TTL                  |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                      # advertisements                         |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                                                               |
// +-                                                            +-+
// |                  Link state advertisements                    |
// +-                                                            +-+
// |                              ...                              |
//
// The TTL occupies the low byte of its 16-bit field.
//
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct LsUpdate {
    pub hdr: PacketHdr,
    pub sequence: u16,
    pub ttl: u8,
    pub lsas: Vec<Lsa>,
}

//
// Link state advertisement.
//
// Encoding format:
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                           Subnet                              |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                           Mask                                |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                         Router ID                             |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct Lsa {
    pub subnet: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub router_id: RouterId,
}

// ===== impl Packet =====

impl Packet {
    pub fn hdr(&self) -> &PacketHdr {
        match self {
            Packet::Hello(pkt) => &pkt.hdr,
            Packet::LsUpdate(pkt) => &pkt.hdr,
        }
    }

    /// Decodes a PWOSPF message, the payload of an IPv4 datagram.
    pub fn decode(data: &[u8]) -> DecodeResult<Self> {
        if data.len() < PacketHdr::LENGTH as usize {
            return Err(DecodeError::IncompleteHeader);
        }

        // The declared length bounds the message; trailing bytes are ignored.
        let pkt_len = u16::from_be_bytes([data[2], data[3]]);
        if pkt_len < PacketHdr::LENGTH || pkt_len as usize > data.len() {
            return Err(DecodeError::InvalidLength(pkt_len));
        }
        let data = &data[..pkt_len as usize];
        PacketHdr::verify_cksum(data)?;

        let mut buf = Bytes::copy_from_slice(data);
        let hdr = PacketHdr::decode(&mut buf)?;
        match hdr.pkt_type {
            PacketType::Hello => Hello::decode(hdr, &mut buf).map(Packet::Hello),
            PacketType::LsUpdate => LsUpdate::decode(hdr, &mut buf).map(Packet::LsUpdate),
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);
        match self {
            Packet::Hello(pkt) => pkt.encode(&mut buf),
            Packet::LsUpdate(pkt) => pkt.encode(&mut buf),
        }

        // Packet length.
        let pkt_len = buf.len() as u16;
        buf[2..4].copy_from_slice(&pkt_len.to_be_bytes());

        PacketHdr::update_cksum(&mut buf);
        buf.freeze()
    }
}

// ===== impl PacketHdr =====

impl PacketHdr {
    pub const VERSION: u8 = 2;
    pub const LENGTH: u16 = 24;
    pub const CKSUM_RANGE: std::ops::Range<usize> = 12..14;
    const AUTH_TYPE_NULL: u16 = 0;

    pub fn new(pkt_type: PacketType, router_id: RouterId) -> Self {
        PacketHdr {
            pkt_type,
            router_id,
            area_id: Ipv4Addr::UNSPECIFIED,
        }
    }

    fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        let version = buf.get_u8();
        if version != Self::VERSION {
            return Err(DecodeError::InvalidVersion(version));
        }

        let pkt_type = buf.get_u8();
        let pkt_type = match PacketType::from_u8(pkt_type) {
            Some(pkt_type) => pkt_type,
            None => return Err(DecodeError::UnknownPacketType(pkt_type)),
        };

        // Length and checksum were validated on the raw bytes.
        let _pkt_len = buf.get_u16();
        let router_id = Ipv4Addr::from(buf.get_u32());
        let area_id = Ipv4Addr::from(buf.get_u32());
        let _cksum = buf.get_u16();

        // Authentication is not supported; autype and data are ignored.
        let _au_type = buf.get_u16();
        let _ = buf.get_u64();

        Ok(PacketHdr {
            pkt_type,
            router_id,
            area_id,
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(Self::VERSION);
        buf.put_u8(self.pkt_type as u8);
        // The length will be initialized later.
        buf.put_u16(0);
        buf.put_u32(self.router_id.into());
        buf.put_u32(self.area_id.into());
        // The checksum will be computed later.
        buf.put_u16(0);
        buf.put_u16(Self::AUTH_TYPE_NULL);
        buf.put_u64(0);
    }

    fn update_cksum(buf: &mut BytesMut) {
        let cksum = util::checksum(&buf[..], Self::CKSUM_RANGE.start / 2);
        buf[Self::CKSUM_RANGE].copy_from_slice(&cksum.to_be_bytes());
    }

    fn verify_cksum(data: &[u8]) -> DecodeResult<()> {
        let cksum = &data[Self::CKSUM_RANGE];
        let expected = u16::from_be_bytes([cksum[0], cksum[1]]);
        if util::checksum(data, Self::CKSUM_RANGE.start / 2) != expected {
            return Err(DecodeError::InvalidChecksum);
        }

        Ok(())
    }
}

// ===== impl Hello =====

impl Hello {
    pub const LENGTH: u16 = 8;

    pub fn new(router_id: RouterId, network_mask: Ipv4Addr, hello_interval: u16) -> Self {
        Hello {
            hdr: PacketHdr::new(PacketType::Hello, router_id),
            network_mask,
            hello_interval,
        }
    }

    fn decode(hdr: PacketHdr, buf: &mut Bytes) -> DecodeResult<Self> {
        if buf.remaining() < Self::LENGTH as usize {
            return Err(DecodeError::IncompleteBody);
        }

        let network_mask = Ipv4Addr::from(buf.get_u32());
        let hello_interval = buf.get_u16();
        let _padding = buf.get_u16();

        Ok(Hello {
            hdr,
            network_mask,
            hello_interval,
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        self.hdr.encode(buf);
        buf.put_u32(self.network_mask.into());
        buf.put_u16(self.hello_interval);
        buf.put_u16(0);
    }
}

// ===== impl LsUpdate =====

impl LsUpdate {
    pub const BASE_LENGTH: u16 = 8;

    pub fn new(router_id: RouterId, sequence: u16, ttl: u8, lsas: Vec<Lsa>) -> Self {
        LsUpdate {
            hdr: PacketHdr::new(PacketType::LsUpdate, router_id),
            sequence,
            ttl,
            lsas,
        }
    }

    fn decode(hdr: PacketHdr, buf: &mut Bytes) -> DecodeResult<Self> {
        if buf.remaining() < Self::BASE_LENGTH as usize {
            return Err(DecodeError::IncompleteBody);
        }

        let sequence = buf.get_u16();
        let _unused = buf.get_u8();
        let ttl = buf.get_u8();
        let lsa_cnt = buf.get_u32();
        if buf.remaining() < lsa_cnt as usize * Lsa::LENGTH as usize {
            return Err(DecodeError::IncompleteBody);
        }

        let lsas = (0..lsa_cnt).map(|_| Lsa::decode(buf)).collect();

        Ok(LsUpdate {
            hdr,
            sequence,
            ttl,
            lsas,
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        self.hdr.encode(buf);
        buf.put_u16(self.sequence);
        buf.put_u8(0);
        buf.put_u8(self.ttl);
        buf.put_u32(self.lsas.len() as u32);
        for lsa in &self.lsas {
            lsa.encode(buf);
        }
    }
}

// ===== impl Lsa =====

impl Lsa {
    pub const LENGTH: u16 = 12;

    fn decode(buf: &mut Bytes) -> Self {
        let subnet = Ipv4Addr::from(buf.get_u32());
        let mask = Ipv4Addr::from(buf.get_u32());
        let router_id = Ipv4Addr::from(buf.get_u32());
        Lsa {
            subnet,
            mask,
            router_id,
        }
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.subnet.into());
        buf.put_u32(self.mask.into());
        buf.put_u32(self.router_id.into());
    }
}

// ===== unit tests =====
