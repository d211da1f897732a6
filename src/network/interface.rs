use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use pnet::util::MacAddr;
use serde::{Deserialize, Serialize};

use crate::RouterId;

/// Neighbor reachable through an interface, as learned from its HELLOs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjacency {
    pub neighbor_id: RouterId,
    pub neighbor_ip: Ipv4Addr,
}

#[derive(Debug, Clone)]
pub struct Interface {
    pub name: String,
    pub ip: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub mac: MacAddr,
    /// Seconds left before the next HELLO goes out.
    pub hello_countdown: u16,
    pub adjacency: Option<Adjacency>,
}

impl Interface {
    pub fn new(name: impl Into<String>, ip: Ipv4Addr, mask: Ipv4Addr, mac: MacAddr) -> Self {
        Self {
            name: name.into(),
            ip,
            mask,
            mac,
            hello_countdown: 0,
            adjacency: None,
        }
    }

    pub fn from_network(name: impl Into<String>, network: Ipv4Net, mac: MacAddr) -> Self {
        Self::new(name, network.addr(), network.netmask(), mac)
    }

    pub fn subnet(&self) -> Ipv4Addr {
        self.ip & self.mask
    }

    /// Directly connected network, if the mask is contiguous.
    pub fn network(&self) -> Option<Ipv4Net> {
        let prefix = ipnet::ipv4_mask_to_prefix(self.mask).ok()?;
        Ipv4Net::new(self.subnet(), prefix).ok()
    }
}

/// The router's local interfaces, in configuration order.
#[derive(Debug, Clone, Default)]
pub struct InterfaceTable {
    interfaces: Vec<Interface>,
}

impl InterfaceTable {
    pub fn new(interfaces: Vec<Interface>) -> Self {
        Self { interfaces }
    }

    pub fn get(&self, name: &str) -> Option<&Interface> {
        self.interfaces.iter().find(|iface| iface.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Interface> {
        self.interfaces.iter_mut().find(|iface| iface.name == name)
    }

    pub fn get_by_ip(&self, ip: Ipv4Addr) -> Option<&Interface> {
        self.interfaces.iter().find(|iface| iface.ip == ip)
    }

    pub fn is_local(&self, ip: Ipv4Addr) -> bool {
        self.get_by_ip(ip).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interface> {
        self.interfaces.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Interface> {
        self.interfaces.iter_mut()
    }

    /// Interfaces that currently have a live neighbor.
    pub fn adjacent(&self) -> impl Iterator<Item = (&Interface, Adjacency)> {
        self.interfaces
            .iter()
            .filter_map(|iface| iface.adjacency.map(|adj| (iface, adj)))
    }

    pub fn len(&self) -> usize {
        self.interfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }

    /// Largest local address, used as the router identifier.
    pub fn highest_address(&self) -> Option<Ipv4Addr> {
        self.interfaces.iter().map(|iface| iface.ip).max()
    }

    /// Clears every adjacency pointing at `neighbor_id` and returns the names
    /// of the interfaces that were touched. Visits each interface once; an
    /// empty result means no interface referenced the neighbor.
    pub fn clear_adjacency(&mut self, neighbor_id: RouterId) -> Vec<String> {
        let mut cleared = Vec::new();
        for iface in &mut self.interfaces {
            if iface.adjacency.is_some_and(|adj| adj.neighbor_id == neighbor_id) {
                iface.adjacency = None;
                cleared.push(iface.name.clone());
            }
        }
        cleared
    }
}
