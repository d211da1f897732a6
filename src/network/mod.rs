pub mod arp;
pub mod datalink;
pub mod frame;
pub mod interface;
pub mod topology;

pub use arp::ArpCache;
pub use interface::{Adjacency, Interface, InterfaceTable};
pub use topology::{TopologyDb, TopologyEntry};

/// Outgoing side of the link layer.
///
/// Sending never blocks and never fails from the caller's point of view:
/// a frame that cannot be handed to the interface is dropped and logged by
/// the implementation.
pub trait Transmit: Send + Sync {
    fn send(&self, iface: &str, frame: Vec<u8>);
}
