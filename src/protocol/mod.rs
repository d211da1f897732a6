//! PWOSPF protocol engines and the forwarding pipeline.
//!
//! The engines are `impl Router` blocks: adjacency maintenance, link-state
//! flooding, forwarding, address resolution and ICMP error synthesis all run
//! against the same shared router state.

pub mod adjacency;
pub mod flooding;
pub mod forwarding;
pub mod icmp;
pub mod neighbor;
pub mod packet;
pub mod resolution;
pub mod routing_table;
pub mod scheduler;

pub use icmp::IcmpError;
pub use neighbor::{Neighbor, NeighborRegistry};
pub use packet::{Hello, Lsa, LsUpdate, Packet, PacketType};
pub use routing_table::{RouteEntry, RouteSource, RoutingTable};
pub use scheduler::{RecomputeScheduler, TopologySnapshot};
