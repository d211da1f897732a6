pub mod algorithms;
pub mod config;
pub mod control_server;
pub mod error;
pub mod network;
pub mod protocol;
pub mod router;

use std::net::Ipv4Addr;

pub use error::{DecodeError, Error};
pub use router::Router;

/// PWOSPF router identifier. Chosen once at startup as the numerically
/// largest local interface address.
pub type RouterId = Ipv4Addr;
