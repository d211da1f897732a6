use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::path::Path;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    pub interfaces: Vec<InterfaceConfig>,
    #[serde(default)]
    pub static_routes: Vec<StaticRouteConfig>,
    #[serde(default)]
    pub timers: TimerConfig,
    #[serde(default = "default_control_port")]
    pub control_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceConfig {
    pub name: String,
    /// Interface address and prefix, e.g. `10.0.1.1/24`.
    pub address: Ipv4Net,
    /// Link address. Looked up from the OS when absent.
    #[serde(default)]
    pub mac: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticRouteConfig {
    pub destination: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub interface: String,
}

/// Protocol timers, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    pub hello_interval: u16,
    pub neighbor_timeout: u32,
    pub lsu_interval: u32,
    pub topology_timeout: u32,
    pub lsu_ttl: u8,
    pub arp_cache_timeout: u32,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            hello_interval: 5,
            neighbor_timeout: 15,
            lsu_interval: 30,
            topology_timeout: 35,
            lsu_ttl: 64,
            arp_cache_timeout: 15,
        }
    }
}

fn default_control_port() -> u16 {
    2089
}

impl RouterConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)?;
        let config: RouterConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.interfaces.is_empty() {
            return Err(Error::NoInterfaces);
        }

        let mut names = HashSet::new();
        for interface in &self.interfaces {
            if !names.insert(interface.name.as_str()) {
                return Err(Error::DuplicateInterface(interface.name.clone()));
            }
        }

        for route in &self.static_routes {
            if !names.contains(route.interface.as_str()) {
                return Err(Error::UnknownInterface(route.interface.clone()));
            }
            if ipnet::ipv4_mask_to_prefix(route.mask).is_err() {
                return Err(Error::InvalidMask(route.mask));
            }
        }

        Ok(())
    }
}
