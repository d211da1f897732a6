use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use log::{error, info};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::network::Adjacency;
use crate::protocol::RouteSource;
use crate::router::Router;

#[derive(Debug, Serialize, Deserialize)]
pub struct InterfaceInfo {
    pub name: String,
    pub address: String,
    pub mac: String,
    pub adjacency: Option<Adjacency>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RouteInfo {
    pub prefix: String,
    pub gateway: Ipv4Addr,
    pub interface: String,
    pub source: RouteSource,
    pub admin_distance: u8,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ArpInfo {
    pub ip: Ipv4Addr,
    pub mac: String,
    pub added: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ControlResponse {
    pub success: bool,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ControlCommand {
    pub command: String,
    pub args: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct AddRouteArgs {
    destination: Ipv4Addr,
    mask: Ipv4Addr,
    gateway: Ipv4Addr,
    interface: String,
}

impl ControlResponse {
    fn ok(message: impl Into<String>, data: impl Serialize) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: serde_json::to_value(data).ok(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

/// Line-oriented JSON control channel on the loopback interface.
pub struct ControlServer {
    port: u16,
    router: Arc<Router>,
}

impl ControlServer {
    pub fn new(port: u16, router: Arc<Router>) -> Self {
        Self { port, router }
    }

    pub async fn start(&self) -> std::io::Result<()> {
        let bind_addr = format!("127.0.0.1:{}", self.port);
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("Control server listening on {}", bind_addr);

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    info!("Control connection from {}", addr);
                    let router = self.router.clone();
                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_client(stream, router).await {
                            error!("Error handling control client {}: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept control connection: {}", e);
                }
            }
        }
    }

    async fn handle_client(mut stream: TcpStream, router: Arc<Router>) -> std::io::Result<()> {
        let (reader, mut writer) = stream.split();
        let mut buf_reader = BufReader::new(reader);
        let mut line = String::new();

        loop {
            line.clear();
            if buf_reader.read_line(&mut line).await? == 0 {
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<ControlCommand>(trimmed) {
                Ok(command) => Self::process_command(command, &router).await,
                Err(e) => ControlResponse::error(format!("Invalid JSON command: {}", e)),
            };

            let response_json = serde_json::to_string(&response)?;
            writer.write_all(format!("{}\n", response_json).as_bytes()).await?;
            writer.flush().await?;
        }

        Ok(())
    }

    pub async fn process_command(command: ControlCommand, router: &Router) -> ControlResponse {
        match command.command.as_str() {
            "status" => Self::get_status(router).await,
            "interfaces" => Self::get_interfaces(router).await,
            "neighbors" => Self::get_neighbors(router).await,
            "topology" => Self::get_topology(router).await,
            "routing_table" => Self::get_routing_table(router).await,
            "arp" => Self::get_arp(router).await,
            "recalculate" => Self::recalculate(router).await,
            "add_route" => Self::add_route(command.args, router).await,
            "help" => Self::get_help(),
            _ => ControlResponse::error(format!("Unknown command: {}", command.command)),
        }
    }

    async fn get_status(router: &Router) -> ControlResponse {
        let neighbors = router.neighbors.lock().await.len();
        let topology = router.topology.lock().await.len();
        let routes = router.routing_table.read().await.len();

        ControlResponse::ok(
            "Status retrieved",
            serde_json::json!({
                "router_id": router.router_id,
                "sequence": router.sequence.load(Ordering::Relaxed),
                "neighbors": neighbors,
                "topology_entries": topology,
                "routes": routes,
                "recompute_generation": router.scheduler.completed(),
            }),
        )
    }

    async fn get_interfaces(router: &Router) -> ControlResponse {
        let interfaces: Vec<InterfaceInfo> = router
            .interfaces
            .read()
            .await
            .iter()
            .map(|iface| InterfaceInfo {
                name: iface.name.clone(),
                address: iface
                    .network()
                    .map(|net| format!("{}/{}", iface.ip, net.prefix_len()))
                    .unwrap_or_else(|| iface.ip.to_string()),
                mac: iface.mac.to_string(),
                adjacency: iface.adjacency,
            })
            .collect();

        ControlResponse::ok(format!("Found {} interfaces", interfaces.len()), interfaces)
    }

    async fn get_neighbors(router: &Router) -> ControlResponse {
        let neighbors: Vec<_> = router.neighbors.lock().await.iter().cloned().collect();
        ControlResponse::ok(format!("Found {} neighbors", neighbors.len()), neighbors)
    }

    async fn get_topology(router: &Router) -> ControlResponse {
        let entries = router.topology_snapshot().await;
        ControlResponse::ok(format!("Found {} topology entries", entries.len()), entries)
    }

    async fn get_routing_table(router: &Router) -> ControlResponse {
        let routes: Vec<RouteInfo> = router
            .routing_table
            .read()
            .await
            .iter()
            .map(|route| RouteInfo {
                prefix: route
                    .prefix()
                    .map(|net| net.to_string())
                    .unwrap_or_else(|| format!("{}/{}", route.destination, route.mask)),
                gateway: route.gateway,
                interface: route.interface.clone(),
                source: route.source,
                admin_distance: route.admin_distance(),
            })
            .collect();

        ControlResponse::ok(format!("Retrieved {} routes", routes.len()), routes)
    }

    async fn get_arp(router: &Router) -> ControlResponse {
        let entries: Vec<ArpInfo> = router
            .arp
            .lock()
            .await
            .entries()
            .map(|(ip, entry)| ArpInfo {
                ip: *ip,
                mac: entry.mac.to_string(),
                added: entry.added.to_rfc3339(),
            })
            .collect();

        ControlResponse::ok(format!("Found {} ARP entries", entries.len()), entries)
    }

    async fn recalculate(router: &Router) -> ControlResponse {
        let generation = router.schedule_recompute().await;
        if !router.scheduler.wait_for(generation).await {
            return ControlResponse::error("Route computation unavailable");
        }
        Self::get_routing_table(router).await
    }

    async fn add_route(args: Option<serde_json::Value>, router: &Router) -> ControlResponse {
        let Some(args) = args else {
            return ControlResponse::error("destination, mask, gateway and interface required");
        };
        let args: AddRouteArgs = match serde_json::from_value(args) {
            Ok(args) => args,
            Err(e) => return ControlResponse::error(format!("Invalid route: {}", e)),
        };

        match router
            .add_static_route(args.destination, args.mask, args.gateway, &args.interface)
            .await
        {
            Ok(()) => ControlResponse::ok("Static route installed", serde_json::Value::Null),
            Err(e) => ControlResponse::error(format!("Failed to add route: {}", e)),
        }
    }

    fn get_help() -> ControlResponse {
        let commands = vec![
            ("status", "Get router status"),
            ("interfaces", "List interfaces and their adjacencies"),
            ("neighbors", "List live neighbors"),
            ("topology", "Dump the link-state database"),
            ("routing_table", "Get current routing table"),
            ("arp", "Dump the ARP cache"),
            ("recalculate", "Recompute routes now and return the table"),
            ("add_route", "Install a static route (destination, mask, gateway, interface)"),
            ("help", "Show this help message"),
        ];

        ControlResponse::ok("Available commands", commands)
    }
}
