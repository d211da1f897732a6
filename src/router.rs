use std::collections::HashSet;
use std::future::Future;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::AtomicU16;
use std::time::Duration;

use chrono::Utc;
use log::{debug, info, warn};
use pnet::packet::Packet as _;
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::ipv4::Ipv4Packet;
use tokio::sync::{Mutex, RwLock, broadcast};
use tokio::time::{Instant, MissedTickBehavior, interval_at};

use crate::RouterId;
use crate::config::TimerConfig;
use crate::error::Error;
use crate::network::frame::{self, ALL_SPF_ROUTERS, OSPF_PROTOCOL};
use crate::network::{ArpCache, Interface, InterfaceTable, TopologyDb, TopologyEntry, Transmit};
use crate::protocol::neighbor::NeighborRegistry;
use crate::protocol::packet::Packet;
use crate::protocol::routing_table::{RouteEntry, RouteSource, RoutingTable};
use crate::protocol::scheduler::{LocalAdjacency, RecomputeScheduler, TopologySnapshot};

/// Router state shared by the packet path and the periodic tasks.
///
/// Locks are always taken in declaration order: `send_lock`, `interfaces`,
/// `neighbors`, `topology`, `routing_table`, `arp`. Frames are handed to the
/// transport only after every lock but `send_lock` has been released.
pub struct Router {
    pub router_id: RouterId,
    pub timers: TimerConfig,
    pub send_lock: Mutex<()>,
    pub interfaces: RwLock<InterfaceTable>,
    pub neighbors: Mutex<NeighborRegistry>,
    pub topology: Mutex<TopologyDb>,
    pub routing_table: Arc<RwLock<RoutingTable>>,
    pub arp: Mutex<ArpCache>,
    /// Sequence number stamped on the next round of link-state updates.
    pub sequence: AtomicU16,
    pub scheduler: RecomputeScheduler,
    pub(crate) transmit: Arc<dyn Transmit>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Router {
    /// Builds the router state: picks the router identifier, installs the
    /// connected routes and starts the recompute worker. Periodic tasks are
    /// not started; see [`Router::start`].
    pub async fn new(
        interfaces: Vec<Interface>,
        timers: TimerConfig,
        transmit: Arc<dyn Transmit>,
    ) -> Result<Arc<Self>, Error> {
        let mut names = HashSet::new();
        for iface in &interfaces {
            if !names.insert(iface.name.clone()) {
                return Err(Error::DuplicateInterface(iface.name.clone()));
            }
            if ipnet::ipv4_mask_to_prefix(iface.mask).is_err() {
                return Err(Error::InvalidMask(iface.mask));
            }
        }

        let interfaces = InterfaceTable::new(interfaces);
        let router_id = interfaces.highest_address().ok_or(Error::NoInterfaces)?;

        let mut routing_table = RoutingTable::new();
        for iface in interfaces.iter() {
            routing_table.add_local(RouteEntry::new(
                iface.subnet(),
                iface.mask,
                Ipv4Addr::UNSPECIFIED,
                iface.name.clone(),
                RouteSource::Direct,
            ));
        }
        let routing_table = Arc::new(RwLock::new(routing_table));

        let scheduler = RecomputeScheduler::start(router_id, routing_table.clone());
        let (shutdown_tx, _) = broadcast::channel(1);

        info!(
            "Router {} created with {} interfaces",
            router_id,
            interfaces.len()
        );

        Ok(Arc::new(Self {
            router_id,
            timers,
            send_lock: Mutex::new(()),
            interfaces: RwLock::new(interfaces),
            neighbors: Mutex::new(NeighborRegistry::new()),
            topology: Mutex::new(TopologyDb::new()),
            routing_table,
            arp: Mutex::new(ArpCache::new(chrono::Duration::seconds(
                timers.arp_cache_timeout as i64,
            ))),
            sequence: AtomicU16::new(0),
            scheduler,
            transmit,
            shutdown_tx,
        }))
    }

    /// Creates the router and starts every periodic task. Returns once the
    /// router identifier is fixed.
    pub async fn initialize(
        interfaces: Vec<Interface>,
        timers: TimerConfig,
        transmit: Arc<dyn Transmit>,
    ) -> Result<Arc<Self>, Error> {
        let router = Self::new(interfaces, timers, transmit).await?;
        router.start();
        Ok(router)
    }

    /// Spawns the HELLO, liveness, topology aging, LSU and ARP tasks.
    pub fn start(self: &Arc<Self>) {
        let second = Duration::from_secs(1);
        let lsu_interval = Duration::from_secs(self.timers.lsu_interval.max(1) as u64);

        self.spawn_periodic("hello", second, Duration::ZERO, |router| async move {
            router.hello_sweep().await;
        });
        self.spawn_periodic("liveness", second, second, |router| async move {
            router.liveness_sweep(Utc::now()).await;
        });
        self.spawn_periodic("topology aging", second, second, |router| async move {
            router.topology_sweep(Utc::now()).await;
        });
        self.spawn_periodic("lsu", lsu_interval, lsu_interval, |router| async move {
            router.lsu_round().await;
        });
        self.spawn_periodic("arp", second, second, |router| async move {
            router.arp_sweep(Utc::now()).await;
        });

        info!("All router tasks started");
    }

    /// Stops the periodic tasks.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }

    fn spawn_periodic<F, Fut>(
        self: &Arc<Self>,
        name: &'static str,
        period: Duration,
        delay: Duration,
        job: F,
    )
    where
        F: Fn(Arc<Router>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let router = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + delay, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!("{} task shutting down", name);
                        break;
                    }
                    _ = interval.tick() => {
                        job(router.clone()).await;
                    }
                }
            }
        });
    }

    /// Single entry point for received frames. Dispatches ARP, PWOSPF and
    /// other IPv4 traffic; everything else is ignored.
    pub async fn handle_frame(&self, frame: &[u8], iface: &str) {
        if !frame::is_valid(frame) {
            debug!("Dropping malformed frame received on {}", iface);
            return;
        }
        if self.interfaces.read().await.get(iface).is_none() {
            warn!("Frame received on unknown interface {}", iface);
            return;
        }
        let Some(eth) = EthernetPacket::new(frame) else {
            return;
        };

        match eth.get_ethertype() {
            EtherTypes::Arp => self.handle_arp(frame, iface).await,
            EtherTypes::Ipv4 => self.handle_ipv4(frame, iface).await,
            ethertype => debug!("Ignoring {:?} frame on {}", ethertype, iface),
        }
    }

    async fn handle_ipv4(&self, frame: &[u8], iface: &str) {
        let Some(ip) = frame::ipv4_bytes(frame).and_then(Ipv4Packet::new) else {
            return;
        };
        let source = ip.get_source();
        let destination = ip.get_destination();

        let is_local = self.interfaces.read().await.is_local(destination);
        if ip.get_next_level_protocol() == OSPF_PROTOCOL
            && (destination == ALL_SPF_ROUTERS || is_local)
        {
            match Packet::decode(ip.payload()) {
                Ok(Packet::Hello(hello)) => self.on_hello(source, &hello, iface).await,
                Ok(Packet::LsUpdate(update)) => self.on_update(source, update, iface).await,
                Err(e) => debug!("Dropping PWOSPF packet from {} on {}: {}", source, iface, e),
            }
            return;
        }

        if destination.is_multicast() || destination.is_broadcast() {
            debug!("Ignoring datagram for {} on {}", destination, iface);
            return;
        }

        self.forward(frame, iface).await;
    }

    /// Installs a static route. It is advertised like a connected route and
    /// survives recomputation.
    pub async fn add_static_route(
        &self,
        destination: Ipv4Addr,
        mask: Ipv4Addr,
        gateway: Ipv4Addr,
        iface: &str,
    ) -> Result<(), Error> {
        if ipnet::ipv4_mask_to_prefix(mask).is_err() {
            return Err(Error::InvalidMask(mask));
        }
        if self.interfaces.read().await.get(iface).is_none() {
            return Err(Error::UnknownInterface(iface.to_string()));
        }

        let route = RouteEntry::new(destination, mask, gateway, iface, RouteSource::Static);
        info!(
            "Static route {}/{} via {} on {}",
            route.destination, route.mask, gateway, iface
        );
        self.routing_table.write().await.add_local(route);
        Ok(())
    }

    /// Link-state database entries, in (router, subnet, mask) order.
    pub async fn topology_snapshot(&self) -> Vec<TopologyEntry> {
        self.topology.lock().await.snapshot()
    }

    /// Schedules a route computation over the current state and returns its
    /// generation.
    pub async fn schedule_recompute(&self) -> u64 {
        let interfaces = self.interfaces.read().await;
        let topology = self.topology.lock().await;
        let routing_table = self.routing_table.read().await;
        self.scheduler
            .schedule(build_snapshot(&interfaces, &topology, &routing_table))
    }

    /// Removes link-state entries older than the topology timeout and
    /// recomputes routes if any went away.
    pub async fn topology_sweep(&self, now: chrono::DateTime<Utc>) {
        let interfaces = self.interfaces.read().await;
        let mut topology = self.topology.lock().await;
        let timeout = chrono::Duration::seconds(self.timers.topology_timeout as i64);

        let removed = topology.expire(now, timeout);
        if removed == 0 {
            return;
        }

        info!("{} topology entries expired", removed);
        let routing_table = self.routing_table.read().await;
        self.scheduler
            .schedule(build_snapshot(&interfaces, &topology, &routing_table));
    }
}

/// Copies what the route computation needs. Callers hold the three locks.
pub(crate) fn build_snapshot(
    interfaces: &InterfaceTable,
    topology: &TopologyDb,
    routing_table: &RoutingTable,
) -> TopologySnapshot {
    TopologySnapshot {
        entries: topology.snapshot(),
        adjacencies: interfaces
            .adjacent()
            .map(|(iface, adjacency)| LocalAdjacency {
                iface: iface.name.clone(),
                neighbor_id: adjacency.neighbor_id,
                neighbor_ip: adjacency.neighbor_ip,
            })
            .collect(),
        connected: routing_table
            .local_routes()
            .map(|route| (route.destination, route.mask))
            .collect(),
    }
}
