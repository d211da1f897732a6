use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use pnet::util::MacAddr;

use pwospf_router::config::{InterfaceConfig, RouterConfig};
use pwospf_router::control_server::ControlServer;
use pwospf_router::network::datalink::{self, DatalinkTransport};
use pwospf_router::network::Interface;
use pwospf_router::{Error, Router};

#[derive(Parser)]
#[command(name = "pwospf-router", about = "PWOSPF software router")]
struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Overrides the control port from the configuration
    #[arg(long)]
    control_port: Option<u16>,

    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let config = RouterConfig::load_from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    let interfaces = config
        .interfaces
        .iter()
        .map(build_interface)
        .collect::<Result<Vec<_>, _>>()?;
    let names: Vec<String> = interfaces.iter().map(|iface| iface.name.clone()).collect();

    let (transport, mut inbound) =
        DatalinkTransport::open(&names).context("opening datalink channels")?;

    let router = Router::initialize(interfaces, config.timers, Arc::new(transport)).await?;
    for route in &config.static_routes {
        router
            .add_static_route(route.destination, route.mask, route.gateway, &route.interface)
            .await?;
    }

    let control_port = cli.control_port.unwrap_or(config.control_port);
    let control = ControlServer::new(control_port, router.clone());
    tokio::spawn(async move {
        if let Err(e) = control.start().await {
            error!("Control server stopped: {}", e);
        }
    });

    info!("Router {} running on {:?}", router.router_id, names);

    loop {
        tokio::select! {
            received = inbound.recv() => {
                let Some((iface, frame)) = received else {
                    warn!("All datalink readers stopped");
                    break;
                };
                router.handle_frame(&frame, &iface).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    router.stop();
    Ok(())
}

fn build_interface(config: &InterfaceConfig) -> Result<Interface> {
    let mac = match &config.mac {
        Some(mac) => mac
            .parse::<MacAddr>()
            .map_err(|_| Error::InvalidMacAddr(mac.clone()))?,
        None => datalink::interface_mac(&config.name)
            .with_context(|| format!("no hardware address for {}", config.name))?,
    };
    Ok(Interface::from_network(config.name.clone(), config.address, mac))
}
