//! Raw Ethernet transport over `pnet::datalink`.
//!
//! Every interface gets a reader and a writer thread. Frames cross into the
//! async side through bounded channels; a full channel drops the frame.

use std::collections::HashMap;
use std::io;
use std::thread;

use log::{debug, error, warn};
use pnet::datalink::{self, Channel, NetworkInterface};
use pnet::util::MacAddr;
use tokio::sync::mpsc;

use super::Transmit;

const QUEUE_DEPTH: usize = 1024;

/// Frame received on the named interface.
pub type Inbound = (String, Vec<u8>);

pub struct DatalinkTransport {
    writers: HashMap<String, mpsc::Sender<Vec<u8>>>,
}

impl DatalinkTransport {
    /// Opens a channel on every named interface and starts its threads.
    pub fn open(names: &[String]) -> io::Result<(Self, mpsc::Receiver<Inbound>)> {
        let (inbound_tx, inbound_rx) = mpsc::channel(QUEUE_DEPTH);
        let mut writers = HashMap::new();

        for name in names {
            let interface = find_interface(name).ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, format!("no such interface {name}"))
            })?;

            let (mut tx, mut rx) = match datalink::channel(&interface, Default::default())? {
                Channel::Ethernet(tx, rx) => (tx, rx),
                _ => {
                    return Err(io::Error::new(
                        io::ErrorKind::Unsupported,
                        format!("{name} is not an Ethernet interface"),
                    ));
                }
            };

            let (writer_tx, mut writer_rx) = mpsc::channel::<Vec<u8>>(QUEUE_DEPTH);
            let iface = name.clone();
            thread::Builder::new()
                .name(format!("tx-{name}"))
                .spawn(move || {
                    while let Some(frame) = writer_rx.blocking_recv() {
                        match tx.send_to(&frame, None) {
                            Some(Ok(())) => {}
                            Some(Err(e)) => error!("Failed to send on {}: {}", iface, e),
                            None => error!("Failed to send on {}: buffer unavailable", iface),
                        }
                    }
                    debug!("Writer for {} stopped", iface);
                })?;

            let iface = name.clone();
            let inbound = inbound_tx.clone();
            thread::Builder::new()
                .name(format!("rx-{name}"))
                .spawn(move || loop {
                    match rx.next() {
                        Ok(frame) => match inbound.try_send((iface.clone(), frame.to_vec())) {
                            Ok(()) => {}
                            Err(mpsc::error::TrySendError::Full(_)) => {
                                warn!("Inbound queue full, dropping frame from {}", iface);
                            }
                            Err(mpsc::error::TrySendError::Closed(_)) => break,
                        },
                        Err(e) => {
                            error!("Failed to receive on {}: {}", iface, e);
                            break;
                        }
                    }
                })?;

            writers.insert(name.clone(), writer_tx);
        }

        Ok((Self { writers }, inbound_rx))
    }
}

impl Transmit for DatalinkTransport {
    fn send(&self, iface: &str, frame: Vec<u8>) {
        let Some(writer) = self.writers.get(iface) else {
            warn!("No transport for interface {}", iface);
            return;
        };
        if let Err(e) = writer.try_send(frame) {
            warn!("Dropping frame for {}: {}", iface, e);
        }
    }
}

fn find_interface(name: &str) -> Option<NetworkInterface> {
    datalink::interfaces()
        .into_iter()
        .find(|interface| interface.name == name)
}

/// Hardware address the OS reports for `name`.
pub fn interface_mac(name: &str) -> Option<MacAddr> {
    find_interface(name).and_then(|interface| interface.mac)
}
