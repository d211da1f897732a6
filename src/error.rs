use std::net::Ipv4Addr;

use thiserror::Error;

/// Errors raised while setting up or reconfiguring the router.
#[derive(Debug, Error)]
pub enum Error {
    #[error("no interfaces configured")]
    NoInterfaces,
    #[error("interface {0} configured more than once")]
    DuplicateInterface(String),
    #[error("unknown interface {0}")]
    UnknownInterface(String),
    #[error("invalid MAC address {0:?}")]
    InvalidMacAddr(String),
    #[error("invalid network mask {0}")]
    InvalidMask(Ipv4Addr),
    #[error("failed to read configuration: {0}")]
    ConfigIo(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

/// PWOSPF wire decoding errors.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum DecodeError {
    #[error("incomplete packet header")]
    IncompleteHeader,
    #[error("unsupported version {0}")]
    InvalidVersion(u8),
    #[error("unknown packet type {0}")]
    UnknownPacketType(u8),
    #[error("invalid packet length {0}")]
    InvalidLength(u16),
    #[error("incomplete packet body")]
    IncompleteBody,
    #[error("invalid checksum")]
    InvalidChecksum,
}

pub type DecodeResult<T> = Result<T, DecodeError>;
