//! Portmapper - NAT port mapping over NAT-PMP and UPnP
//!
//! This library opens and closes port mappings on the local gateway. It
//! discovers which of the two protocols the gateway speaks, falls back from
//! NAT-PMP to UPnP when asked to, and removes UPnP mappings once their
//! requested lifetime has passed. It is driven either by the `portmapper` CLI
//! or by the small RPC service in [`rpc`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cli;
pub mod config;
pub mod gateway;
pub mod rpc;

use gateway::MappingError;

/// Result type alias for portmapper operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for portmapper operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Neither NAT-PMP nor UPnP could be discovered
    #[error("no gateways can be found")]
    NoGatewayFound,

    /// The selected protocol was not discovered at startup
    #[error("{0} not available")]
    ProtocolUnavailable(&'static str),

    /// NAT-PMP has no "infinite" lifetime, so a lifetime of 0 cannot open a mapping
    #[error("invalid lifetime: NAT-PMP needs a lifetime of at least 1 second")]
    InvalidLifetime,

    /// A request carried malformed arguments
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A technology selector this service does not implement
    #[error("technology not implemented: {0}")]
    NotImplemented(String),

    /// Protocol-level mapping failure
    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// RPC transport error
    #[error("Transport error: {0}")]
    Transport(String),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// General I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    /// HTTP/Hyper error
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),
}

/// Initialize logging
///
/// Logs go to stderr so that stdout stays free for command output.
pub fn init() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests;
