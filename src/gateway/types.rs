//! Common types for the gateway module

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use thiserror::Error;

/// Transport protocol of a mapping
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TransportProtocol {
    /// TCP
    #[default]
    Tcp,
    /// UDP
    Udp,
}

impl TransportProtocol {
    /// Lowercase protocol name as used on the command line and on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportProtocol {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            other => Err(crate::Error::InvalidArgument(format!(
                "unknown protocol '{}' (expected tcp or udp)",
                other
            ))),
        }
    }
}

/// Which mapping protocol(s) a request may use
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Technology {
    /// Try NAT-PMP first, fall back to UPnP
    #[default]
    Auto,
    /// NAT-PMP only (RFC 6886)
    NatPmp,
    /// UPnP IGD only
    Upnp,
}

impl Technology {
    /// Human readable name used in log lines and result messages
    pub fn label(&self) -> &'static str {
        match self {
            Self::Auto => "NAT-PMP/UPnP",
            Self::NatPmp => "NAT-PMP",
            Self::Upnp => "UPnP",
        }
    }
}

impl fmt::Display for Technology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A request to open or close one mapping
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MappingRequest {
    /// Port on the local host
    pub internal_port: u16,
    /// Port on the gateway's external interface
    pub external_port: u16,
    /// Transport protocol of the mapping
    pub protocol: TransportProtocol,
    /// Requested lifetime in seconds (0 = delete / no expiry tracking)
    pub lifetime_secs: u32,
    /// Protocol selector
    pub technology: Technology,
}

impl MappingRequest {
    /// Create a new mapping request
    pub fn new(
        internal_port: u16,
        external_port: u16,
        protocol: TransportProtocol,
        lifetime_secs: u32,
        technology: Technology,
    ) -> Self {
        Self {
            internal_port,
            external_port,
            protocol,
            lifetime_secs,
            technology,
        }
    }
}

/// What a gateway reported back for a mapping
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MappingInfo {
    /// Internal port the gateway forwards to
    pub internal_port: u16,
    /// External port actually mapped (may differ from the requested one)
    pub external_port: u16,
    /// Lifetime granted by the gateway in seconds (0 for UPnP, which has no lease)
    pub lifetime_secs: u32,
    /// Transport protocol of the mapping
    pub protocol: TransportProtocol,
    /// External IP address, if it was queried
    pub external_ip: Option<IpAddr>,
    /// Timestamp when the mapping was created (Unix milliseconds)
    pub created_at_ms: i64,
}

/// Outcome of an open or close call
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// The mapping call succeeded
    Ok,
    /// Every attempted protocol failed
    Failed,
}

/// Normalized result of an open or close call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MappingResult {
    /// Whether the call succeeded
    pub outcome: Outcome,
    /// Human readable message (the failure cause when failed)
    pub message: String,
    /// Technology actually used, or the selector when nothing succeeded
    pub technology: Technology,
    /// Gateway answer for a successful open
    pub mapping: Option<MappingInfo>,
    /// Seconds until the scheduled UPnP expiry close, if one was scheduled
    pub expires_in_secs: Option<u32>,
}

impl MappingResult {
    /// Successful result
    pub fn succeeded(
        technology: Technology,
        message: impl Into<String>,
        mapping: Option<MappingInfo>,
    ) -> Self {
        Self {
            outcome: Outcome::Ok,
            message: message.into(),
            technology,
            mapping,
            expires_in_secs: None,
        }
    }

    /// Failed result
    pub fn failed(technology: Technology, message: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Failed,
            message: message.into(),
            technology,
            mapping: None,
            expires_in_secs: None,
        }
    }

    /// Record that an expiry close was scheduled
    pub(crate) fn with_expiry(mut self, expires_in_secs: Option<u32>) -> Self {
        self.expires_in_secs = expires_in_secs;
        self
    }

    /// Check if the call succeeded
    pub fn is_ok(&self) -> bool {
        self.outcome == Outcome::Ok
    }
}

/// Errors that can occur while talking to a gateway
#[derive(Debug, Error)]
pub enum MappingError {
    /// Network timeout waiting for response
    #[error("Mapping request timed out")]
    Timeout,

    /// Invalid response from gateway
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Gateway returned an error
    #[error("Gateway error: {0}")]
    GatewayError(String),

    /// No gateway found on network
    #[error("No gateway found")]
    NoGateway,

    /// IO error during communication
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation not supported by this protocol
    #[error("Operation not supported")]
    NotSupported,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
