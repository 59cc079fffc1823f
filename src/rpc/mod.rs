//! RPC service exposing `OpenPort` and `ClosePort`
//!
//! The service speaks JSON over HTTP/1.1:
//! - `POST /OpenPort` with an [`OpenPortRequest`]
//! - `POST /ClosePort` with a [`ClosePortRequest`]
//! - `GET /health` returning a [`HealthResponse`]
//!
//! Mapping failures come back as a normal [`StatusResponse`] with
//! `success: "notOk"`. An unknown technology is a contract mismatch and is
//! answered with HTTP 501 instead.

pub mod client;
pub mod server;

pub use client::RpcClient;
pub use server::RpcServer;

use crate::config::MappingDefaults;
use crate::gateway::{MappingRequest, MappingResult, Orchestrator, Technology, TransportProtocol};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

/// Technology names used on the wire
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RpcTechnology {
    /// NAT-PMP with UPnP fallback
    All,
    /// NAT-PMP only
    Natpmp,
    /// UPnP only
    Upnp,
}

impl RpcTechnology {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Natpmp => "natpmp",
            Self::Upnp => "upnp",
        }
    }
}

impl FromStr for RpcTechnology {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "all" => Ok(Self::All),
            "natpmp" => Ok(Self::Natpmp),
            "upnp" => Ok(Self::Upnp),
            other => Err(Error::NotImplemented(other.to_string())),
        }
    }
}

impl From<RpcTechnology> for Technology {
    fn from(technology: RpcTechnology) -> Self {
        match technology {
            RpcTechnology::All => Technology::Auto,
            RpcTechnology::Natpmp => Technology::NatPmp,
            RpcTechnology::Upnp => Technology::Upnp,
        }
    }
}

impl From<Technology> for RpcTechnology {
    fn from(technology: Technology) -> Self {
        match technology {
            Technology::Auto => RpcTechnology::All,
            Technology::NatPmp => RpcTechnology::Natpmp,
            Technology::Upnp => RpcTechnology::Upnp,
        }
    }
}

/// Request body of `OpenPort`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpenPortRequest {
    /// Internal port
    pub local_port: i32,
    /// External port
    pub external_port: i32,
    /// Transport protocol, server default when absent
    #[serde(default)]
    pub protocol: Option<TransportProtocol>,
    /// Lifetime in seconds, server default when absent
    #[serde(default)]
    pub lifetime: Option<i32>,
    /// `all`, `natpmp` or `upnp`; kept as text so unknown values can be told
    /// apart from malformed bodies
    pub technology: String,
}

impl OpenPortRequest {
    /// Wire request for a mapping request
    pub fn from_mapping(request: &MappingRequest) -> Self {
        Self {
            local_port: i32::from(request.internal_port),
            external_port: i32::from(request.external_port),
            protocol: Some(request.protocol),
            lifetime: Some(i32::try_from(request.lifetime_secs).unwrap_or(i32::MAX)),
            technology: RpcTechnology::from(request.technology).as_str().to_string(),
        }
    }
}

/// Request body of `ClosePort`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClosePortRequest {
    /// Internal port
    pub local_port: i32,
    /// External port
    pub external_port: i32,
    /// Transport protocol, server default when absent
    #[serde(default)]
    pub protocol: Option<TransportProtocol>,
    /// `all`, `natpmp` or `upnp`
    pub technology: String,
}

impl ClosePortRequest {
    /// Wire request for a mapping request
    pub fn from_mapping(request: &MappingRequest) -> Self {
        Self {
            local_port: i32::from(request.internal_port),
            external_port: i32::from(request.external_port),
            protocol: Some(request.protocol),
            technology: RpcTechnology::from(request.technology).as_str().to_string(),
        }
    }
}

/// Success flag of a [`StatusResponse`]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Success {
    /// Mapping call succeeded
    Ok,
    /// Mapping call failed
    NotOk,
}

/// Response body of `OpenPort` and `ClosePort`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusResponse {
    /// Whether the call succeeded
    pub success: Success,
    /// Result message
    pub message: String,
    /// Technology that handled the call
    pub technology: RpcTechnology,
}

impl From<&MappingResult> for StatusResponse {
    fn from(result: &MappingResult) -> Self {
        Self {
            success: if result.is_ok() { Success::Ok } else { Success::NotOk },
            message: result.message.clone(),
            technology: result.technology.into(),
        }
    }
}

/// Response body of `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    /// NAT-PMP discovered at startup
    pub natpmp: bool,
    /// UPnP discovered at startup
    pub upnp: bool,
    /// Gateway used for NAT-PMP
    pub natpmp_gateway: Option<IpAddr>,
}

/// Error body for non-200 responses
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
}

fn port(value: i32, name: &str) -> Result<u16> {
    u16::try_from(value).map_err(|_| {
        Error::InvalidArgument(format!("{} must be in 0-65535, got {}", name, value))
    })
}

/// Translates RPC messages into orchestrator calls
pub struct RpcHandler {
    orchestrator: Arc<Orchestrator>,
    defaults: MappingDefaults,
}

impl RpcHandler {
    /// Create a handler over a shared orchestrator
    pub fn new(orchestrator: Arc<Orchestrator>, defaults: MappingDefaults) -> Self {
        Self {
            orchestrator,
            defaults,
        }
    }

    /// Handle `OpenPort`
    pub async fn open_port(&self, request: OpenPortRequest) -> Result<StatusResponse> {
        info!("Open Port called: {:?}", request);
        let technology: RpcTechnology = request.technology.parse()?;

        let lifetime_secs = match request.lifetime {
            Some(lifetime) => u32::try_from(lifetime).map_err(|_| {
                Error::InvalidArgument(format!("lifetime must be non-negative, got {}", lifetime))
            })?,
            None => self.defaults.lifetime_secs,
        };

        let mapping = MappingRequest::new(
            port(request.local_port, "local_port")?,
            port(request.external_port, "external_port")?,
            request.protocol.unwrap_or(self.defaults.protocol),
            lifetime_secs,
            technology.into(),
        );

        let result = self.orchestrator.open_mapping(&mapping).await;
        Ok(StatusResponse::from(&result))
    }

    /// Handle `ClosePort`
    pub async fn close_port(&self, request: ClosePortRequest) -> Result<StatusResponse> {
        info!("Close Port called: {:?}", request);
        let technology: RpcTechnology = request.technology.parse()?;

        let mapping = MappingRequest::new(
            port(request.local_port, "local_port")?,
            port(request.external_port, "external_port")?,
            request.protocol.unwrap_or(self.defaults.protocol),
            0,
            technology.into(),
        );

        let result = self.orchestrator.close_mapping(&mapping).await;
        Ok(StatusResponse::from(&result))
    }

    /// Report which protocols are available
    pub fn health(&self) -> HealthResponse {
        HealthResponse {
            natpmp: self.orchestrator.natpmp_available(),
            upnp: self.orchestrator.upnp_available(),
            natpmp_gateway: self.orchestrator.natpmp_gateway(),
        }
    }
}
