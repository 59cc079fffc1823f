//! NAT-PMP (NAT Port Mapping Protocol) client - RFC 6886
//!
//! NAT-PMP talks UDP to port 5351 of the default gateway. Every mapping has a
//! lease, so a mapping is removed by requesting it again with a lifetime of 0.
//!
//! # Example
//!
//! ```no_run
//! use portmapper::gateway::{MappingClient, NatPmpClient, TransportProtocol};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = NatPmpClient::discover()?;
//! let info = client.add_mapping(8080, 8080, TransportProtocol::Tcp, 3600).await?;
//! println!("Mapped external port {} for {}s", info.external_port, info.lifetime_secs);
//! # Ok(())
//! # }
//! ```

use super::client::MappingClient;
use super::route::find_default_gateway;
use super::types::{MappingError, MappingInfo, Technology, TransportProtocol};
use async_trait::async_trait;
use chrono::Utc;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// NAT-PMP server port (IANA assigned)
pub const NATPMP_SERVER_PORT: u16 = 5351;

/// NAT-PMP protocol version
pub(crate) const NATPMP_VERSION: u8 = 0;

/// First retransmission delay; doubles after every unanswered request
const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Requests sent before giving up (250 ms + 500 ms + 1 s + 2 s)
const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// NAT-PMP opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum NatPmpOpcode {
    /// External address request
    ExternalAddress = 0,
    /// UDP port mapping
    MapUdp = 1,
    /// TCP port mapping
    MapTcp = 2,
}

impl NatPmpOpcode {
    fn for_protocol(protocol: TransportProtocol) -> Self {
        match protocol {
            TransportProtocol::Udp => Self::MapUdp,
            TransportProtocol::Tcp => Self::MapTcp,
        }
    }

    /// Opcode the gateway uses in its reply
    fn response(self) -> u8 {
        128 + self as u8
    }
}

/// NAT-PMP result codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub(crate) enum NatPmpResultCode {
    Success = 0,
    UnsupportedVersion = 1,
    NotAuthorized = 2,
    NetworkFailure = 3,
    OutOfResources = 4,
    UnsupportedOpcode = 5,
}

impl NatPmpResultCode {
    pub(crate) fn from_u16(code: u16) -> Option<Self> {
        match code {
            0 => Some(Self::Success),
            1 => Some(Self::UnsupportedVersion),
            2 => Some(Self::NotAuthorized),
            3 => Some(Self::NetworkFailure),
            4 => Some(Self::OutOfResources),
            5 => Some(Self::UnsupportedOpcode),
            _ => None,
        }
    }

    pub(crate) fn to_error_message(&self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::UnsupportedVersion => "Unsupported NAT-PMP version",
            Self::NotAuthorized => "Not authorized/refused",
            Self::NetworkFailure => "Network failure",
            Self::OutOfResources => "Out of resources",
            Self::UnsupportedOpcode => "Unsupported opcode",
        }
    }
}

/// Decoded MAP response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MapResponse {
    pub(crate) epoch_secs: u32,
    pub(crate) internal_port: u16,
    pub(crate) external_port: u16,
    pub(crate) lifetime_secs: u32,
}

/// NAT-PMP client bound to one gateway
pub struct NatPmpClient {
    server: SocketAddr,
    max_attempts: u32,
    /// One request in flight at a time
    exchange_lock: Mutex<()>,
}

impl NatPmpClient {
    /// Client for the NAT-PMP service of `gateway`
    pub fn new(gateway: Ipv4Addr) -> Self {
        Self::with_server_addr(SocketAddr::new(IpAddr::V4(gateway), NATPMP_SERVER_PORT))
    }

    /// Client for a NAT-PMP service at an explicit address
    pub fn with_server_addr(server: SocketAddr) -> Self {
        Self {
            server,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            exchange_lock: Mutex::new(()),
        }
    }

    /// Override how many times a request is sent before timing out
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Locate the default gateway and build a client for it
    pub fn discover() -> Result<Self, MappingError> {
        let gateway = find_default_gateway()?;
        debug!("Found default gateway: {}", gateway);
        Ok(Self::new(gateway))
    }

    /// Gateway address this client talks to
    pub fn gateway(&self) -> IpAddr {
        self.server.ip()
    }

    /// Send `request` and wait for a reply, retransmitting with exponential backoff
    async fn exchange(&self, request: &[u8], response: &mut [u8]) -> Result<usize, MappingError> {
        let _guard = self.exchange_lock.lock().await;

        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(self.server).await?;

        let mut delay = INITIAL_RETRY_DELAY;
        for attempt in 1..=self.max_attempts {
            socket.send(request).await?;
            debug!(
                "Sent NAT-PMP request to {} (attempt {}/{})",
                self.server, attempt, self.max_attempts
            );

            match tokio::time::timeout(delay, socket.recv(response)).await {
                Ok(Ok(received)) => {
                    debug!("Received {} bytes from NAT-PMP server", received);
                    return Ok(received);
                }
                Ok(Err(e)) => return Err(MappingError::Io(e)),
                Err(_) => delay *= 2,
            }
        }

        Err(MappingError::Timeout)
    }
}

#[async_trait]
impl MappingClient for NatPmpClient {
    fn technology(&self) -> Technology {
        Technology::NatPmp
    }

    async fn add_mapping(
        &self,
        internal_port: u16,
        external_port: u16,
        protocol: TransportProtocol,
        lifetime_secs: u32,
    ) -> Result<MappingInfo, MappingError> {
        info!(
            "NAT-PMP mapping {} -> {} (lifetime: {}s, protocol: {})",
            external_port, internal_port, lifetime_secs, protocol
        );

        let opcode = NatPmpOpcode::for_protocol(protocol);
        let request = build_natpmp_map_request(internal_port, external_port, lifetime_secs, protocol);
        let mut buf = [0u8; 16];
        let received = self.exchange(&request, &mut buf).await?;
        let response = parse_natpmp_map_response(&buf[..received], opcode)?;
        debug!("Gateway epoch: {}s", response.epoch_secs);

        info!(
            "Port mapping for NAT-PMP: external port {}, internal port {}, lifetime {}s",
            response.external_port, response.internal_port, response.lifetime_secs
        );

        Ok(MappingInfo {
            internal_port: response.internal_port,
            external_port: response.external_port,
            lifetime_secs: response.lifetime_secs,
            protocol,
            external_ip: None,
            created_at_ms: Utc::now().timestamp_millis(),
        })
    }

    async fn delete_mapping(
        &self,
        _external_port: u16,
        _protocol: TransportProtocol,
    ) -> Result<(), MappingError> {
        Err(MappingError::NotSupported)
    }

    async fn external_address(&self) -> Result<IpAddr, MappingError> {
        let request = [NATPMP_VERSION, NatPmpOpcode::ExternalAddress as u8];
        let mut buf = [0u8; 12];
        let received = self.exchange(&request, &mut buf).await?;
        let ip = parse_natpmp_external_address_response(&buf[..received])?;
        debug!("NAT-PMP external address: {}", ip);
        Ok(IpAddr::V4(ip))
    }
}

/// Build a NAT-PMP MAP request packet
pub(crate) fn build_natpmp_map_request(
    internal_port: u16,
    suggested_external_port: u16,
    lifetime_secs: u32,
    protocol: TransportProtocol,
) -> [u8; 12] {
    let mut request = [0u8; 12];
    request[0] = NATPMP_VERSION;
    request[1] = NatPmpOpcode::for_protocol(protocol) as u8;
    // bytes 2..4 reserved
    request[4..6].copy_from_slice(&internal_port.to_be_bytes());
    request[6..8].copy_from_slice(&suggested_external_port.to_be_bytes());
    request[8..12].copy_from_slice(&lifetime_secs.to_be_bytes());
    request
}

/// Check version, opcode and result code shared by every response
///
/// Error replies may be shorter than a full response (an unsupported version
/// reply is 8 bytes), so only the 4-byte header is required here.
fn check_natpmp_header(response: &[u8], expected_opcode: u8) -> Result<(), MappingError> {
    if response.len() < 4 {
        return Err(MappingError::InvalidResponse(format!(
            "Response too short: {} bytes",
            response.len()
        )));
    }

    let version = response[0];
    if version != NATPMP_VERSION {
        return Err(MappingError::InvalidResponse(format!(
            "Invalid version: {} (expected {})",
            version, NATPMP_VERSION
        )));
    }

    let opcode = response[1];
    if opcode != expected_opcode {
        return Err(MappingError::InvalidResponse(format!(
            "Invalid opcode: {} (expected {})",
            opcode, expected_opcode
        )));
    }

    let result_code = u16::from_be_bytes([response[2], response[3]]);
    let result = NatPmpResultCode::from_u16(result_code).ok_or_else(|| {
        MappingError::InvalidResponse(format!("Unknown result code: {}", result_code))
    })?;

    if result != NatPmpResultCode::Success {
        return Err(MappingError::GatewayError(
            result.to_error_message().to_string(),
        ));
    }

    Ok(())
}

/// Parse a NAT-PMP MAP response packet
pub(crate) fn parse_natpmp_map_response(
    response: &[u8],
    request_opcode: NatPmpOpcode,
) -> Result<MapResponse, MappingError> {
    check_natpmp_header(response, request_opcode.response())?;

    if response.len() < 16 {
        return Err(MappingError::InvalidResponse(format!(
            "Response too short: {} bytes (expected 16)",
            response.len()
        )));
    }

    Ok(MapResponse {
        epoch_secs: u32::from_be_bytes([response[4], response[5], response[6], response[7]]),
        internal_port: u16::from_be_bytes([response[8], response[9]]),
        external_port: u16::from_be_bytes([response[10], response[11]]),
        lifetime_secs: u32::from_be_bytes([response[12], response[13], response[14], response[15]]),
    })
}

/// Parse a NAT-PMP external address response packet
pub(crate) fn parse_natpmp_external_address_response(
    response: &[u8],
) -> Result<Ipv4Addr, MappingError> {
    check_natpmp_header(response, NatPmpOpcode::ExternalAddress.response())?;

    if response.len() < 12 {
        return Err(MappingError::InvalidResponse(format!(
            "External IP response too short: {} bytes",
            response.len()
        )));
    }

    Ok(Ipv4Addr::new(
        response[8],
        response[9],
        response[10],
        response[11],
    ))
}
