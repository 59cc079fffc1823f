//! UPnP IGD (Internet Gateway Device) port mapping client
//!
//! UPnP uses SSDP to discover the IGD on the local network and SOAP to talk to
//! it. Mappings are created without a lease: they stay until deleted, which
//! is why the orchestrator schedules its own expiry close for them.
//!
//! `igd_next`'s gateway API is blocking, so every call runs on the blocking
//! thread pool.

use super::client::MappingClient;
use super::types::{MappingError, MappingInfo, Technology, TransportProtocol};
use async_trait::async_trait;
use chrono::Utc;
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default timeout for the SSDP gateway search
const UPNP_SEARCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Lease requested from the gateway; 0 means "until deleted"
const UPNP_LEASE_SECS: u32 = 0;

/// UPnP client bound to one discovered IGD
pub struct UpnpClient {
    gateway: igd_next::Gateway,
    local_ip: IpAddr,
}

impl UpnpClient {
    /// Search the local network for an IGD and build a client for it
    pub async fn discover() -> Result<Self, MappingError> {
        debug!("Searching for UPnP IGD gateway...");

        tokio::task::spawn_blocking(|| {
            let gateway = igd_next::search_gateway(igd_next::SearchOptions {
                timeout: Some(UPNP_SEARCH_TIMEOUT),
                ..Default::default()
            })
            .map_err(|e| {
                debug!("UPnP gateway search failed: {}", e);
                MappingError::NoGateway
            })?;

            let local_ip = local_ip_toward(gateway.addr)?;
            info!("Found UPnP gateway at {} (local address {})", gateway.addr, local_ip);

            Ok(Self { gateway, local_ip })
        })
        .await
        .map_err(|e| MappingError::Internal(format!("Task join error: {}", e)))?
    }

    /// Address of the IGD's control endpoint
    pub fn gateway_addr(&self) -> SocketAddr {
        self.gateway.addr
    }
}

#[async_trait]
impl MappingClient for UpnpClient {
    fn technology(&self) -> Technology {
        Technology::Upnp
    }

    async fn add_mapping(
        &self,
        internal_port: u16,
        external_port: u16,
        protocol: TransportProtocol,
        _lifetime_secs: u32,
    ) -> Result<MappingInfo, MappingError> {
        let gateway = self.gateway.clone();
        let local_addr = SocketAddr::new(self.local_ip, internal_port);
        let description = mapping_description(protocol, external_port);

        debug!(
            "Adding UPnP port mapping: {} -> {} ({})",
            external_port, local_addr, protocol
        );

        tokio::task::spawn_blocking(move || {
            gateway
                .add_port(
                    upnp_protocol(protocol),
                    external_port,
                    local_addr,
                    UPNP_LEASE_SECS,
                    &description,
                )
                .map_err(|e| {
                    warn!("UPnP AddPortMapping failed: {}", e);
                    MappingError::GatewayError(format!("AddPortMapping failed: {}", e))
                })
        })
        .await
        .map_err(|e| MappingError::Internal(format!("Task join error: {}", e)))??;

        info!("Port mapping for UPnP successful: {} -> {}", external_port, local_addr);

        Ok(MappingInfo {
            internal_port,
            external_port,
            lifetime_secs: UPNP_LEASE_SECS,
            protocol,
            external_ip: None,
            created_at_ms: Utc::now().timestamp_millis(),
        })
    }

    async fn delete_mapping(
        &self,
        external_port: u16,
        protocol: TransportProtocol,
    ) -> Result<(), MappingError> {
        let gateway = self.gateway.clone();

        tokio::task::spawn_blocking(move || {
            gateway
                .remove_port(upnp_protocol(protocol), external_port)
                .map_err(|e| MappingError::GatewayError(format!("DeletePortMapping failed: {}", e)))
        })
        .await
        .map_err(|e| MappingError::Internal(format!("Task join error: {}", e)))??;

        info!("UPnP port mapping {}/{} deleted", external_port, protocol);
        Ok(())
    }

    async fn external_address(&self) -> Result<IpAddr, MappingError> {
        let gateway = self.gateway.clone();

        tokio::task::spawn_blocking(move || {
            gateway
                .get_external_ip()
                .map_err(|e| MappingError::GatewayError(format!("GetExternalIPAddress failed: {}", e)))
        })
        .await
        .map_err(|e| MappingError::Internal(format!("Task join error: {}", e)))?
    }
}

pub(crate) fn upnp_protocol(protocol: TransportProtocol) -> igd_next::PortMappingProtocol {
    match protocol {
        TransportProtocol::Tcp => igd_next::PortMappingProtocol::TCP,
        TransportProtocol::Udp => igd_next::PortMappingProtocol::UDP,
    }
}

pub(crate) fn mapping_description(protocol: TransportProtocol, external_port: u16) -> String {
    format!("portmapper-{}-{}", protocol, external_port)
}

/// Local address the kernel would use to reach `gateway`
///
/// Connecting a UDP socket sends nothing; it only selects a route.
fn local_ip_toward(gateway: SocketAddr) -> Result<IpAddr, MappingError> {
    let socket = UdpSocket::bind("0.0.0.0:0")
        .map_err(|e| MappingError::Internal(format!("Failed to create socket: {}", e)))?;

    socket
        .connect(gateway)
        .map_err(|e| MappingError::Internal(format!("Failed to connect: {}", e)))?;

    let local_addr = socket
        .local_addr()
        .map_err(|e| MappingError::Internal(format!("Failed to get local address: {}", e)))?;

    match local_addr.ip() {
        ip @ IpAddr::V4(_) => Ok(ip),
        IpAddr::V6(_) => Err(MappingError::Internal(
            "UPnP requires IPv4 address".to_string(),
        )),
    }
}
