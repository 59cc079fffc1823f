//! Uniform surface over the NAT-PMP and UPnP clients

use super::types::{MappingError, MappingInfo, Technology, TransportProtocol};
use async_trait::async_trait;
use std::net::IpAddr;

/// A discovered gateway that can create and remove port mappings
///
/// Implementations hide the protocol specifics so the orchestrator only
/// branches on [`Technology`] when it picks which client to call.
#[async_trait]
pub trait MappingClient: Send + Sync {
    /// Which protocol this client speaks
    fn technology(&self) -> Technology;

    /// Create (or with `lifetime_secs == 0` on NAT-PMP, remove) a mapping
    async fn add_mapping(
        &self,
        internal_port: u16,
        external_port: u16,
        protocol: TransportProtocol,
        lifetime_secs: u32,
    ) -> Result<MappingInfo, MappingError>;

    /// Remove a mapping by external port
    ///
    /// NAT-PMP has no delete operation and returns [`MappingError::NotSupported`].
    async fn delete_mapping(
        &self,
        external_port: u16,
        protocol: TransportProtocol,
    ) -> Result<(), MappingError>;

    /// External IPv4 address of the gateway
    async fn external_address(&self) -> Result<IpAddr, MappingError>;
}
