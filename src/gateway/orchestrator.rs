//! Gateway orchestrator - protocol selection, fallback and UPnP expiry
//!
//! The orchestrator owns at most one client per protocol, decided once at
//! construction. Open and close calls either go to a pinned protocol or try
//! NAT-PMP first and fall back to UPnP. Every protocol error is folded into a
//! [`MappingResult`]; callers never see a raw [`MappingError`].
//!
//! UPnP mappings have no lease, so a successful UPnP open with a nonzero
//! lifetime spawns a detached task that deletes the mapping once the lifetime
//! has passed. The task cannot be cancelled. If an explicit close beats it,
//! its own delete fails with a "no such mapping" style error that is logged
//! and dropped.

use super::client::MappingClient;
use super::natpmp::NatPmpClient;
use super::types::{MappingInfo, MappingRequest, MappingResult, Technology, TransportProtocol};
use super::upnp::UpnpClient;
use crate::{Error, Result};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

const OPEN_SUCCESS: &str = "opening of port successful";
const CLOSE_SUCCESS: &str = "closing of port successful";

/// Dispatches mapping requests to the protocols found at startup
pub struct Orchestrator {
    natpmp: Option<Arc<dyn MappingClient>>,
    upnp: Option<Arc<dyn MappingClient>>,
    natpmp_gateway: Option<IpAddr>,
    /// Number of expiry tasks that have not fired yet
    pending_expiries: Arc<watch::Sender<usize>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("natpmp", &self.natpmp.is_some())
            .field("upnp", &self.upnp.is_some())
            .field("natpmp_gateway", &self.natpmp_gateway)
            .field("pending_expiries", &*self.pending_expiries.borrow())
            .finish()
    }
}

impl Orchestrator {
    /// Discover NAT-PMP and UPnP gateways
    ///
    /// Each failed discovery only disables that protocol. Fails with
    /// [`Error::NoGatewayFound`] when neither protocol is available.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use portmapper::gateway::{MappingRequest, Orchestrator, Technology, TransportProtocol};
    ///
    /// # async fn example() -> portmapper::Result<()> {
    /// let orchestrator = Orchestrator::discover().await?;
    /// let request = MappingRequest::new(8080, 8080, TransportProtocol::Tcp, 600, Technology::Auto);
    /// let result = orchestrator.open_mapping(&request).await;
    /// println!("{:?}: {}", result.outcome, result.message);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn discover() -> Result<Self> {
        info!("Discovering gateways (NAT-PMP, UPnP)");

        let natpmp = match NatPmpClient::discover() {
            Ok(client) => {
                info!("NAT-PMP gateway found at {}", client.gateway());
                Some(client)
            }
            Err(e) => {
                warn!("NAT-PMP could not find gateway: {}", e);
                None
            }
        };
        let natpmp_gateway = natpmp.as_ref().map(NatPmpClient::gateway);

        let upnp = match UpnpClient::discover().await {
            Ok(client) => {
                info!("UPnP gateway found at {}", client.gateway_addr());
                Some(client)
            }
            Err(e) => {
                warn!("UPnP could not find gateway: {}", e);
                None
            }
        };

        let mut orchestrator = Self::from_clients(
            natpmp.map(|c| Arc::new(c) as Arc<dyn MappingClient>),
            upnp.map(|c| Arc::new(c) as Arc<dyn MappingClient>),
        )?;
        orchestrator.natpmp_gateway = natpmp_gateway;
        Ok(orchestrator)
    }

    /// Build an orchestrator from already constructed clients
    ///
    /// Each client must speak the protocol of the slot it is passed in.
    pub fn from_clients(
        natpmp: Option<Arc<dyn MappingClient>>,
        upnp: Option<Arc<dyn MappingClient>>,
    ) -> Result<Self> {
        if natpmp.is_none() && upnp.is_none() {
            error!("Neither NAT-PMP nor UPnP is available");
            return Err(Error::NoGatewayFound);
        }

        for (client, expected) in [(&natpmp, Technology::NatPmp), (&upnp, Technology::Upnp)] {
            if let Some(client) = client {
                if client.technology() != expected {
                    return Err(Error::InvalidArgument(format!(
                        "{} client passed as the {} client",
                        client.technology(),
                        expected
                    )));
                }
                debug!("{} client registered", expected);
            }
        }

        let (pending_expiries, _) = watch::channel(0usize);

        Ok(Self {
            natpmp,
            upnp,
            natpmp_gateway: None,
            pending_expiries: Arc::new(pending_expiries),
        })
    }

    /// Whether NAT-PMP was discovered at startup
    pub fn natpmp_available(&self) -> bool {
        self.natpmp.is_some()
    }

    /// Whether UPnP was discovered at startup
    pub fn upnp_available(&self) -> bool {
        self.upnp.is_some()
    }

    /// Default gateway used for NAT-PMP, when found by route discovery
    pub fn natpmp_gateway(&self) -> Option<IpAddr> {
        self.natpmp_gateway
    }

    /// Open a mapping
    pub async fn open_mapping(&self, request: &MappingRequest) -> MappingResult {
        info!(
            "Open mapping {} -> {} ({}, lifetime {}s) via {}",
            request.external_port,
            request.internal_port,
            request.protocol,
            request.lifetime_secs,
            request.technology
        );

        let result = match request.technology {
            Technology::NatPmp => match self.open_natpmp(request).await {
                Ok(info) => MappingResult::succeeded(Technology::NatPmp, OPEN_SUCCESS, Some(info)),
                Err(e) => MappingResult::failed(Technology::NatPmp, e.to_string()),
            },
            Technology::Upnp => match self.open_upnp(request).await {
                Ok((info, expiry)) => {
                    MappingResult::succeeded(Technology::Upnp, OPEN_SUCCESS, Some(info))
                        .with_expiry(expiry)
                }
                Err(e) => MappingResult::failed(Technology::Upnp, e.to_string()),
            },
            Technology::Auto => {
                let natpmp_error = match self.open_natpmp(request).await {
                    Ok(info) => {
                        return MappingResult::succeeded(Technology::NatPmp, OPEN_SUCCESS, Some(info));
                    }
                    Err(e) => {
                        debug!("NAT-PMP open failed, trying UPnP: {}", e);
                        e
                    }
                };

                match self.open_upnp(request).await {
                    Ok((info, expiry)) => {
                        MappingResult::succeeded(Technology::Upnp, OPEN_SUCCESS, Some(info))
                            .with_expiry(expiry)
                    }
                    Err(upnp_error) => MappingResult::failed(
                        Technology::Auto,
                        combine_errors(&natpmp_error, &upnp_error),
                    ),
                }
            }
        };

        log_result("open", &result);
        result
    }

    /// Close a mapping
    pub async fn close_mapping(&self, request: &MappingRequest) -> MappingResult {
        info!(
            "Close mapping {} -> {} ({}) via {}",
            request.external_port, request.internal_port, request.protocol, request.technology
        );

        let result = match request.technology {
            Technology::NatPmp => match self.close_natpmp(request).await {
                Ok(()) => MappingResult::succeeded(Technology::NatPmp, CLOSE_SUCCESS, None),
                Err(e) => MappingResult::failed(Technology::NatPmp, e.to_string()),
            },
            Technology::Upnp => match self.close_upnp(request).await {
                Ok(()) => MappingResult::succeeded(Technology::Upnp, CLOSE_SUCCESS, None),
                Err(e) => MappingResult::failed(Technology::Upnp, e.to_string()),
            },
            Technology::Auto => {
                let natpmp_error = match self.close_natpmp(request).await {
                    Ok(()) => {
                        return MappingResult::succeeded(Technology::NatPmp, CLOSE_SUCCESS, None);
                    }
                    Err(e) => {
                        debug!("NAT-PMP close failed, trying UPnP: {}", e);
                        e
                    }
                };

                match self.close_upnp(request).await {
                    Ok(()) => MappingResult::succeeded(Technology::Upnp, CLOSE_SUCCESS, None),
                    Err(upnp_error) => MappingResult::failed(
                        Technology::Auto,
                        combine_errors(&natpmp_error, &upnp_error),
                    ),
                }
            }
        };

        log_result("close", &result);
        result
    }

    /// External IPv4 address reported by the selected gateway
    ///
    /// `Auto` asks NAT-PMP first, then UPnP.
    pub async fn external_address(&self, technology: Technology) -> Result<IpAddr> {
        match technology {
            Technology::NatPmp => Ok(self.natpmp_client()?.external_address().await?),
            Technology::Upnp => Ok(self.upnp_client()?.external_address().await?),
            Technology::Auto => {
                let natpmp_error = match self.natpmp_client() {
                    Ok(client) => match client.external_address().await {
                        Ok(ip) => return Ok(ip),
                        Err(e) => Error::from(e),
                    },
                    Err(e) => e,
                };
                debug!("NAT-PMP external address unavailable: {}", natpmp_error);
                Ok(self.upnp_client()?.external_address().await?)
            }
        }
    }

    /// Wait until every scheduled expiry close has run
    ///
    /// Returns immediately when nothing is scheduled. Used by the standalone
    /// CLI so a UPnP mapping with a lifetime is removed before it exits.
    pub async fn wait_for_expiries(&self) {
        let mut pending = self.pending_expiries.subscribe();
        let _ = pending.wait_for(|count| *count == 0).await;
    }

    fn natpmp_client(&self) -> Result<&Arc<dyn MappingClient>> {
        self.natpmp
            .as_ref()
            .ok_or(Error::ProtocolUnavailable(Technology::NatPmp.label()))
    }

    fn upnp_client(&self) -> Result<&Arc<dyn MappingClient>> {
        self.upnp
            .as_ref()
            .ok_or(Error::ProtocolUnavailable(Technology::Upnp.label()))
    }

    async fn open_natpmp(&self, request: &MappingRequest) -> Result<MappingInfo> {
        if request.lifetime_secs < 1 {
            return Err(Error::InvalidLifetime);
        }
        let client = self.natpmp_client()?;

        let mut info = client
            .add_mapping(
                request.internal_port,
                request.external_port,
                request.protocol,
                request.lifetime_secs,
            )
            .await?;

        match client.external_address().await {
            Ok(ip) => info.external_ip = Some(ip),
            Err(e) => debug!("NAT-PMP could not get external ip: {}", e),
        }

        Ok(info)
    }

    async fn close_natpmp(&self, request: &MappingRequest) -> Result<()> {
        let client = self.natpmp_client()?;
        client
            .add_mapping(request.internal_port, request.external_port, request.protocol, 0)
            .await?;
        Ok(())
    }

    /// Open via UPnP, returning the scheduled expiry in seconds if any
    async fn open_upnp(&self, request: &MappingRequest) -> Result<(MappingInfo, Option<u32>)> {
        let client = self.upnp_client()?;
        let info = client
            .add_mapping(
                request.internal_port,
                request.external_port,
                request.protocol,
                request.lifetime_secs,
            )
            .await?;

        let expiry = if request.lifetime_secs > 0 {
            self.schedule_expiry(
                Arc::clone(client),
                request.external_port,
                request.protocol,
                request.lifetime_secs,
            );
            Some(request.lifetime_secs)
        } else {
            None
        };

        Ok((info, expiry))
    }

    async fn close_upnp(&self, request: &MappingRequest) -> Result<()> {
        let client = self.upnp_client()?;
        client
            .delete_mapping(request.external_port, request.protocol)
            .await?;
        Ok(())
    }

    /// Spawn the detached task that deletes a UPnP mapping after its lifetime
    fn schedule_expiry(
        &self,
        client: Arc<dyn MappingClient>,
        external_port: u16,
        protocol: TransportProtocol,
        lifetime_secs: u32,
    ) {
        info!(
            "UPnP mapping {}/{} will be closed in {}s",
            external_port, protocol, lifetime_secs
        );

        self.pending_expiries.send_modify(|count| *count += 1);
        let pending = Arc::clone(&self.pending_expiries);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(u64::from(lifetime_secs))).await;

            info!(
                "Lifetime of UPnP mapping {}/{} elapsed, closing it",
                external_port, protocol
            );
            match client.delete_mapping(external_port, protocol).await {
                Ok(()) => info!("Expired UPnP mapping {}/{} closed", external_port, protocol),
                Err(e) => warn!(
                    "Closing expired UPnP mapping {}/{} failed: {}",
                    external_port, protocol, e
                ),
            }

            pending.send_modify(|count| *count = count.saturating_sub(1));
        });
    }
}

fn combine_errors(natpmp_error: &Error, upnp_error: &Error) -> String {
    format!("NAT-PMP: {}, UPnP: {}", natpmp_error, upnp_error)
}

fn log_result(operation: &str, result: &MappingResult) {
    if result.is_ok() {
        info!("{} via {} succeeded", operation, result.technology);
    } else {
        warn!("{} via {} failed: {}", operation, result.technology, result.message);
    }
}
