//! Gateway module for NAT port mapping
//!
//! This module opens and closes port mappings through two protocols:
//! - NAT-PMP (NAT Port Mapping Protocol) - RFC 6886
//! - UPnP IGD (Universal Plug and Play)
//!
//! [`Orchestrator`] discovers which of them the gateway answers, dispatches
//! requests with NAT-PMP → UPnP fallback and closes UPnP mappings when their
//! lifetime runs out.

pub mod client;
pub mod natpmp;
pub mod orchestrator;
pub mod route;
pub mod types;
pub mod upnp;

pub use client::MappingClient;
pub use natpmp::NatPmpClient;
pub use orchestrator::Orchestrator;
pub use route::find_default_gateway;
pub use types::{
    MappingError, MappingInfo, MappingRequest, MappingResult, Outcome, Technology,
    TransportProtocol,
};
pub use upnp::UpnpClient;
