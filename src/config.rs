//! Defaults and server configuration
//!
//! Defaults are passed explicitly to whichever request handler fills in
//! missing protocol or lifetime values; nothing reads them from global state.

use crate::gateway::TransportProtocol;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Default lifetime of a mapping in seconds
pub const DEFAULT_LIFETIME_SECS: u32 = 600;

/// Default port of the RPC service
pub const DEFAULT_RPC_PORT: u16 = 7777;

/// Values used when a request leaves protocol or lifetime out
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MappingDefaults {
    /// Lifetime in seconds
    pub lifetime_secs: u32,
    /// Transport protocol
    pub protocol: TransportProtocol,
}

impl Default for MappingDefaults {
    fn default() -> Self {
        Self {
            lifetime_secs: DEFAULT_LIFETIME_SECS,
            protocol: TransportProtocol::Tcp,
        }
    }
}

/// RPC server configuration
///
/// Stored as JSON. A missing or empty file yields the defaults.
///
/// # Example
/// ```rust,no_run
/// use portmapper::config::ServerConfig;
///
/// let config = ServerConfig::load("portmapper.json").expect("Failed to load");
/// println!("Listening on {}", config.listen);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the RPC service listens on
    pub listen: SocketAddr,
    /// Request defaults
    pub defaults: MappingDefaults,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_RPC_PORT),
            defaults: MappingDefaults::default(),
        }
    }
}

impl ServerConfig {
    /// Load the configuration from a JSON file
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let data = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        if data.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_json::from_str(&data)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Save the configuration as pretty-printed JSON
    pub fn save<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }
}
