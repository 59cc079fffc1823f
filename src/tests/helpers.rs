// Shared test doubles

use crate::gateway::{MappingClient, MappingError, MappingInfo, Technology, TransportProtocol};
use async_trait::async_trait;
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};

pub(crate) const MOCK_EXTERNAL_IP: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 7);

/// A call recorded by [`MockClient`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Call {
    Add {
        internal_port: u16,
        external_port: u16,
        protocol: TransportProtocol,
        lifetime_secs: u32,
    },
    Delete {
        external_port: u16,
        protocol: TransportProtocol,
    },
    ExternalAddress,
}

/// In-memory gateway that records every call
///
/// Adding with lifetime 0 removes a mapping, like NAT-PMP. Removing a mapping
/// that does not exist fails, like a UPnP "NoSuchEntryInArray".
pub(crate) struct MockClient {
    technology: Technology,
    fail_add: bool,
    calls: Mutex<Vec<Call>>,
    mappings: Mutex<HashSet<(u16, TransportProtocol)>>,
}

impl MockClient {
    pub(crate) fn new(technology: Technology) -> Arc<Self> {
        Arc::new(Self {
            technology,
            fail_add: false,
            calls: Mutex::new(Vec::new()),
            mappings: Mutex::new(HashSet::new()),
        })
    }

    /// A client whose add_mapping always fails
    pub(crate) fn failing(technology: Technology) -> Arc<Self> {
        Arc::new(Self {
            technology,
            fail_add: true,
            calls: Mutex::new(Vec::new()),
            mappings: Mutex::new(HashSet::new()),
        })
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn add_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Add { .. }))
            .count()
    }

    pub(crate) fn delete_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Delete { .. }))
            .collect()
    }

    pub(crate) fn is_mapped(&self, external_port: u16, protocol: TransportProtocol) -> bool {
        self.mappings
            .lock()
            .unwrap()
            .contains(&(external_port, protocol))
    }

    fn remove(&self, external_port: u16, protocol: TransportProtocol) -> Result<(), MappingError> {
        if self.mappings.lock().unwrap().remove(&(external_port, protocol)) {
            Ok(())
        } else {
            Err(MappingError::GatewayError(
                "DeletePortMapping failed: no such port mapping".to_string(),
            ))
        }
    }
}

#[async_trait]
impl MappingClient for MockClient {
    fn technology(&self) -> Technology {
        self.technology
    }

    async fn add_mapping(
        &self,
        internal_port: u16,
        external_port: u16,
        protocol: TransportProtocol,
        lifetime_secs: u32,
    ) -> Result<MappingInfo, MappingError> {
        self.calls.lock().unwrap().push(Call::Add {
            internal_port,
            external_port,
            protocol,
            lifetime_secs,
        });

        if self.fail_add {
            return Err(MappingError::GatewayError(format!(
                "{} refused the mapping",
                self.technology
            )));
        }

        if lifetime_secs == 0 && self.technology == Technology::NatPmp {
            self.remove(external_port, protocol)?;
        } else {
            self.mappings.lock().unwrap().insert((external_port, protocol));
        }

        Ok(MappingInfo {
            internal_port,
            external_port,
            lifetime_secs,
            protocol,
            external_ip: None,
            created_at_ms: 1_700_000_000_000,
        })
    }

    async fn delete_mapping(
        &self,
        external_port: u16,
        protocol: TransportProtocol,
    ) -> Result<(), MappingError> {
        self.calls.lock().unwrap().push(Call::Delete {
            external_port,
            protocol,
        });

        if self.technology == Technology::NatPmp {
            return Err(MappingError::NotSupported);
        }
        self.remove(external_port, protocol)
    }

    async fn external_address(&self) -> Result<IpAddr, MappingError> {
        self.calls.lock().unwrap().push(Call::ExternalAddress);
        Ok(IpAddr::V4(MOCK_EXTERNAL_IP))
    }
}

/// Erase a mock into the trait object the orchestrator stores
pub(crate) fn as_client(mock: &Arc<MockClient>) -> Option<Arc<dyn MappingClient>> {
    let client: Arc<dyn MappingClient> = mock.clone();
    Some(client)
}
