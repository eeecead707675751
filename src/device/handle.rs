use std::sync::Arc;
use btleplug::api::Service;
use tokio_util::sync::CancellationToken;

use crate::device::capability::CapabilityMap;
use crate::device::transport::BlePeripheral;

/// One physical device as seen by the session: the peripheral, what was discovered on it and
/// the listener token of its current connection.
#[derive(Debug)]
pub struct PeripheralHandle {
    pub peripheral: Arc<dyn BlePeripheral>,
    pub attempt: u64,
    pub services: Vec<Service>,
    pub capabilities: CapabilityMap,
    connection: Option<CancellationToken>,
}

impl PeripheralHandle {
    pub fn new(peripheral: Arc<dyn BlePeripheral>, attempt: u64, connection: CancellationToken) -> Self {
        PeripheralHandle {
            peripheral,
            attempt,
            services: Vec::new(),
            capabilities: CapabilityMap::default(),
            connection: Some(connection),
        }
    }

    pub fn attach_capabilities(&mut self, services: Vec<Service>, capabilities: CapabilityMap) {
        self.services = services;
        self.capabilities = capabilities;
    }

    /// Stop every task listening on this connection. Synchronous, so that no notification
    /// task outlives the teardown.
    pub fn detach(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.cancel();
        }
    }
}

impl Drop for PeripheralHandle {
    fn drop(&mut self) {
        self.detach();
    }
}
