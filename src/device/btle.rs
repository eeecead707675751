use std::error::Error;
use std::fmt;
use std::sync::Arc;
use async_trait::async_trait;
use btleplug::api::{Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, Service, ValueNotification};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use futures::stream::BoxStream;
use log::{debug, info, warn};
use tokio::time::{sleep, Duration, Instant};

use crate::device::constants::{MIDI_SERVICE, POLL_DELAY};
use crate::device::transport::{BlePeripheral, DeviceSelector};
use crate::device::types::DeviceId;
use crate::error::SessionError;

pub struct BtlePeripheral {
    id: DeviceId,
    name: Option<String>,
    peripheral: Peripheral,
    adapter: Adapter,
}

impl fmt::Debug for BtlePeripheral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BtlePeripheral")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl BlePeripheral for BtlePeripheral {
    fn id(&self) -> DeviceId {
        self.id.clone()
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    async fn connect(&self) -> btleplug::Result<()> {
        self.peripheral.connect().await
    }

    async fn disconnect(&self) -> btleplug::Result<()> {
        self.peripheral.disconnect().await
    }

    async fn discover_services(&self) -> btleplug::Result<Vec<Service>> {
        self.peripheral.discover_services().await?;
        Ok(self.peripheral.services().into_iter().collect())
    }

    async fn subscribe(&self, characteristic: &Characteristic) -> btleplug::Result<()> {
        self.peripheral.subscribe(characteristic).await
    }

    async fn unsubscribe(&self, characteristic: &Characteristic) -> btleplug::Result<()> {
        self.peripheral.unsubscribe(characteristic).await
    }

    async fn read(&self, characteristic: &Characteristic) -> btleplug::Result<Vec<u8>> {
        self.peripheral.read(characteristic).await
    }

    async fn notifications(&self) -> btleplug::Result<BoxStream<'static, ValueNotification>> {
        Ok(self.peripheral.notifications().await?)
    }

    async fn wait_for_disconnect(&self) -> btleplug::Result<()> {
        let target = self.peripheral.id();
        let mut events = self.adapter.events().await?;

        while let Some(event) = events.next().await {
            if let CentralEvent::DeviceDisconnected(id) = event {
                if id == target {
                    return Ok(());
                }
            }
        }

        // the adapter went away, which is a lost link as well
        Ok(())
    }
}

pub struct BtleSelector {
    manager: Manager,
    scan_timeout: Duration,
}

impl BtleSelector {
    pub async fn new(scan_timeout: Duration) -> Result<Self, SessionError> {
        let manager = Manager::new().await?;
        Ok(BtleSelector { manager, scan_timeout })
    }
}

async fn start_scanning(manager: &Manager) -> Result<Vec<Adapter>, SessionError> {
    let adapters = manager.adapters().await?;

    let filter = ScanFilter {
        services: vec![MIDI_SERVICE],
    };

    for adapter in &adapters {
        info!("Scanning using adapter {}...", adapter.adapter_info().await.unwrap_or("UNKNOWN".to_string()));
        adapter.start_scan(filter.clone()).await?;
    }

    Ok(adapters)
}

async fn stop_scanning(adapters: &[Adapter]) {
    for adapter in adapters {
        if let Err(err) = adapter.stop_scan().await {
            warn!("Failed to stop scanning: {:?}", err);
        }
    }
}

async fn find_peripheral(adapters: &[Adapter]) -> Option<BtlePeripheral> {
    for adapter in adapters {
        let peripherals = match adapter.peripherals().await {
            Ok(v) => v,
            Err(err) => {
                warn!("Failed to query BLE adapter for peripherals: {}", err);
                continue;
            },
        };

        for peripheral in peripherals {
            // already paired devices are skipped so that pairing again selects the next device
            if peripheral.is_connected().await.unwrap_or(false) {
                continue;
            }

            match peripheral.properties().await {
                Err(err) => {
                    warn!("Could not query peripheral for properties: {:?}", err);
                },
                Ok(None) => {
                    warn!("Peripheral has no properties");
                },
                Ok(Some(properties)) => {
                    // Some environments ignore the filter, so make sure to check the service uuid again
                    if properties.services.contains(&MIDI_SERVICE) {
                        info!(
                            "Using peripheral {} {:?} {} {:?}",
                            properties.address,
                            properties.address_type,
                            properties.local_name.as_deref().unwrap_or("NONE"),
                            properties.services,
                        );

                        return Some(BtlePeripheral {
                            id: DeviceId::new(format!("{:?}", peripheral.id())),
                            name: properties.local_name,
                            peripheral,
                            adapter: adapter.clone(),
                        });
                    }
                },
            }
        }
    }

    None
}

#[async_trait]
impl DeviceSelector for BtleSelector {
    async fn request_device(&self) -> Result<Arc<dyn BlePeripheral>, SessionError> {
        let adapters = match start_scanning(&self.manager).await {
            Ok(adapters) => adapters,
            Err(err) => {
                if let Some(source) = err.source() {
                    if let Some(btleplug::Error::PermissionDenied) = source.downcast_ref::<btleplug::Error>() {
                        warn!("Not allowed to access Bluetooth");
                    }
                }
                return Err(err);
            },
        };

        let deadline = Instant::now() + self.scan_timeout;

        let selected = loop {
            if let Some(peripheral) = find_peripheral(&adapters).await {
                break Some(peripheral);
            }

            if Instant::now() >= deadline {
                break None;
            }

            debug!("No peripherals matched");
            sleep(Duration::from_millis(POLL_DELAY)).await;
        };

        stop_scanning(&adapters).await;

        match selected {
            Some(peripheral) => Ok(Arc::new(peripheral)),
            None => Err(SessionError::NoDeviceFound),
        }
    }
}
