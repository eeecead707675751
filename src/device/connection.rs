use btleplug::api::{Characteristic, Service};
use log::{info, warn};
use tokio::time::{sleep, Duration};

use crate::device::capability::{discover_capabilities, CapabilityMap, KnownCharacteristic};
use crate::device::constants::{CLOSE_DEADLINE, READ_DEADLINE};
use crate::device::transport::BlePeripheral;
use crate::error::SessionError;

pub async fn connect_peripheral(peripheral: &dyn BlePeripheral, deadline: Duration) -> Result<(), SessionError> {
    info!("Connecting to peripheral {}...", peripheral.id());

    tokio::select! {
        _ = sleep(deadline) => {
            warn!("Connecting to peripheral took too long");
            Err(SessionError::Connection { source: btleplug::Error::TimedOut(deadline) })
        }
        result = peripheral.connect() => {
            result?;
            info!("Connected to {}", peripheral.id());
            Ok(())
        }
    }
}

/// Connect and bind the characteristics; both must succeed before the device counts as connected.
pub async fn connect_and_discover(peripheral: &dyn BlePeripheral, deadline: Duration) -> Result<(Vec<Service>, CapabilityMap), SessionError> {
    connect_peripheral(peripheral, deadline).await?;
    discover_capabilities(peripheral).await
}

pub async fn subscribe_output(peripheral: &dyn BlePeripheral, output: &Characteristic) -> Result<(), SessionError> {
    info!("Subscribing to characteristic {:?} {:?}", output.service_uuid, output.uuid);
    peripheral.subscribe(output).await?;
    Ok(())
}

/// Read the standard battery level characteristic, if the device declares one.
pub async fn read_battery_level(peripheral: &dyn BlePeripheral, capabilities: &CapabilityMap) -> Option<u8> {
    let characteristic = capabilities.get(KnownCharacteristic::BatteryLevel)?;

    tokio::select! {
        _ = sleep(Duration::from_millis(READ_DEADLINE)) => {
            warn!("Reading the battery level took too long");
            None
        }
        result = peripheral.read(characteristic) => match result {
            Ok(value) => value.first().copied(),
            Err(err) => {
                warn!("Failed to read battery level: {:?}", err);
                None
            },
        }
    }
}

/// Unsubscribe from the output characteristic (if known) and close the connection.
/// Errors are logged; the device is considered gone either way.
pub async fn close_peripheral(peripheral: &dyn BlePeripheral, output: Option<&Characteristic>) {
    let fut = async {
        if let Some(output) = output {
            if let Err(err) = peripheral.unsubscribe(output).await {
                warn!("Failed to unsubscribe from {}: {:?}", output.uuid, err);
            }
        }

        if let Err(err) = peripheral.disconnect().await {
            warn!("Failed to disconnect {}: {:?}", peripheral.id(), err);
        }
    };

    tokio::select! {
        _ = sleep(Duration::from_millis(CLOSE_DEADLINE)) => {
            warn!("Closing the connection to {} took too long", peripheral.id());
        }
        _ = fut => {
            info!("Closed connection to {}", peripheral.id());
        }
    };
}
