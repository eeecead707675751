//! The seams between the session and the bluetooth stack.
//!
//! [`BlePeripheral`] covers the operations the pairing flow needs from one physical device,
//! [`DeviceSelector`] covers choosing a device when the user asks to pair one. The btleplug
//! backed implementations live in [`crate::device::btle`].

use std::fmt::Debug;
use std::sync::Arc;
use async_trait::async_trait;
use btleplug::api::{Characteristic, Service, ValueNotification};
use futures::stream::BoxStream;

use crate::device::types::DeviceId;
use crate::error::SessionError;

#[async_trait]
pub trait BlePeripheral: Send + Sync + Debug {
    /// Platform identity of the device, stable for the lifetime of the pairing.
    fn id(&self) -> DeviceId;

    /// Advertised local name, if the device announced one.
    fn name(&self) -> Option<&str>;

    async fn connect(&self) -> btleplug::Result<()>;

    async fn disconnect(&self) -> btleplug::Result<()>;

    /// Enumerate all primary services with their characteristics.
    async fn discover_services(&self) -> btleplug::Result<Vec<Service>>;

    async fn subscribe(&self, characteristic: &Characteristic) -> btleplug::Result<()>;

    async fn unsubscribe(&self, characteristic: &Characteristic) -> btleplug::Result<()>;

    async fn read(&self, characteristic: &Characteristic) -> btleplug::Result<Vec<u8>>;

    /// Stream of notifications for every subscribed characteristic of this device.
    async fn notifications(&self) -> btleplug::Result<BoxStream<'static, ValueNotification>>;

    /// Resolves once the platform reports that the link to this device was lost.
    async fn wait_for_disconnect(&self) -> btleplug::Result<()>;
}

#[async_trait]
pub trait DeviceSelector: Send + Sync {
    /// Select a single not yet connected device that exposes the BLE-MIDI service.
    async fn request_device(&self) -> Result<Arc<dyn BlePeripheral>, SessionError>;
}
