//! In-memory peripheral and selector used by the session tests.

use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use async_trait::async_trait;
use btleplug::api::{CharPropFlags, Characteristic, Service, ValueNotification};
use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::device::constants::{BATTERY_LEVEL_CHARACTERISTIC, BATTERY_SERVICE, MIDI_IO_CHARACTERISTIC, MIDI_SERVICE};
use crate::device::transport::{BlePeripheral, DeviceSelector};
use crate::device::types::DeviceId;
use crate::error::SessionError;

pub fn characteristic(service_uuid: Uuid, uuid: Uuid) -> Characteristic {
    Characteristic {
        uuid,
        service_uuid,
        properties: CharPropFlags::READ | CharPropFlags::NOTIFY,
        descriptors: BTreeSet::new(),
    }
}

pub fn midi_service() -> Service {
    Service {
        uuid: MIDI_SERVICE,
        primary: true,
        characteristics: [characteristic(MIDI_SERVICE, MIDI_IO_CHARACTERISTIC)].into_iter().collect(),
    }
}

pub fn battery_service() -> Service {
    Service {
        uuid: BATTERY_SERVICE,
        primary: true,
        characteristics: [characteristic(BATTERY_SERVICE, BATTERY_LEVEL_CHARACTERISTIC)].into_iter().collect(),
    }
}

#[derive(Debug)]
pub struct MockPeripheral {
    id: DeviceId,
    name: Option<String>,
    services: Vec<Service>,
    battery: Option<u8>,
    pub fail_connect: AtomicBool,
    pub fail_discover: AtomicBool,
    pub fail_subscribe: AtomicBool,
    pub connect_calls: AtomicUsize,
    pub discover_calls: AtomicUsize,
    pub subscribed: AtomicBool,
    pub disconnected: AtomicBool,
    notifications: Mutex<Option<UnboundedSender<ValueNotification>>>,
    link_lost: Notify,
}

impl MockPeripheral {
    pub fn new(id: &str, name: &str, services: Vec<Service>) -> Self {
        MockPeripheral {
            id: DeviceId::new(id),
            name: Some(name.to_string()),
            services,
            battery: None,
            fail_connect: AtomicBool::new(false),
            fail_discover: AtomicBool::new(false),
            fail_subscribe: AtomicBool::new(false),
            connect_calls: AtomicUsize::new(0),
            discover_calls: AtomicUsize::new(0),
            subscribed: AtomicBool::new(false),
            disconnected: AtomicBool::new(false),
            notifications: Mutex::new(None),
            link_lost: Notify::new(),
        }
    }

    /// A Freedrum style sensor exposing only the MIDI service.
    pub fn midi(id: &str, name: &str) -> Arc<Self> {
        Arc::new(Self::new(id, name, vec![midi_service()]))
    }

    pub fn with_battery(mut self, level: u8) -> Self {
        self.services.push(battery_service());
        self.battery = Some(level);
        self
    }

    pub fn notify(&self, value: &[u8]) {
        let guard = self.notifications.lock().unwrap();
        if let Some(sender) = guard.as_ref() {
            let _ = sender.unbounded_send(ValueNotification {
                uuid: MIDI_IO_CHARACTERISTIC,
                value: value.to_vec(),
            });
        }
    }

    pub fn drop_link(&self) {
        self.link_lost.notify_one();
    }

    fn mock_error() -> btleplug::Error {
        btleplug::Error::RuntimeError("mock failure".to_string())
    }
}

#[async_trait]
impl BlePeripheral for MockPeripheral {
    fn id(&self) -> DeviceId {
        self.id.clone()
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    async fn connect(&self) -> btleplug::Result<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(Self::mock_error());
        }
        Ok(())
    }

    async fn disconnect(&self) -> btleplug::Result<()> {
        self.disconnected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn discover_services(&self) -> btleplug::Result<Vec<Service>> {
        self.discover_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_discover.load(Ordering::SeqCst) {
            return Err(Self::mock_error());
        }
        Ok(self.services.clone())
    }

    async fn subscribe(&self, _characteristic: &Characteristic) -> btleplug::Result<()> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(Self::mock_error());
        }
        self.subscribed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn unsubscribe(&self, _characteristic: &Characteristic) -> btleplug::Result<()> {
        self.subscribed.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn read(&self, characteristic: &Characteristic) -> btleplug::Result<Vec<u8>> {
        match (characteristic.uuid == BATTERY_LEVEL_CHARACTERISTIC, self.battery) {
            (true, Some(level)) => Ok(vec![level]),
            _ => Err(btleplug::Error::NotSupported("read".to_string())),
        }
    }

    async fn notifications(&self) -> btleplug::Result<BoxStream<'static, ValueNotification>> {
        let (sender, receiver) = unbounded();
        *self.notifications.lock().unwrap() = Some(sender);
        Ok(receiver.boxed())
    }

    async fn wait_for_disconnect(&self) -> btleplug::Result<()> {
        self.link_lost.notified().await;
        Ok(())
    }
}

/// Hands out the queued peripherals in order, one per pairing request.
#[derive(Default)]
pub struct MockSelector {
    queue: Mutex<VecDeque<Arc<MockPeripheral>>>,
}

impl MockSelector {
    pub fn new(peripherals: Vec<Arc<MockPeripheral>>) -> Self {
        MockSelector { queue: Mutex::new(peripherals.into_iter().collect()) }
    }
}

#[async_trait]
impl DeviceSelector for MockSelector {
    async fn request_device(&self) -> Result<Arc<dyn BlePeripheral>, SessionError> {
        let next = self.queue.lock().unwrap().pop_front();
        match next {
            Some(peripheral) => Ok(peripheral),
            None => Err(SessionError::NoDeviceFound),
        }
    }
}
