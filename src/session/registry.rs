use indexmap::IndexMap;
use log::{info, warn};
use tokio::sync::watch;

use crate::device::handle::PeripheralHandle;
use crate::device::types::{BatteryLevel, ConnectionState, DeviceId};
use crate::midi::decoder::DomainMessage;

#[derive(Debug)]
pub struct SessionEntry {
    pub id: DeviceId,
    pub name: Option<String>,
    pub state: ConnectionState,
    pub handle: Option<PeripheralHandle>,
    pub battery: BatteryLevel,
    pub ever_connected: bool,
    pub last_error: Option<String>,
    /// Visible activity pulses, ordered by sequence id.
    pub activity: Vec<DomainMessage>,
}

impl SessionEntry {
    fn new(id: DeviceId) -> Self {
        SessionEntry {
            id,
            name: None,
            state: ConnectionState::Absent,
            handle: None,
            battery: BatteryLevel::Unknown,
            ever_connected: false,
            last_error: None,
            activity: Vec::new(),
        }
    }

    /// Derived from the state, so it can never disagree with it.
    pub fn ready(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    pub fn attempt(&self) -> Option<u64> {
        self.handle.as_ref().map(|handle| handle.attempt)
    }

    fn view(&self) -> DeviceView {
        DeviceView {
            id: self.id.clone(),
            name: self.name.clone(),
            state: self.state,
            ready: self.ready(),
            battery: self.battery,
            capabilities: self.handle
                .as_ref()
                .map(|handle| handle.capabilities.names().map(|name| name.to_string()).collect())
                .unwrap_or_default(),
            last_error: self.last_error.clone(),
            activity: self.activity.clone(),
        }
    }
}

/// Read-only copy of one entry, as handed to the render layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceView {
    pub id: DeviceId,
    pub name: Option<String>,
    pub state: ConnectionState,
    pub ready: bool,
    pub battery: BatteryLevel,
    pub capabilities: Vec<String>,
    pub last_error: Option<String>,
    pub activity: Vec<DomainMessage>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrySnapshot {
    pub pairing_enabled: bool,
    pub devices: IndexMap<DeviceId, DeviceView>,
}

/// The only store of session state. Every mutation goes through [`SessionRegistry::upsert`],
/// [`SessionRegistry::transition`] or [`SessionRegistry::set_activity`] and publishes a complete
/// snapshot afterwards.
pub struct SessionRegistry {
    entries: IndexMap<DeviceId, SessionEntry>,
    pairing_enabled: bool,
    publisher: watch::Sender<RegistrySnapshot>,
}

impl SessionRegistry {
    pub fn new() -> (Self, watch::Receiver<RegistrySnapshot>) {
        let (publisher, receiver) = watch::channel(RegistrySnapshot::default());

        let registry = SessionRegistry {
            entries: IndexMap::new(),
            pairing_enabled: false,
            publisher,
        };

        (registry, receiver)
    }

    pub fn get(&self, id: &DeviceId) -> Option<&SessionEntry> {
        self.entries.get(id)
    }

    pub fn ids(&self) -> Vec<DeviceId> {
        self.entries.keys().cloned().collect()
    }

    /// Apply `patch` to the entry of `id`, creating an absent entry first if needed.
    pub fn upsert<F>(&mut self, id: &DeviceId, patch: F)
    where
        F: FnOnce(&mut SessionEntry),
    {
        let entry = self.entries
            .entry(id.clone())
            .or_insert_with(|| SessionEntry::new(id.clone()));
        patch(entry);
        self.publish();
    }

    /// Move `id` to `next`. Invalid transitions are refused and leave the entry untouched.
    pub fn transition(&mut self, id: &DeviceId, next: ConnectionState) -> bool {
        self.transition_with(id, next, |_| {})
    }

    /// Like [`SessionRegistry::transition`], with `patch` applied in the same publish.
    pub fn transition_with<F>(&mut self, id: &DeviceId, next: ConnectionState, patch: F) -> bool
    where
        F: FnOnce(&mut SessionEntry),
    {
        let Some(entry) = self.entries.get_mut(id) else {
            warn!("Refusing transition of unknown device {} to {}", id, next);
            return false;
        };

        if !entry.state.can_transition_to(next) {
            warn!("Refusing transition of {} from {} to {}", id, entry.state, next);
            return false;
        }

        info!("Device {}: {} -> {}", id, entry.state, next);
        entry.state = next;
        if next.is_connected() {
            entry.ever_connected = true;
        }
        // only leaving the active set ends the connection
        if !next.is_active() {
            if let Some(handle) = entry.handle.as_mut() {
                handle.detach();
            }
            entry.activity.clear();
        }
        patch(entry);

        self.publish();
        true
    }

    /// Replace the visible activity of a known device. Unknown devices are ignored.
    pub fn set_activity(&mut self, id: &DeviceId, activity: Vec<DomainMessage>) {
        let Some(entry) = self.entries.get_mut(id) else {
            return;
        };

        entry.activity = activity;
        self.publish();
    }

    pub fn set_pairing_enabled(&mut self, enabled: bool) {
        self.pairing_enabled = enabled;
        self.publish();
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            pairing_enabled: self.pairing_enabled,
            devices: self.entries
                .iter()
                .map(|(id, entry)| (id.clone(), entry.view()))
                .collect(),
        }
    }

    fn publish(&self) {
        self.publisher.send_replace(self.snapshot());
    }
}
