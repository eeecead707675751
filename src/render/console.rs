use std::collections::{HashMap, HashSet};
use log::{debug, info};
use tokio::spawn;
use tokio::time::{sleep, Duration};

use crate::device::types::{BatteryLevel, DeviceId};
use crate::midi::decoder::{DomainMessage, MessageKind, SequenceId};
use crate::midi::names::{controller_name, percussion_name};
use crate::render::{battery_label, status_label, RenderBridge};
use crate::session::registry::RegistrySnapshot;
use crate::session::SessionHandle;

/// Renders to the log, one line per device. Every message stays visible for `lifetime`, after
/// which the session is told to drop it.
pub struct ConsoleRenderer {
    session: SessionHandle,
    lifetime: Duration,
    connected: HashMap<DeviceId, bool>,
    scheduled: HashSet<(DeviceId, SequenceId)>,
}

impl ConsoleRenderer {
    pub fn new(session: SessionHandle, lifetime: Duration) -> Self {
        ConsoleRenderer {
            session,
            lifetime,
            connected: HashMap::new(),
            scheduled: HashSet::new(),
        }
    }

    fn schedule_expiry(&self, id: &DeviceId, sequence_id: SequenceId) {
        let session = self.session.clone();
        let id = id.clone();
        let lifetime = self.lifetime;

        spawn(async move {
            sleep(lifetime).await;
            if let Err(err) = session.activity_expired(id, sequence_id).await {
                debug!("Could not expire activity: {}", err);
            }
        });
    }
}

/// Short human readable form of one message, such as `Acoustic Snare(100)`.
pub fn describe(message: &DomainMessage) -> String {
    match message.kind {
        MessageKind::NoteOn { key, velocity } | MessageKind::NoteOff { key, velocity } => {
            match percussion_name(key) {
                Some(name) => format!("{}({})", name, velocity),
                None => format!("{}:{}({})", message.kind.name(), key, velocity),
            }
        },
        MessageKind::ControlChange { controller, value } => {
            match controller_name(controller) {
                Some(name) => format!("{}={}", name, value),
                None => format!("cc{}={}", controller, value),
            }
        },
        MessageKind::Other { .. } => message.kind.name().to_string(),
    }
}

impl RenderBridge for ConsoleRenderer {
    fn render_devices(&mut self, snapshot: &RegistrySnapshot) {
        self.connected = snapshot.devices
            .values()
            .map(|view| (view.id.clone(), view.state.is_connected()))
            .collect();

        if snapshot.devices.is_empty() {
            if snapshot.pairing_enabled {
                info!("No devices, type `pair` to add one");
            }
            return;
        }

        for (index, view) in snapshot.devices.values().enumerate() {
            let connected = view.state.is_connected();
            info!(
                "[{}] {} ({}) {} battery {}",
                index,
                view.name.as_deref().unwrap_or("unnamed"),
                view.id,
                status_label(view),
                battery_label(view.battery, connected),
            );
            if let Some(error) = &view.last_error {
                info!("[{}] last error: {}", index, error);
            }
        }
    }

    fn render_battery(&mut self, id: &DeviceId, level: BatteryLevel) {
        let connected = self.connected.get(id).copied().unwrap_or(false);
        info!("{} battery {}", id, battery_label(level, connected));
    }

    fn render_activity(&mut self, id: &DeviceId, entries: &[DomainMessage]) {
        self.scheduled.retain(|(device_id, sequence_id)| {
            device_id != id || entries.iter().any(|message| message.sequence_id == *sequence_id)
        });

        for message in entries {
            if self.scheduled.insert((id.clone(), message.sequence_id)) {
                self.schedule_expiry(id, message.sequence_id);
            }
        }

        if entries.is_empty() {
            debug!("{} idle", id);
            return;
        }

        let pulses: Vec<String> = entries.iter().map(describe).collect();
        info!("{} {}", id, pulses.join(" "));
    }
}
