use crate::device::types::{BatteryLevel, ConnectionState, DeviceId};
use crate::midi::decoder::DomainMessage;
use crate::session::registry::{DeviceView, RegistrySnapshot};

pub mod console;

const LOW_BATTERY: u8 = 10;

/// Receives what the session wants shown. Called from the session task, so implementations
/// must not block.
pub trait RenderBridge: Send {
    /// The full device list changed.
    fn render_devices(&mut self, snapshot: &RegistrySnapshot);
    /// Only the battery of one device changed.
    fn render_battery(&mut self, id: &DeviceId, level: BatteryLevel);
    /// The visible activity of one device, ordered by sequence id.
    fn render_activity(&mut self, id: &DeviceId, entries: &[DomainMessage]);
}

pub fn status_label(view: &DeviceView) -> &'static str {
    match view.state {
        ConnectionState::Ready => "Ready",
        ConnectionState::Connected | ConnectionState::Subscribing => "Waiting...",
        ConnectionState::Connecting => "Connecting...",
        ConnectionState::Absent | ConnectionState::Disconnected => "Disconnected",
    }
}

pub fn battery_label(level: BatteryLevel, connected: bool) -> String {
    match level {
        _ if !connected => "unknown".to_string(),
        BatteryLevel::Unknown => "unknown".to_string(),
        BatteryLevel::Percent(percent) if percent <= LOW_BATTERY => "low".to_string(),
        BatteryLevel::Percent(percent) => format!("{}%", percent),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(state: ConnectionState) -> DeviceView {
        DeviceView {
            id: DeviceId::new("a"),
            name: Some("FD1-xyz".to_string()),
            state,
            ready: state == ConnectionState::Ready,
            battery: BatteryLevel::Unknown,
            capabilities: vec![],
            last_error: None,
            activity: vec![],
        }
    }

    #[test]
    fn status_labels() {
        assert_eq!(status_label(&view(ConnectionState::Connecting)), "Connecting...");
        assert_eq!(status_label(&view(ConnectionState::Connected)), "Waiting...");
        assert_eq!(status_label(&view(ConnectionState::Subscribing)), "Waiting...");
        assert_eq!(status_label(&view(ConnectionState::Ready)), "Ready");
        assert_eq!(status_label(&view(ConnectionState::Disconnected)), "Disconnected");
    }

    #[test]
    fn battery_labels() {
        assert_eq!(battery_label(BatteryLevel::Unknown, true), "unknown");
        assert_eq!(battery_label(BatteryLevel::Percent(80), false), "unknown");
        assert_eq!(battery_label(BatteryLevel::Percent(10), true), "low");
        assert_eq!(battery_label(BatteryLevel::Percent(0), true), "low");
        assert_eq!(battery_label(BatteryLevel::Percent(11), true), "11%");
        assert_eq!(battery_label(BatteryLevel::Percent(100), true), "100%");
    }
}
