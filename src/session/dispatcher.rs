use humantime::format_rfc3339_millis;
use log::debug;

use crate::config::types::Config;
use crate::device::types::BatteryLevel;
use crate::midi::decoder::{DomainMessage, MessageKind};
use crate::midi::names::{controller_name, percussion_name};

/// Per message side effects that do not need the registry: the battery gate and the
/// diagnostic log.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    debug: bool,
    battery_controller: u8,
    vendor_prefixes: Vec<String>,
}

impl Dispatcher {
    pub fn new(config: &Config) -> Self {
        Dispatcher {
            debug: config.debug,
            battery_controller: config.battery_controller,
            vendor_prefixes: config.vendor_prefixes.clone(),
        }
    }

    fn is_vendor_device(&self, name: Option<&str>) -> bool {
        match name {
            Some(name) => self.vendor_prefixes.iter().any(|prefix| name.starts_with(prefix.as_str())),
            None => false,
        }
    }

    /// The battery level carried by `message`, if it is a battery report of a vendor device.
    pub fn battery_level(&self, device_name: Option<&str>, message: &DomainMessage) -> Option<BatteryLevel> {
        if !self.is_vendor_device(device_name) {
            return None;
        }

        match message.kind {
            MessageKind::ControlChange { controller, value } if controller == self.battery_controller => {
                Some(BatteryLevel::from_raw(value))
            },
            _ => None,
        }
    }

    pub fn log_message(&self, message: &DomainMessage) {
        if !self.debug {
            return;
        }

        let timestamp = format_rfc3339_millis(message.timestamp);
        let id = &message.device_id;
        let kind = message.kind.name();

        match message.kind {
            MessageKind::ControlChange { controller, value } => {
                let name = controller_name(controller)
                    .map(str::to_string)
                    .unwrap_or_else(|| controller.to_string());
                debug!("{} {} #{} {} ch{} {} {}", timestamp, id, message.sequence_id.0, kind, message.channel, name, value);
            },
            MessageKind::NoteOn { key, velocity } | MessageKind::NoteOff { key, velocity } => {
                let name = percussion_name(key)
                    .map(str::to_string)
                    .unwrap_or_else(|| key.to_string());
                debug!("{} {} #{} {} ch{} {} {}", timestamp, id, message.sequence_id.0, kind, message.channel, name, velocity);
            },
            MessageKind::Other { status, data1, data2 } => {
                debug!("{} {} #{} {} {:02x} {:02x} {:02x}", timestamp, id, message.sequence_id.0, kind, status, data1, data2);
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;
    use super::*;
    use crate::device::types::DeviceId;

    fn message(frame: &[u8]) -> DomainMessage {
        DomainMessage::decode(DeviceId::new("a"), SystemTime::now(), frame).unwrap()
    }

    #[test]
    fn battery_report_from_vendor_device() {
        let dispatcher = Dispatcher::new(&Config::default());

        assert_eq!(
            dispatcher.battery_level(Some("FD1-xyz"), &message(&[0xB0, 24, 5])),
            Some(BatteryLevel::Percent(5)),
        );
    }

    #[test]
    fn battery_report_is_gated_by_name() {
        let dispatcher = Dispatcher::new(&Config::default());
        let report = message(&[0xB0, 24, 5]);

        assert_eq!(dispatcher.battery_level(Some("Other MIDI"), &report), None);
        assert_eq!(dispatcher.battery_level(None, &report), None);
    }

    #[test]
    fn only_the_battery_controller_counts() {
        let dispatcher = Dispatcher::new(&Config::default());

        assert_eq!(dispatcher.battery_level(Some("FD1-xyz"), &message(&[0xB0, 23, 5])), None);
        assert_eq!(dispatcher.battery_level(Some("FD1-xyz"), &message(&[0x90, 24, 5])), None);
    }

    #[test]
    fn configured_prefixes() {
        let config = Config {
            vendor_prefixes: vec!["FD2".to_string()],
            ..Config::default()
        };
        let dispatcher = Dispatcher::new(&config);

        assert_eq!(dispatcher.battery_level(Some("FD1-xyz"), &message(&[0xB0, 24, 5])), None);
        assert_eq!(
            dispatcher.battery_level(Some("FD2-abc"), &message(&[0xB0, 24, 90])),
            Some(BatteryLevel::Percent(90)),
        );
    }
}
