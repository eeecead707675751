use std::path::PathBuf;
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::device::constants::{BATTERY_CONTROLLER, FREEDRUM_NAME_PREFIX};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Mirror every decoded message to the log.
    pub debug: bool,
    /// Raw MIDI device or FIFO that receives the forwarded frames.
    pub output: Option<PathBuf>,
    /// Advertised name prefixes of devices that report their battery as a control change.
    pub vendor_prefixes: Vec<String>,
    pub battery_controller: u8,
    pub throttle_interval_ms: u64,
    pub activity_lifetime_ms: u64,
    pub scan_timeout_ms: u64,
    pub connect_timeout_ms: u64,
}

impl Config {
    pub fn normalize(&mut self) {
        self.throttle_interval_ms = self.throttle_interval_ms.max(1);
        self.battery_controller = self.battery_controller.min(127);
        self.vendor_prefixes.retain(|prefix| !prefix.is_empty());
        self.vendor_prefixes.dedup();
    }

    pub fn throttle_interval(&self) -> Duration {
        Duration::from_millis(self.throttle_interval_ms)
    }

    pub fn activity_lifetime(&self) -> Duration {
        Duration::from_millis(self.activity_lifetime_ms)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            debug: false,
            output: None,
            vendor_prefixes: vec![FREEDRUM_NAME_PREFIX.to_string()],
            battery_controller: BATTERY_CONTROLLER,
            throttle_interval_ms: 100,
            activity_lifetime_ms: 300,
            scan_timeout_ms: 10_000,
            connect_timeout_ms: 10_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_use_defaults() {
        let config: Config = serde_json::from_str(r#"{"debug": true, "output": "/dev/snd/midiC1D0"}"#).unwrap();

        assert!(config.debug);
        assert_eq!(config.output, Some(PathBuf::from("/dev/snd/midiC1D0")));
        assert_eq!(config.vendor_prefixes, vec!["FD1".to_string()]);
        assert_eq!(config.throttle_interval(), Duration::from_millis(100));
    }

    #[test]
    fn camel_case_keys() {
        let json = serde_json::to_value(Config::default()).unwrap();

        assert_eq!(json["batteryController"], 24);
        assert_eq!(json["throttleIntervalMs"], 100);
        assert_eq!(json["vendorPrefixes"][0], "FD1");
    }

    #[test]
    fn normalize() {
        let mut config = Config {
            throttle_interval_ms: 0,
            battery_controller: 200,
            vendor_prefixes: vec!["FD1".to_string(), "FD1".to_string(), "".to_string()],
            ..Config::default()
        };
        config.normalize();

        assert_eq!(config.throttle_interval_ms, 1);
        assert_eq!(config.battery_controller, 127);
        assert_eq!(config.vendor_prefixes, vec!["FD1".to_string()]);
    }
}
