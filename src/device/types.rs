use std::fmt;

/// Identity assigned by the platform when a peripheral is selected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        DeviceId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Absent,
    Connecting,
    Connected,
    Subscribing,
    Ready,
    Disconnected,
}

impl ConnectionState {
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        match (self, next) {
            (Absent | Disconnected, Connecting) => true,
            (Connecting, Connected) => true,
            (Connected, Subscribing) => true,
            (Subscribing, Ready) => true,
            // platform disconnect signal
            (Connected | Subscribing | Ready, Disconnected) => true,
            // setup failure
            (Connecting, Absent | Disconnected) => true,
            // manual disconnect
            (Connecting | Connected | Subscribing | Ready, Absent) => true,
            _ => false,
        }
    }

    /// A pairing attempt is in flight or has completed.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting
                | ConnectionState::Connected
                | ConnectionState::Subscribing
                | ConnectionState::Ready
        )
    }

    pub fn is_connected(self) -> bool {
        matches!(
            self,
            ConnectionState::Connected | ConnectionState::Subscribing | ConnectionState::Ready
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = match self {
            ConnectionState::Absent => "absent",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Subscribing => "subscribing",
            ConnectionState::Ready => "ready",
            ConnectionState::Disconnected => "disconnected",
        };

        write!(f, "{}", result)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatteryLevel {
    #[default]
    Unknown,
    Percent(u8), // [0, 100]
}

impl BatteryLevel {
    pub fn from_raw(value: u8) -> Self {
        BatteryLevel::Percent(value.min(100))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::ConnectionState::*;

    #[test]
    fn pairing_path_is_linear() {
        assert!(Absent.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Connected));
        assert!(Connected.can_transition_to(Subscribing));
        assert!(Subscribing.can_transition_to(Ready));

        assert!(!Absent.can_transition_to(Ready));
        assert!(!Connecting.can_transition_to(Ready));
        assert!(!Connected.can_transition_to(Ready));
        assert!(!Disconnected.can_transition_to(Ready));
    }

    #[test]
    fn disconnect_signal_only_applies_to_connected_states() {
        assert!(Ready.can_transition_to(Disconnected));
        assert!(Subscribing.can_transition_to(Disconnected));
        assert!(Connected.can_transition_to(Disconnected));
        assert!(!Absent.can_transition_to(Disconnected));
        assert!(!Disconnected.can_transition_to(Disconnected));
    }

    #[test]
    fn battery_is_clamped() {
        assert_eq!(BatteryLevel::from_raw(5), BatteryLevel::Percent(5));
        assert_eq!(BatteryLevel::from_raw(127), BatteryLevel::Percent(100));
    }
}
