use std::fmt;
use btleplug::api::{Characteristic, Service};
use indexmap::IndexMap;
use log::{debug, info};
use uuid::Uuid;

use crate::device::constants::{
    BATTERY_LEVEL_CHARACTERISTIC, FREEDRUM_DRUM_CONF_CHARACTERISTIC, FREEDRUM_ORIENTATION_CHARACTERISTIC,
    FREEDRUM_STATUS_CHARACTERISTIC, FREEDRUM_VERSION_CHARACTERISTIC, MIDI_IO_CHARACTERISTIC, OPTIONAL_SERVICES,
};
use crate::device::transport::BlePeripheral;
use crate::error::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownCharacteristic {
    FreedrumOrientation,
    FreedrumDrumConf,
    FreedrumVersion,
    FreedrumStatus,
    BatteryLevel,
    MidiIo,
}

const KNOWN_CHARACTERISTICS: [(KnownCharacteristic, Uuid); 6] = [
    (KnownCharacteristic::FreedrumOrientation, FREEDRUM_ORIENTATION_CHARACTERISTIC),
    (KnownCharacteristic::FreedrumDrumConf, FREEDRUM_DRUM_CONF_CHARACTERISTIC),
    (KnownCharacteristic::FreedrumVersion, FREEDRUM_VERSION_CHARACTERISTIC),
    (KnownCharacteristic::FreedrumStatus, FREEDRUM_STATUS_CHARACTERISTIC),
    (KnownCharacteristic::BatteryLevel, BATTERY_LEVEL_CHARACTERISTIC),
    (KnownCharacteristic::MidiIo, MIDI_IO_CHARACTERISTIC),
];

impl KnownCharacteristic {
    pub fn name(self) -> &'static str {
        match self {
            KnownCharacteristic::FreedrumOrientation => "FreedrumCharOrientation",
            KnownCharacteristic::FreedrumDrumConf => "FreedrumDrumConf",
            KnownCharacteristic::FreedrumVersion => "FreedrumVersion",
            KnownCharacteristic::FreedrumStatus => "FreedrumStatus",
            KnownCharacteristic::BatteryLevel => "BatteryLevel",
            KnownCharacteristic::MidiIo => "MidiIO",
        }
    }
}

/// Logical name of a discovered characteristic. Characteristics missing from the table stay
/// addressable by their raw uuid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharacteristicName {
    Known(KnownCharacteristic),
    Unknown(Uuid),
}

impl CharacteristicName {
    pub fn resolve(uuid: Uuid) -> Self {
        KNOWN_CHARACTERISTICS
            .iter()
            .find(|(_, known_uuid)| *known_uuid == uuid)
            .map(|(known, _)| CharacteristicName::Known(*known))
            .unwrap_or(CharacteristicName::Unknown(uuid))
    }
}

impl fmt::Display for CharacteristicName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CharacteristicName::Known(known) => write!(f, "{}", known.name()),
            CharacteristicName::Unknown(uuid) => write!(f, "{}", uuid),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CapabilityMap {
    characteristics: IndexMap<CharacteristicName, Characteristic>,
}

impl CapabilityMap {
    pub fn get(&self, known: KnownCharacteristic) -> Option<&Characteristic> {
        self.characteristics.get(&CharacteristicName::Known(known))
    }

    /// The characteristic that carries the MIDI event stream.
    pub fn output(&self) -> Result<&Characteristic, SessionError> {
        self.get(KnownCharacteristic::MidiIo)
            .ok_or(SessionError::MissingCapability { name: KnownCharacteristic::MidiIo.name() })
    }

    pub fn names(&self) -> impl Iterator<Item = &CharacteristicName> {
        self.characteristics.keys()
    }

    pub fn len(&self) -> usize {
        self.characteristics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.characteristics.is_empty()
    }
}

pub fn resolve_capabilities(services: &[Service]) -> CapabilityMap {
    let mut characteristics = IndexMap::new();

    for service in services {
        if OPTIONAL_SERVICES.contains(&service.uuid) {
            debug!("Optional service {} is available", service.uuid);
        }

        for characteristic in &service.characteristics {
            let name = CharacteristicName::resolve(characteristic.uuid);
            characteristics.insert(name, characteristic.clone());
        }
    }

    CapabilityMap { characteristics }
}

/// Enumerate the services of a connected peripheral and bind their characteristics to names.
/// Enumeration errors are returned as is, the caller decides what to do with the attempt.
pub async fn discover_capabilities(peripheral: &dyn BlePeripheral) -> Result<(Vec<Service>, CapabilityMap), SessionError> {
    info!("Discovering services of {}...", peripheral.id());

    let services = peripheral.discover_services().await
        .map_err(|source| SessionError::Discovery { source })?;

    let capabilities = resolve_capabilities(&services);
    info!(
        "Discovered {} services, {} characteristics: {}",
        services.len(),
        capabilities.len(),
        capabilities.names().map(|name| name.to_string()).collect::<Vec<_>>().join(", "),
    );

    Ok((services, capabilities))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use btleplug::api::CharPropFlags;
    use super::*;
    use crate::device::constants::{BATTERY_SERVICE, MIDI_SERVICE};

    fn characteristic(service_uuid: Uuid, uuid: Uuid) -> Characteristic {
        Characteristic {
            uuid,
            service_uuid,
            properties: CharPropFlags::READ | CharPropFlags::NOTIFY,
            descriptors: BTreeSet::new(),
        }
    }

    fn service(uuid: Uuid, characteristics: Vec<Characteristic>) -> Service {
        Service {
            uuid,
            primary: true,
            characteristics: characteristics.into_iter().collect(),
        }
    }

    #[test]
    fn known_characteristics_get_symbolic_names() {
        let unknown = Uuid::from_u128(0x1234);
        let services = vec![
            service(MIDI_SERVICE, vec![characteristic(MIDI_SERVICE, MIDI_IO_CHARACTERISTIC)]),
            service(BATTERY_SERVICE, vec![
                characteristic(BATTERY_SERVICE, BATTERY_LEVEL_CHARACTERISTIC),
                characteristic(BATTERY_SERVICE, unknown),
            ]),
        ];

        let capabilities = resolve_capabilities(&services);

        assert_eq!(capabilities.len(), 3);
        assert!(capabilities.get(KnownCharacteristic::BatteryLevel).is_some());
        assert_eq!(capabilities.output().unwrap().uuid, MIDI_IO_CHARACTERISTIC);
        assert!(capabilities.names().any(|name| *name == CharacteristicName::Unknown(unknown)));

        let names: Vec<String> = capabilities.names().map(|name| name.to_string()).collect();
        assert!(names.contains(&"MidiIO".to_string()));
        assert!(names.contains(&"BatteryLevel".to_string()));
        assert!(names.contains(&unknown.to_string()));
    }

    #[test]
    fn missing_output_characteristic() {
        let services = vec![
            service(BATTERY_SERVICE, vec![characteristic(BATTERY_SERVICE, BATTERY_LEVEL_CHARACTERISTIC)]),
        ];

        let capabilities = resolve_capabilities(&services);

        assert!(matches!(
            capabilities.output(),
            Err(SessionError::MissingCapability { name: "MidiIO" }),
        ));
    }

    #[test]
    fn table_uuids_resolve_to_their_names() {
        for (known, uuid) in KNOWN_CHARACTERISTICS {
            assert_eq!(CharacteristicName::resolve(uuid), CharacteristicName::Known(known));
        }
    }
}
