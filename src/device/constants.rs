use btleplug::api::bleuuid::uuid_from_u16;
use uuid::Uuid;

/**
 * How often (milliseconds) to poll the adapters for newly discovered peripherals while scanning.
 */
pub const POLL_DELAY: u64 = 100;

/**
 * How long (milliseconds) reading the battery level characteristic may take.
 */
pub const READ_DEADLINE: u64 = 2000;

/**
 * How long (milliseconds) unsubscribing and closing a connection may take during teardown.
 */
pub const CLOSE_DEADLINE: u64 = 2000;

/**
 * The BLE-MIDI service. Peripherals are selected by this service.
 */
pub const MIDI_SERVICE: Uuid = Uuid::from_u128(0x03b80e5a_ede8_4b33_a751_6ce34ec4c700);

/**
 * Freedrum vendor service (sensor configuration).
 */
pub const FREEDRUM_SERVICE: Uuid = Uuid::from_u128(0x0e5a1523_ede8_4b33_a751_6ce34ec47c00);

pub const BATTERY_SERVICE: Uuid = uuid_from_u16(0x180F);

// Nordic secure DFU targets
pub const DFU_TARGET_SIGNED_SERVICE: Uuid = uuid_from_u16(0xFE59);
pub const DFU_TARGET_UNSIGNED_SERVICE: Uuid = uuid_from_u16(0xFE58);

/**
 * The BLE-MIDI data I/O characteristic; MIDI events arrive as notifications on it.
 */
pub const MIDI_IO_CHARACTERISTIC: Uuid = Uuid::from_u128(0x7772e5db_3868_4112_a1a9_f2669d106bf3);

pub const FREEDRUM_ORIENTATION_CHARACTERISTIC: Uuid = Uuid::from_u128(0x0e5a1525_ede8_4b33_a751_6ce34ec47c00);
pub const FREEDRUM_DRUM_CONF_CHARACTERISTIC: Uuid = Uuid::from_u128(0x0e5a1526_ede8_4b33_a751_6ce34ec47c00);
pub const FREEDRUM_VERSION_CHARACTERISTIC: Uuid = Uuid::from_u128(0x0e5a1527_ede8_4b33_a751_6ce34ec47c00);
pub const FREEDRUM_STATUS_CHARACTERISTIC: Uuid = Uuid::from_u128(0x0e5a1528_ede8_4b33_a751_6ce34ec47c00);

pub const BATTERY_LEVEL_CHARACTERISTIC: Uuid = uuid_from_u16(0x2A19);

/**
 * Services that are not needed to select a device, but are used when present.
 */
pub const OPTIONAL_SERVICES: [Uuid; 4] = [
    FREEDRUM_SERVICE,
    BATTERY_SERVICE,
    DFU_TARGET_SIGNED_SERVICE,
    DFU_TARGET_UNSIGNED_SERVICE,
];

/**
 * Freedrum sensors report their battery level as this control change number.
 */
pub const BATTERY_CONTROLLER: u8 = 24;

/**
 * Advertised name prefix of Freedrum sensors.
 */
pub const FREEDRUM_NAME_PREFIX: &str = "FD1";
