/// Control change numbers used by Freedrum sensors.
const FREEDRUM_CONTROLLERS: [(u8, &str); 20] = [
    (0, "commandSaveSettings"),
    (16, "zoneChange"),
    (20, "command"),
    (21, "status"),
    (22, "readValue"),
    (23, "yPos"),
    (24, "batteryLevel"),
    (103, "zPos"),
    (104, "threshold"),
    (105, "sensitivity"),
    (106, "midiNoteForPad"),
    // if >0 orientation changes around the x-axis are sent as this cc
    (107, "xAxis"),
    (108, "yAxis"),
    (109, "zAxis"),
    (110, "refDrumWindowSize"),
    (111, "refDrumStrength"),
    (112, "midiNoteForPadLeftTwist"),
    // how accurately the ref drum has to be hit in the y-axis to predict the hit time, 0 disables
    (113, "predictVarianceThreshold"),
    // sent for the ref drum when y is above the pad mid y
    (114, "footPedalCC"),
    (115, "version"),
];

const FIRST_PERCUSSION_KEY: u8 = 35;

/// General MIDI percussion key map, starting at key 35.
const PERCUSSION: [&str; 47] = [
    "Acoustic Bass Drum",
    "Bass Drum 1",
    "Side Stick",
    "Acoustic Snare",
    "Hand Clap",
    "Electric Snare",
    "Low Floor Tom",
    "Closed Hi-Hat",
    "High Floor Tom",
    "Pedal Hi-Hat",
    "Low Tom",
    "Open Hi-Hat",
    "Low-Mid Tom",
    "Hi-Mid Tom",
    "Crash Cymbal 1",
    "High Tom",
    "Ride Cymbal 1",
    "Chinese Cymbal",
    "Ride Bell",
    "Tambourine",
    "Splash Cymbal",
    "Cowbell",
    "Crash Cymbal 2",
    "Vibraslap",
    "Ride Cymbal 2",
    "Hi Bongo",
    "Low Bongo",
    "Mute Hi Conga",
    "Open Hi Conga",
    "Low Conga",
    "High Timbale",
    "Low Timbale",
    "High Agogo",
    "Low Agogo",
    "Cabasa",
    "Maracas",
    "Short Whistle",
    "Long Whistle",
    "Short Guiro",
    "Long Guiro",
    "Claves",
    "Hi Wood Block",
    "Low Wood Block",
    "Mute Cuica",
    "Open Cuica",
    "Mute Triangle",
    "Open Triangle",
];

pub fn controller_name(controller: u8) -> Option<&'static str> {
    FREEDRUM_CONTROLLERS
        .iter()
        .find(|(number, _)| *number == controller)
        .map(|(_, name)| *name)
}

pub fn percussion_name(key: u8) -> Option<&'static str> {
    let index = key.checked_sub(FIRST_PERCUSSION_KEY)?;
    PERCUSSION.get(usize::from(index)).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controller_names() {
        assert_eq!(controller_name(24), Some("batteryLevel"));
        assert_eq!(controller_name(115), Some("version"));
        assert_eq!(controller_name(1), None);
    }

    #[test]
    fn percussion_names() {
        assert_eq!(percussion_name(34), None);
        assert_eq!(percussion_name(35), Some("Acoustic Bass Drum"));
        assert_eq!(percussion_name(38), Some("Acoustic Snare"));
        assert_eq!(percussion_name(81), Some("Open Triangle"));
        assert_eq!(percussion_name(82), None);
    }
}
