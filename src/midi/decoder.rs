use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use crate::device::types::DeviceId;
use crate::error::DecodeError;

/// Number of trailing bytes of a notification that carry the MIDI message.
pub const MESSAGE_LEN: usize = 3;

static NEXT_SEQUENCE_ID: AtomicU64 = AtomicU64::new(0);

/// Process-wide total order over decoded messages; also the deduplication key of activity sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SequenceId(pub u64);

impl SequenceId {
    fn next() -> Self {
        SequenceId(NEXT_SEQUENCE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    NoteOff { key: u8, velocity: u8 },
    NoteOn { key: u8, velocity: u8 },
    ControlChange { controller: u8, value: u8 },
    Other { status: u8, data1: u8, data2: u8 },
}

impl MessageKind {
    pub fn name(&self) -> &'static str {
        match self {
            MessageKind::NoteOff { .. } => "noteoff",
            MessageKind::NoteOn { .. } => "noteon",
            MessageKind::ControlChange { .. } => "controlchange",
            MessageKind::Other { status, .. } => match status >> 4 {
                0xA => "keypressure",
                0xC => "programchange",
                0xD => "channelpressure",
                0xE => "pitchbendchange",
                _ => "system",
            },
        }
    }
}

/// Drop the leading framing/padding bytes, only the last three bytes are trusted.
pub fn truncate(raw: &[u8]) -> &[u8] {
    &raw[raw.len().saturating_sub(MESSAGE_LEN)..]
}

/// Decode a truncated frame into its channel and message kind.
pub fn decode(frame: &[u8]) -> Result<(u8, MessageKind), DecodeError> {
    let [status, data1, data2] = match frame {
        [status, data1, data2] => [*status, *data1, *data2],
        _ => return Err(DecodeError::TooShort { len: frame.len() }),
    };

    if status & 0x80 == 0 {
        return Err(DecodeError::InvalidStatus { status });
    }

    let kind = status >> 4;
    let channel = status & 0x0F;

    // system messages (0xF_) carry no channel and are not range checked
    if kind != 0xF {
        if let Some(value) = [data1, data2].into_iter().find(|value| value & 0x80 != 0) {
            return Err(DecodeError::InvalidData { value });
        }
    }

    let kind = match kind {
        0x8 => MessageKind::NoteOff { key: data1, velocity: data2 },
        0x9 => MessageKind::NoteOn { key: data1, velocity: data2 },
        0xB => MessageKind::ControlChange { controller: data1, value: data2 },
        _ => MessageKind::Other { status, data1, data2 },
    };

    Ok((channel, kind))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainMessage {
    pub sequence_id: SequenceId,
    pub device_id: DeviceId,
    pub timestamp: SystemTime,
    pub channel: u8,
    pub kind: MessageKind,
}

impl DomainMessage {
    /// Decode a truncated frame. A sequence id is only taken when decoding succeeds.
    pub fn decode(device_id: DeviceId, timestamp: SystemTime, frame: &[u8]) -> Result<Self, DecodeError> {
        let (channel, kind) = decode(frame)?;

        Ok(DomainMessage {
            sequence_id: SequenceId::next(),
            device_id,
            timestamp,
            channel,
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::thread;
    use super::*;

    fn message(frame: &[u8]) -> Result<DomainMessage, DecodeError> {
        DomainMessage::decode(DeviceId::new("test"), SystemTime::now(), frame)
    }

    #[test]
    fn note_on() {
        let message = message(&[0x90, 0x3C, 0x64]).unwrap();
        assert_eq!(message.channel, 0);
        assert_eq!(message.kind, MessageKind::NoteOn { key: 60, velocity: 100 });
        assert_eq!(message.kind.name(), "noteon");
    }

    #[test]
    fn note_off_and_control_change() {
        assert_eq!(decode(&[0x83, 38, 0]).unwrap(), (3, MessageKind::NoteOff { key: 38, velocity: 0 }));
        assert_eq!(decode(&[0xB9, 24, 5]).unwrap(), (9, MessageKind::ControlChange { controller: 24, value: 5 }));
    }

    #[test]
    fn other_kinds_are_kept() {
        let (channel, kind) = decode(&[0xE1, 0x00, 0x40]).unwrap();
        assert_eq!(channel, 1);
        assert_eq!(kind, MessageKind::Other { status: 0xE1, data1: 0x00, data2: 0x40 });
        assert_eq!(kind.name(), "pitchbendchange");
    }

    #[test]
    fn only_trailing_bytes_are_used() {
        // BLE-MIDI header and timestamp bytes in front of the message
        let raw = [0x80, 0x80, 0x99, 0x26, 0x7F];
        assert_eq!(truncate(&raw), &[0x99, 0x26, 0x7F]);
        assert_eq!(truncate(&[0x90, 0x3C]), &[0x90, 0x3C]);
        assert_eq!(truncate(&[]), &[] as &[u8]);
    }

    #[test]
    fn short_frames_are_rejected() {
        assert_eq!(message(&[0x90, 0x3C]).unwrap_err(), DecodeError::TooShort { len: 2 });
        assert_eq!(message(&[]).unwrap_err(), DecodeError::TooShort { len: 0 });
    }

    #[test]
    fn malformed_frames_are_rejected() {
        assert_eq!(decode(&[0x3C, 0x64, 0x00]).unwrap_err(), DecodeError::InvalidStatus { status: 0x3C });
        assert_eq!(decode(&[0x90, 0x3C, 0xC4]).unwrap_err(), DecodeError::InvalidData { value: 0xC4 });
    }

    #[test]
    fn failed_decodes_do_not_consume_sequence_ids() {
        let first = message(&[0x90, 0x3C, 0x64]).unwrap();
        let _ = message(&[0x90]);
        let second = message(&[0x90, 0x3C, 0x64]).unwrap();
        assert!(second.sequence_id > first.sequence_id);
    }

    #[test]
    fn sequence_ids_increase_across_threads() {
        let handles: Vec<_> = (0..4)
            .map(|device| {
                thread::spawn(move || {
                    let device_id = DeviceId::new(format!("device-{}", device));
                    (0..250)
                        .map(|_| {
                            DomainMessage::decode(device_id.clone(), SystemTime::now(), &[0x99, 38, 100])
                                .unwrap()
                                .sequence_id
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            let ids = handle.join().unwrap();
            assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
            for id in ids {
                assert!(seen.insert(id), "sequence id {:?} was handed out twice", id);
            }
        }
        assert_eq!(seen.len(), 1000);
    }
}
