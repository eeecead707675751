use std::io;
use std::path::{Path, PathBuf};
use futures::channel::mpsc::{channel, Receiver, Sender};
use futures::StreamExt;
use log::{debug, info, trace, warn};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::spawn;

const OUTPUT_BUFFER: usize = 256;

/// Receives every truncated notification frame, whether it decoded or not.
/// Implementations must not block the caller.
pub trait OutputSink: Send {
    fn send(&mut self, frame: &[u8]) -> io::Result<()>;
}

/// Writes frames to a raw MIDI device (such as `/dev/snd/midiC1D0`) or a FIFO. The writes happen
/// in a task of their own, so a stalled reader only fills the frame queue.
pub struct RawMidiSink {
    frames: ChannelSink,
}

impl RawMidiSink {
    pub async fn open(path: &Path) -> io::Result<Self> {
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .append(true)
            .open(path)
            .await?;

        let (sender, receiver) = channel(OUTPUT_BUFFER);
        spawn(write_frames_task(file, path.to_path_buf(), receiver));

        info!("Forwarding MIDI to {}", path.to_string_lossy());
        Ok(RawMidiSink { frames: ChannelSink::new(sender) })
    }
}

impl OutputSink for RawMidiSink {
    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        self.frames.send(frame)
    }
}

async fn write_frames_task(mut file: File, path: PathBuf, mut frames: Receiver<Vec<u8>>) {
    while let Some(frame) = frames.next().await {
        let result = match file.write_all(&frame).await {
            Ok(()) => file.flush().await,
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            warn!("Failed to write MIDI frame to {}: {}", path.to_string_lossy(), err);
        }
    }

    debug!("Stopped writing to {}", path.to_string_lossy());
}

/// Used when no output is configured.
pub struct NullSink;

impl OutputSink for NullSink {
    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        trace!("Discarding frame {:02x?}", frame);
        Ok(())
    }
}

/// Forwards frames into a futures channel, for consumers living in another task.
pub struct ChannelSink {
    sender: Sender<Vec<u8>>,
}

impl ChannelSink {
    pub fn new(sender: Sender<Vec<u8>>) -> Self {
        ChannelSink { sender }
    }
}

impl OutputSink for ChannelSink {
    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        self.sender
            .try_send(frame.to_vec())
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use tokio::time::{sleep, Duration};
    use super::*;

    #[test]
    fn channel_sink_forwards_frames() {
        let (sender, mut receiver) = channel(4);
        let mut sink = ChannelSink::new(sender);

        sink.send(&[0x90, 0x3C, 0x64]).unwrap();
        sink.send(&[0x90]).unwrap();

        assert_eq!(receiver.try_next().unwrap(), Some(vec![0x90, 0x3C, 0x64]));
        assert_eq!(receiver.try_next().unwrap(), Some(vec![0x90]));
    }

    #[tokio::test]
    async fn raw_midi_sink_appends_frames() {
        let path = env::temp_dir().join(format!("freedrum-bridge-sink-{}.raw", std::process::id()));
        fs::write(&path, b"").unwrap();

        {
            let mut sink = RawMidiSink::open(&path).await.unwrap();
            sink.send(&[0x99, 38, 100]).unwrap();
            sink.send(&[0x89, 38, 0]).unwrap();
        }

        let expected = vec![0x99, 38, 100, 0x89, 38, 0];
        for _ in 0..100 {
            if fs::read(&path).unwrap() == expected {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(fs::read(&path).unwrap(), expected);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn a_full_queue_does_not_block_the_caller() {
        let (sender, _receiver) = channel(0);
        let mut sink = ChannelSink::new(sender);

        // one slot per sender, after that frames are refused instead of waited on
        sink.send(&[0x99, 38, 100]).unwrap();
        assert!(sink.send(&[0x99, 38, 100]).is_err());
    }

    #[tokio::test]
    async fn missing_device_is_an_error() {
        let path = env::temp_dir().join("freedrum-bridge-missing-dir").join("midi");
        assert!(RawMidiSink::open(&path).await.is_err());
    }
}
