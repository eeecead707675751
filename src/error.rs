use std::io;
use std::str::Utf8Error;
use thiserror::Error;
use btleplug;
use serde_json;
use futures::channel::mpsc::SendError;
use futures::channel::oneshot::Canceled;

use crate::device::types::DeviceId;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to determine path to config file")]
    NoConfigPath,

    #[error("Failed to acquire file lock on config file: {source}")]
    CanNotLock { source: io::Error },

    #[error("Failed to encode/decode config as utf-8: {source}")]
    Utf8Error { #[from] source: Utf8Error },

    #[error("Failed to read/write config file: {source}")]
    IOError { #[from] source: io::Error },

    #[error("Failed to parse/build config file: {source}")]
    JsonError { #[from] source: serde_json::Error },
}

#[derive(Error, Debug)]
pub enum AppRunError {
    #[error("Failed to start application (config): {source}")]
    ConfigError { #[from] source: ConfigError },

    #[error("Failed to start application (io): {source}")]
    IOError { #[from] source: io::Error },

    #[error("Failed to start application (session): {source}")]
    SessionError { #[from] source: SessionError },
}

/// Errors of the pairing flow and of the session command interface.
///
/// Lifecycle errors (`Discovery`, `MissingCapability`, `Connection`) are caught once at the
/// top of the pairing flow and turned into a registry update; they never abort the session.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to enumerate services/characteristics (btleplug): {source}")]
    Discovery { source: btleplug::Error },

    #[error("A required bluetooth characteristic is not available: {name}")]
    MissingCapability { name: &'static str },

    #[error("Error communicating with device (btleplug): {source}")]
    Connection { #[from] source: btleplug::Error },

    #[error("No bluetooth MIDI device found")]
    NoDeviceFound,

    #[error("Unknown device {id}")]
    UnknownDevice { id: DeviceId },

    #[error("Pairing is not available until the output sink is initialized")]
    NotInitialized,

    #[error("The session has stopped")]
    SessionClosed,
}

impl From<SendError> for SessionError {
    fn from(_: SendError) -> Self {
        SessionError::SessionClosed
    }
}

impl From<Canceled> for SessionError {
    fn from(_: Canceled) -> Self {
        SessionError::SessionClosed
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Message too short: expected 3 bytes, got {len}")]
    TooShort { len: usize },

    #[error("Invalid status byte {status:#04x}")]
    InvalidStatus { status: u8 },

    #[error("Invalid data byte {value:#04x}")]
    InvalidData { value: u8 },
}
