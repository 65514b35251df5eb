use std::io;
use thiserror::Error;
use msgbox::IconType;
use std::fmt::Display;
use std::str::Utf8Error;
use btleplug;
use iced;
use serde_json;

use crate::device::types::{SessionState, Stage};
use crate::form::FormField;

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

impl ConfigError {
    pub fn is_file_not_found_error(&self) -> bool {
        match self {
            ConfigError::IOError { source } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum AppRunError {
    #[error("Failed to start application (iced): {source}")]
    Iced { #[from] source: iced::Error },

    #[error("Failed to start application (config): {source}")]
    ConfigError { #[from] source: ConfigError },
}

/// Failures inside the btleplug transport, before they are reduced to a stage and a message.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Error communicating with device (btleplug): {source}")]
    Btle { #[from] source: btleplug::Error },

    #[error("No Bluetooth adapter found")]
    NoAdapter,

    #[error("Peripheral {0} is no longer known to the adapter")]
    UnknownDevice(String),

    #[error("The vitals service is not available")]
    MissingService,

    #[error("A required bluetooth characteristic is not available")]
    MissingCharacteristic,

    #[error("No peripheral is connected")]
    NotConnected,
}

/// Errors of the BLE session. The Display text of the transport variants is the status line shown
/// to the user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Error during scan: {detail}")]
    Discovery { detail: String },

    #[error("Connection Error: {detail}")]
    Connection { detail: String },

    #[error("Service Error ({detail}). Disconnecting.")]
    Subscription { detail: String },

    #[error("Error: Data characteristic not found.")]
    MissingCharacteristic,

    #[error("Can not start a scan while {state}")]
    Busy { state: SessionState },
}

impl SessionError {
    pub fn from_stage(stage: Stage, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        match stage {
            Stage::Discovery => SessionError::Discovery { detail },
            Stage::Connection => SessionError::Connection { detail },
            Stage::Subscription => SessionError::Subscription { detail },
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            SessionError::Discovery { .. } => Some(Stage::Discovery),
            SessionError::Connection { .. } => Some(Stage::Connection),
            SessionError::Subscription { .. } | SessionError::MissingCharacteristic => Some(Stage::Subscription),
            SessionError::Busy { .. } => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Malformed vitals payload: {reason}")]
pub struct MalformedPayload {
    pub reason: String,
}

impl MalformedPayload {
    pub fn new(reason: impl Into<String>) -> Self {
        MalformedPayload { reason: reason.into() }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InferenceError {
    #[error("Failed to load model: {detail}")]
    AssetLoad { detail: String },

    #[error("Inference failed: {detail}")]
    Runtime { detail: String },
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormError {
    #[error("All fields must be filled out before submission.")]
    MissingFields,

    #[error("Invalid {}.", .field.title())]
    Invalid { field: FormField },
}

pub fn error_msgbox<T: Display>(message: &'static str, error: &T) {
    let message = format!("{}: {}", message, error);
    eprintln!("{}", &message);
    if let Err(err) = msgbox::create(concat!("Vitals Monitor ", env!("CARGO_PKG_VERSION")), &message, IconType::Error) {
        eprintln!("Failed to create msgbox: {:?}", err);
    }
}
