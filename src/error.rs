use std::io;
use std::str::Utf8Error;
use thiserror::Error;

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
    #[error("Failed to start bridge (config): {source}")]
    ConfigError { #[from] source: ConfigError },

    #[error("Failed to start bridge (json): {source}")]
    JsonError { #[from] source: serde_json::Error },

    #[error("Unknown extension: {0}")]
    UnknownExtension(String),
}

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Error communicating with device (btleplug): {source}")]
    Btle { #[from] source: btleplug::Error },

    #[error("A required bluetooth service is not available")]
    MissingService,

    #[error("A required bluetooth characteristic is not available")]
    MissingCharacteristic,

    #[error("No scanned peripheral has the id {0}")]
    UnknownPeripheral(String),

    #[error("The peripheral is not connected")]
    NotConnected,

    #[error("Timed out waiting for the peripheral")]
    Timeout,

    #[error("Measurement protocol failure: {0}")]
    Protocol(String),
}
