//! Error types for the module controller

use dra_protocol::{ParseError, ProtocolError};
use thiserror::Error;

use crate::settings::SettingKey;

/// Errors that can occur while configuring or talking to a module
#[derive(Debug, Error)]
pub enum ControlError {
    /// Setting name not in the store
    #[error("unknown setting: {0}")]
    UnknownSetting(String),

    /// Value rejected by validation; the store is left unchanged
    #[error("invalid value for {key}: {source}")]
    InvalidSetting {
        key: SettingKey,
        #[source]
        source: ParseError,
    },

    /// Serial port setting (`device`, `baud`) rejected
    #[error("invalid value for {key}: {reason}")]
    InvalidPortSetting { key: SettingKey, reason: String },

    /// Module did not acknowledge `AT+DMOCONNECT`
    #[error("handshake failed: module did not acknowledge DMOCONNECT")]
    HandshakeFailed,

    /// Stream reached end of file while waiting for a reply
    #[error("serial stream closed")]
    Disconnected,

    /// Protocol error (timeout, unexpected reply)
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to open the serial port
    #[error("failed to open serial port: {0}")]
    Serial(#[from] tokio_serial::Error),
}
