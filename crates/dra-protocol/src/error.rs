//! Error types for DRA818 parameter validation and reply parsing

use thiserror::Error;

/// Errors that can occur while parsing parameters or module replies
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Line does not have the shape of any known reply
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// Unknown or unsupported command
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// Invalid frequency string (expected `MMM.FFFF`)
    #[error("invalid frequency: {0}")]
    InvalidFrequency(String),

    /// Frequency outside the band of the selected module
    #[error("frequency {0} MHz is out of band")]
    OutOfBand(String),

    /// Invalid CTCSS/CDCSS code
    #[error("invalid tone: {0}")]
    InvalidTone(String),

    /// Invalid channel spacing value
    #[error("invalid bandwidth: {0}")]
    InvalidBandwidth(String),

    /// Numeric level outside its accepted range
    #[error("{name} must be in {min}..={max}, got {value}")]
    OutOfRange {
        name: &'static str,
        min: u8,
        max: u8,
        value: String,
    },

    /// Invalid filter/flag digit
    #[error("invalid flag: {0} (expected 0 or 1)")]
    InvalidFlag(String),
}

/// Errors raised by a command/reply exchange
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Parse error
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// No reply line within the allotted time
    #[error("communication timeout after {0}ms")]
    Timeout(u64),

    /// Reply does not acknowledge the command that was sent
    #[error("unexpected response to {command}: {response:?}")]
    UnexpectedResponse { command: String, response: String },
}
