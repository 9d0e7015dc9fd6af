//! DRA818 Protocol Library
//!
//! This crate provides encoding and parsing for the ASCII AT command set of
//! Dorji DRA818-family VHF/UHF transceiver modules (and SA818 clones).
//!
//! # Architecture
//!
//! - [`params`]: validated parameter types whose `Display` is the wire form
//! - [`command`]: the command set and single-line reply parsing
//! - [`codec`]: a streaming line splitter for bytes read off the serial port
//! - [`models`]: known module variants and their RF bands
//!
//! Every command is one CRLF-terminated line and is answered by one line.
//! Acknowledgements carry `0` for success and `1` for failure.
//!
//! # Example
//!
//! ```rust
//! use dra_protocol::{Command, EncodeCommand, LineCodec, ReplyCodec, Response, Volume};
//!
//! let cmd = Command::SetVolume(Volume::new(4).unwrap());
//! assert_eq!(cmd.encode(), b"AT+DMOSETVOLUME=4\r\n");
//!
//! let mut codec = LineCodec::new();
//! codec.push_bytes(b"+DMOSETVOLUME:0\r\n");
//! let reply = codec.next_response().unwrap();
//! assert!(cmd.is_answered_by(&reply));
//! assert_eq!(reply.as_bool(), Some(true));
//! ```

pub mod codec;
pub mod command;
pub mod error;
pub mod models;
pub mod params;

pub use codec::LineCodec;
pub use command::{
    is_valid_handshake_response, probe_command, AckKind, Command, ExpectedReply, Response,
    TERMINATOR,
};
pub use error::{ParseError, ProtocolError};
pub use models::{ModuleDatabase, ModuleModel};
pub use params::{Bandwidth, FilterConfig, Frequency, GroupConfig, Squelch, Tone, Volume};

/// Trait for codecs that split an incoming byte stream into reply lines
pub trait ReplyCodec {
    /// Push raw bytes into the codec's buffer
    fn push_bytes(&mut self, data: &[u8]);

    /// Try to extract the next complete, non-empty line (terminator stripped)
    fn next_line(&mut self) -> Option<String>;

    /// Try to extract and parse the next complete reply
    fn next_response(&mut self) -> Option<Response>;

    /// Clear the internal buffer
    fn clear(&mut self);
}

/// Trait for commands that can be encoded to bytes
pub trait EncodeCommand {
    /// Encode this command to its wire format
    fn encode(&self) -> Vec<u8>;
}
