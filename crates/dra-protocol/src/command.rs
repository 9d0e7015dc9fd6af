//! DRA818 AT command set
//!
//! Commands are ASCII lines terminated by CRLF. Every command is answered
//! by exactly one line.
//!
//! # Format
//! - Settings: `AT+DMOSETGROUP=0,146.5200,146.5200,0000,1,0000\r\n`
//! - Acknowledgements: `+DMOSETGROUP:0` (`0` = accepted, `1` = rejected)
//! - Scan: `S+146.5200\r\n` answered by `S=0` (carrier present) or `S=1`
//!
//! # Commands
//! - `AT+DMOCONNECT` - handshake
//! - `AT+DMOSETGROUP` - frequencies, spacing, tones, squelch
//! - `AT+DMOSETVOLUME` - audio volume
//! - `AT+SETFILTER` - emphasis / high-pass / low-pass switches
//! - `AT+SETTAIL` - squelch tail elimination
//! - `S+` - carrier scan on a frequency
//! - `RSSI?` - received signal strength
//! - `AT+VERSION` - firmware version

use std::fmt;

use crate::error::ParseError;
use crate::params::{flag_digit, parse_flag, FilterConfig, Frequency, GroupConfig, Volume};
use crate::EncodeCommand;

/// Command line terminator
pub const TERMINATOR: &[u8] = b"\r\n";

/// A command sent to the module
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Command {
    /// Handshake: `AT+DMOCONNECT`
    Connect,
    /// Group settings: `AT+DMOSETGROUP=gbw,tx,rx,tx_tone,sq,rx_tone`
    SetGroup(GroupConfig),
    /// Carrier scan: `S+freq`
    Scan(Frequency),
    /// Volume: `AT+DMOSETVOLUME=n`
    SetVolume(Volume),
    /// Filters: `AT+SETFILTER=emph,hp,lp`
    SetFilter(FilterConfig),
    /// Tail tone elimination: `AT+SETTAIL=0|1`
    SetTail(bool),
    /// Signal strength query: `RSSI?`
    ReadRssi,
    /// Firmware version query: `AT+VERSION`
    Version,
}

/// Acknowledgement tags, one per settable command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AckKind {
    Connect,
    SetGroup,
    SetVolume,
    SetFilter,
    SetTail,
}

impl AckKind {
    /// Tag the module uses in its acknowledgement line
    pub fn tag(&self) -> &'static str {
        match self {
            AckKind::Connect => "DMOCONNECT",
            AckKind::SetGroup => "DMOSETGROUP",
            AckKind::SetVolume => "DMOSETVOLUME",
            AckKind::SetFilter => "DMOSETFILTER",
            AckKind::SetTail => "DMOSETTAIL",
        }
    }

    /// Ack a module sends for a command line, even one with bad parameters
    pub fn for_command_line(line: &str) -> Option<Self> {
        let name = line.split('=').next()?.trim();
        match name {
            "AT+DMOCONNECT" => Some(AckKind::Connect),
            "AT+DMOSETGROUP" => Some(AckKind::SetGroup),
            "AT+DMOSETVOLUME" => Some(AckKind::SetVolume),
            "AT+SETFILTER" => Some(AckKind::SetFilter),
            "AT+SETTAIL" => Some(AckKind::SetTail),
            _ => None,
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "DMOCONNECT" => Some(AckKind::Connect),
            "DMOSETGROUP" => Some(AckKind::SetGroup),
            "DMOSETVOLUME" => Some(AckKind::SetVolume),
            // Some firmware answers SETFILTER with its own command name
            "DMOSETFILTER" | "SETFILTER" => Some(AckKind::SetFilter),
            "DMOSETTAIL" | "SETTAIL" => Some(AckKind::SetTail),
            _ => None,
        }
    }
}

/// Shape of the reply a command expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedReply {
    Ack(AckKind),
    Scan,
    Rssi,
    Version,
}

impl Command {
    /// Which reply acknowledges this command
    pub fn expected_reply(&self) -> ExpectedReply {
        match self {
            Command::Connect => ExpectedReply::Ack(AckKind::Connect),
            Command::SetGroup(_) => ExpectedReply::Ack(AckKind::SetGroup),
            Command::SetVolume(_) => ExpectedReply::Ack(AckKind::SetVolume),
            Command::SetFilter(_) => ExpectedReply::Ack(AckKind::SetFilter),
            Command::SetTail(_) => ExpectedReply::Ack(AckKind::SetTail),
            Command::Scan(_) => ExpectedReply::Scan,
            Command::ReadRssi => ExpectedReply::Rssi,
            Command::Version => ExpectedReply::Version,
        }
    }

    /// Short name used in logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            Command::Connect => "DMOCONNECT",
            Command::SetGroup(_) => "DMOSETGROUP",
            Command::Scan(_) => "S+",
            Command::SetVolume(_) => "DMOSETVOLUME",
            Command::SetFilter(_) => "SETFILTER",
            Command::SetTail(_) => "SETTAIL",
            Command::ReadRssi => "RSSI?",
            Command::Version => "VERSION",
        }
    }

    /// Command line without terminator
    pub fn to_line(&self) -> String {
        match self {
            Command::Connect => "AT+DMOCONNECT".to_string(),
            Command::SetGroup(g) => format!(
                "AT+DMOSETGROUP={},{},{},{},{},{}",
                g.bandwidth, g.tx, g.rx, g.tx_tone, g.squelch, g.rx_tone
            ),
            Command::Scan(freq) => format!("S+{}", freq),
            Command::SetVolume(vol) => format!("AT+DMOSETVOLUME={}", vol),
            Command::SetFilter(f) => format!(
                "AT+SETFILTER={},{},{}",
                flag_digit(f.emphasis),
                flag_digit(f.high_pass),
                flag_digit(f.low_pass)
            ),
            Command::SetTail(on) => format!("AT+SETTAIL={}", if *on { 1 } else { 0 }),
            Command::ReadRssi => "RSSI?".to_string(),
            Command::Version => "AT+VERSION".to_string(),
        }
    }

    /// Parse a command line as the module receives it (terminator optional)
    pub fn from_line(line: &str) -> Result<Command, ParseError> {
        let line = line.trim_end_matches(['\r', '\n']).trim();

        if let Some(freq) = line.strip_prefix("S+") {
            return Ok(Command::Scan(freq.parse()?));
        }

        match line {
            "AT+DMOCONNECT" => return Ok(Command::Connect),
            "RSSI?" => return Ok(Command::ReadRssi),
            "AT+VERSION" => return Ok(Command::Version),
            _ => {}
        }

        let (name, params) = line
            .split_once('=')
            .ok_or_else(|| ParseError::UnknownCommand(line.to_string()))?;
        let fields: Vec<&str> = params.split(',').map(str::trim).collect();
        let arity = |n: usize| {
            if fields.len() == n {
                Ok(())
            } else {
                Err(ParseError::InvalidFrame(format!(
                    "{} expects {} fields, got {}",
                    name,
                    n,
                    fields.len()
                )))
            }
        };

        match name {
            "AT+DMOSETGROUP" => {
                arity(6)?;
                Ok(Command::SetGroup(GroupConfig {
                    bandwidth: fields[0].parse()?,
                    tx: fields[1].parse()?,
                    rx: fields[2].parse()?,
                    tx_tone: fields[3].parse()?,
                    squelch: fields[4].parse()?,
                    rx_tone: fields[5].parse()?,
                }))
            }
            "AT+DMOSETVOLUME" => {
                arity(1)?;
                Ok(Command::SetVolume(fields[0].parse()?))
            }
            "AT+SETFILTER" => {
                arity(3)?;
                Ok(Command::SetFilter(FilterConfig {
                    emphasis: parse_flag(fields[0])?,
                    high_pass: parse_flag(fields[1])?,
                    low_pass: parse_flag(fields[2])?,
                }))
            }
            "AT+SETTAIL" => {
                arity(1)?;
                match fields[0] {
                    "0" => Ok(Command::SetTail(false)),
                    "1" => Ok(Command::SetTail(true)),
                    other => Err(ParseError::InvalidFlag(other.to_string())),
                }
            }
            _ => Err(ParseError::UnknownCommand(line.to_string())),
        }
    }

    /// Check whether a reply matches the shape this command expects
    pub fn is_answered_by(&self, response: &Response) -> bool {
        match (self.expected_reply(), response) {
            (ExpectedReply::Ack(want), Response::Ack { kind, .. }) => want == *kind,
            (ExpectedReply::Scan, Response::Scan { .. }) => true,
            (ExpectedReply::Rssi, Response::Rssi(_)) => true,
            (ExpectedReply::Version, Response::Version(_)) => true,
            _ => false,
        }
    }
}

impl EncodeCommand for Command {
    fn encode(&self) -> Vec<u8> {
        let mut bytes = self.to_line().into_bytes();
        bytes.extend_from_slice(TERMINATOR);
        bytes
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

/// A single reply line from the module
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Response {
    /// `+TAG:0` (success) or `+TAG:1` (failure)
    Ack { kind: AckKind, success: bool },
    /// `S=0` (carrier present) or `S=1` (no carrier)
    Scan { signal: bool },
    /// `RSSI=nnn`
    Rssi(u8),
    /// `+VERSION:text`
    Version(String),
    /// Anything else, preserved verbatim
    Unknown(String),
}

impl Response {
    /// Parse one reply line; trailing CR/LF is ignored
    ///
    /// Lines that cannot be classified are returned as `Unknown`, never as
    /// an error, so the caller decides how to treat noise on the line.
    pub fn parse(line: &str) -> Response {
        let line = line.trim_end_matches(['\r', '\n']).trim();
        match Self::try_parse(line) {
            Ok(resp) => resp,
            Err(e) => {
                tracing::debug!("Unrecognized DRA818 reply {:?}: {}", line, e);
                Response::Unknown(line.to_string())
            }
        }
    }

    fn try_parse(line: &str) -> Result<Response, ParseError> {
        if let Some(status) = line.strip_prefix("S=") {
            return match status.trim() {
                "0" => Ok(Response::Scan { signal: true }),
                "1" => Ok(Response::Scan { signal: false }),
                other => Err(ParseError::InvalidFrame(format!("scan status {:?}", other))),
            };
        }

        if let Some(value) = line.strip_prefix("RSSI=") {
            let rssi = value
                .trim()
                .parse::<u8>()
                .map_err(|_| ParseError::InvalidFrame(format!("RSSI value {:?}", value)))?;
            return Ok(Response::Rssi(rssi));
        }

        let body = line
            .strip_prefix('+')
            .ok_or_else(|| ParseError::InvalidFrame(line.to_string()))?;
        let (tag, value) = body
            .split_once(':')
            .ok_or_else(|| ParseError::InvalidFrame(line.to_string()))?;

        if tag == "VERSION" {
            return Ok(Response::Version(value.trim().to_string()));
        }

        let kind = AckKind::from_tag(tag)
            .ok_or_else(|| ParseError::InvalidFrame(format!("unknown tag {:?}", tag)))?;
        let success = match value.trim() {
            "0" => true,
            "1" => false,
            other => {
                return Err(ParseError::InvalidFrame(format!(
                    "{} status {:?}",
                    tag, other
                )))
            }
        };
        Ok(Response::Ack { kind, success })
    }

    /// The boolean carried by an ack or scan reply
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Response::Ack { success, .. } => Some(*success),
            Response::Scan { signal } => Some(*signal),
            _ => None,
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Ack { kind, success } => {
                write!(f, "+{}:{}", kind.tag(), if *success { 0 } else { 1 })
            }
            Response::Scan { signal } => write!(f, "S={}", if *signal { 0 } else { 1 }),
            Response::Rssi(v) => write!(f, "RSSI={:03}", v),
            Response::Version(v) => write!(f, "+VERSION:{}", v),
            Response::Unknown(s) => f.write_str(s),
        }
    }
}

/// Handshake probe bytes
pub fn probe_command() -> Vec<u8> {
    Command::Connect.encode()
}

/// Check if a raw buffer holds a successful handshake reply
pub fn is_valid_handshake_response(data: &[u8]) -> bool {
    let text = String::from_utf8_lossy(data);
    text.lines().any(|line| {
        Response::parse(line)
            == Response::Ack {
                kind: AckKind::Connect,
                success: true,
            }
    })
}
