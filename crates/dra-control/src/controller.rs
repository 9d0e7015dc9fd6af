//! Serial controller for a DRA818 module
//!
//! The controller owns the byte stream to the module and the settings that
//! describe what the module should be tuned to. Every exchange is strictly
//! one command line out, one reply line back, bounded by a timeout.
//!
//! The stream type is generic so tests and simulations can substitute an
//! in-memory `DuplexStream` from `tokio::io::duplex()` for the serial port.

use std::io::ErrorKind;
use std::time::Duration;

use dra_protocol::{
    Command, EncodeCommand, FilterConfig, Frequency, GroupConfig, LineCodec, ProtocolError,
    ReplyCodec, Response, Volume,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info, trace, warn};

use crate::error::ControlError;
use crate::settings::{SettingKey, Settings, SyncTarget};

/// Default time to wait for a reply line
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(2);

/// Outcome of [`Dra818::initialize`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitReport {
    /// `DMOSETGROUP` was acknowledged
    pub group: bool,
    /// `SETFILTER` was acknowledged
    pub filter: bool,
}

impl InitReport {
    pub fn all_ok(&self) -> bool {
        self.group && self.filter
    }
}

/// Controller for a single DRA818 module
pub struct Dra818<T> {
    io: T,
    port_name: String,
    settings: Settings,
    codec: LineCodec,
    reply_timeout: Duration,
    buffer: Vec<u8>,
    /// Commands that timed out; their replies may still arrive
    owed_replies: usize,
}

impl Dra818<SerialStream> {
    /// Open `settings.device` at `settings.baud`
    pub fn open(settings: Settings) -> Result<Self, ControlError> {
        let stream = tokio_serial::new(&settings.device, settings.baud)
            .timeout(Duration::from_millis(100))
            .open_native_async()?;

        info!("Opened {} at {} baud", settings.device, settings.baud);

        let name = settings.device.clone();
        Ok(Self::new(name, stream, settings))
    }
}

impl<T> Dra818<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an already-open stream
    pub fn new(name: impl Into<String>, io: T, settings: Settings) -> Self {
        Self {
            io,
            port_name: name.into(),
            settings,
            codec: LineCodec::new(),
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            buffer: vec![0u8; 256],
            owed_replies: 0,
        }
    }

    /// Builder-style reply timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.reply_timeout = timeout;
    }

    pub fn timeout(&self) -> Duration {
        self.reply_timeout
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Give back the underlying stream
    pub fn into_inner(self) -> T {
        self.io
    }

    /// Write one command and read exactly one reply line
    pub async fn send_command(&mut self, cmd: &Command) -> Result<Response, ControlError> {
        self.discard_stale_input(cmd).await?;

        let line = cmd.encode();
        debug!("{} -> {}", self.port_name, cmd);
        self.io.write_all(&line).await?;
        self.io.flush().await?;

        let reply = match self.read_reply().await {
            Ok(reply) => reply,
            Err(e) => {
                if matches!(e, ControlError::Protocol(ProtocolError::Timeout(_))) {
                    self.owed_replies += 1;
                }
                return Err(e);
            }
        };
        debug!("{} <- {}", self.port_name, reply);
        Ok(reply)
    }

    /// Drop input that belongs to earlier exchanges
    ///
    /// Bytes already waiting are always discarded. After a timeout the late
    /// reply is waited for (up to one reply timeout) so it cannot be taken
    /// as the answer to `cmd`.
    async fn discard_stale_input(&mut self, cmd: &Command) -> Result<(), ControlError> {
        if self.codec.pending() > 0 {
            trace!("Dropping {} stale bytes before {}", self.codec.pending(), cmd.name());
            self.codec.clear();
        }

        let owed = std::mem::take(&mut self.owed_replies);
        let grace = if owed > 0 {
            self.reply_timeout
        } else {
            Duration::ZERO
        };
        let deadline = Instant::now() + grace;
        let mut dropped = 0;

        loop {
            while let Some(line) = self.codec.next_line() {
                debug!("{} dropping late reply {:?}", self.port_name, line);
                dropped += 1;
            }
            if owed > 0 && dropped >= owed {
                break;
            }

            match tokio::time::timeout_at(deadline, self.io.read(&mut self.buffer)).await {
                Ok(Ok(0)) => return Err(ControlError::Disconnected),
                Ok(Ok(n)) => self.codec.push_bytes(&self.buffer[..n]),
                Ok(Err(e)) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    break
                }
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => break,
            }
        }

        if owed > dropped {
            debug!(
                "{}: {} timed-out command(s) never answered",
                self.port_name,
                owed - dropped
            );
        }
        self.codec.clear();
        Ok(())
    }

    async fn read_reply(&mut self) -> Result<Response, ControlError> {
        let deadline = Instant::now() + self.reply_timeout;

        loop {
            if let Some(reply) = self.codec.next_response() {
                return Ok(reply);
            }

            match tokio::time::timeout_at(deadline, self.io.read(&mut self.buffer)).await {
                Ok(Ok(0)) => return Err(ControlError::Disconnected),
                Ok(Ok(n)) => {
                    trace!("Read {} bytes: {:02X?}", n, &self.buffer[..n]);
                    self.codec.push_bytes(&self.buffer[..n]);
                }
                Ok(Err(e)) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    if Instant::now() >= deadline {
                        return Err(self.timeout_error());
                    }
                }
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => return Err(self.timeout_error()),
            }
        }
    }

    fn timeout_error(&self) -> ControlError {
        ProtocolError::Timeout(self.reply_timeout.as_millis() as u64).into()
    }

    fn unexpected(cmd: &Command, reply: &Response) -> ControlError {
        ProtocolError::UnexpectedResponse {
            command: cmd.name().to_string(),
            response: reply.to_string(),
        }
        .into()
    }

    /// Send a command whose reply is an acknowledgement; `true` when accepted
    pub async fn send_at_command(&mut self, cmd: &Command) -> Result<bool, ControlError> {
        let reply = self.send_command(cmd).await?;

        match (&reply, cmd.is_answered_by(&reply)) {
            (Response::Ack { success, .. }, true) => {
                if !success {
                    warn!("{} rejected {}", self.port_name, cmd.name());
                }
                Ok(*success)
            }
            _ => Err(Self::unexpected(cmd, &reply)),
        }
    }

    /// `AT+DMOCONNECT`
    pub async fn handshake(&mut self) -> Result<bool, ControlError> {
        self.send_at_command(&Command::Connect).await
    }

    /// Handshake, then push group and filter settings
    ///
    /// A failed handshake is an error. Rejected group or filter settings are
    /// logged and reported but do not abort initialization.
    pub async fn initialize(&mut self) -> Result<InitReport, ControlError> {
        if !self.handshake().await? {
            return Err(ControlError::HandshakeFailed);
        }
        info!("Handshake with {} OK", self.port_name);

        let group = self.set_group().await?;
        if !group {
            warn!("DMO settings error on {}", self.port_name);
        }

        let filter = self.set_filter().await?;
        if !filter {
            warn!("Filter settings error on {}", self.port_name);
        }

        Ok(InitReport { group, filter })
    }

    /// Send the stored group settings
    pub async fn set_group(&mut self) -> Result<bool, ControlError> {
        let cmd = Command::SetGroup(self.settings.group());
        self.send_at_command(&cmd).await
    }

    /// Store and send new group settings
    pub async fn apply_group(&mut self, group: GroupConfig) -> Result<bool, ControlError> {
        self.settings.set_group(group);
        self.set_group().await
    }

    /// Store and send a volume level
    pub async fn set_volume(&mut self, volume: Volume) -> Result<bool, ControlError> {
        self.settings.vol = volume;
        self.send_at_command(&Command::SetVolume(volume)).await
    }

    /// Send the stored filter switches
    pub async fn set_filter(&mut self) -> Result<bool, ControlError> {
        let cmd = Command::SetFilter(self.settings.filter());
        self.send_at_command(&cmd).await
    }

    /// Store and send new filter switches
    pub async fn apply_filter(&mut self, filter: FilterConfig) -> Result<bool, ControlError> {
        self.settings.set_filter(filter);
        self.set_filter().await
    }

    /// Enable or disable squelch tail elimination
    pub async fn set_tail(&mut self, enabled: bool) -> Result<bool, ControlError> {
        self.send_at_command(&Command::SetTail(enabled)).await
    }

    /// Check `freq` for a carrier; `true` when a signal is present
    pub async fn scan(&mut self, freq: Frequency) -> Result<bool, ControlError> {
        let cmd = Command::Scan(freq);
        match self.send_command(&cmd).await? {
            Response::Scan { signal } => Ok(signal),
            other => Err(Self::unexpected(&cmd, &other)),
        }
    }

    /// Received signal strength
    pub async fn read_rssi(&mut self) -> Result<u8, ControlError> {
        let cmd = Command::ReadRssi;
        match self.send_command(&cmd).await? {
            Response::Rssi(v) => Ok(v),
            other => Err(Self::unexpected(&cmd, &other)),
        }
    }

    /// Firmware version string
    pub async fn version(&mut self) -> Result<String, ControlError> {
        let cmd = Command::Version;
        match self.send_command(&cmd).await? {
            Response::Version(v) => Ok(v),
            other => Err(Self::unexpected(&cmd, &other)),
        }
    }

    /// Read a setting in its text form
    pub fn get(&self, key: &str) -> Result<String, ControlError> {
        self.settings.get_by_name(key)
    }

    /// Update a setting and push it to the module
    ///
    /// Returns the acknowledgement of the command that carries the key, or
    /// `None` for `device`/`baud`, which only apply when the port is reopened.
    pub async fn set(&mut self, key: &str, value: &str) -> Result<Option<bool>, ControlError> {
        let key: SettingKey = self.settings.set_by_name(key, value)?;
        debug!("Setting {} = {}", key, self.settings.get(key));

        match key.sync_target() {
            SyncTarget::Group => self.set_group().await.map(Some),
            SyncTarget::Volume => {
                let cmd = Command::SetVolume(self.settings.vol);
                self.send_at_command(&cmd).await.map(Some)
            }
            SyncTarget::Filter => self.set_filter().await.map(Some),
            SyncTarget::Reopen => {
                info!("{} changed; takes effect on next open", key);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncBufReadExt, BufReader};

    /// Answer each received line with the next canned reply
    async fn scripted_module(stream: tokio::io::DuplexStream, replies: Vec<&'static str>) -> Vec<String> {
        let (read, mut write) = tokio::io::split(stream);
        let mut lines = BufReader::new(read).lines();
        let mut received = Vec::new();
        for reply in replies {
            match lines.next_line().await {
                Ok(Some(line)) => received.push(line),
                _ => break,
            }
            write.write_all(reply.as_bytes()).await.unwrap();
        }
        received
    }

    #[tokio::test]
    async fn test_send_at_command_success_and_rejection() {
        let (host, module) = duplex(256);
        let module = tokio::spawn(scripted_module(
            module,
            vec!["+DMOCONNECT:0\r\n", "+DMOSETVOLUME:1\r\n"],
        ));

        let mut ctl = Dra818::new("test", host, Settings::default());
        assert!(ctl.handshake().await.unwrap());
        assert!(!ctl.set_volume(Volume::new(3).unwrap()).await.unwrap());
        assert_eq!(ctl.settings().vol.level(), 3);

        let received = module.await.unwrap();
        assert_eq!(received, vec!["AT+DMOCONNECT", "AT+DMOSETVOLUME=3"]);
    }

    #[tokio::test]
    async fn test_mismatched_reply_is_error() {
        let (host, module) = duplex(256);
        tokio::spawn(scripted_module(module, vec!["+DMOSETGROUP:0\r\n"]));

        let mut ctl = Dra818::new("test", host, Settings::default());
        let err = ctl.handshake().await.unwrap_err();
        assert!(matches!(
            err,
            ControlError::Protocol(ProtocolError::UnexpectedResponse { .. })
        ));
    }

    #[tokio::test]
    async fn test_garbage_status_is_error() {
        let (host, module) = duplex(256);
        tokio::spawn(scripted_module(module, vec!["+DMOCONNECT:7\r\n"]));

        let mut ctl = Dra818::new("test", host, Settings::default());
        assert!(ctl.handshake().await.is_err());
    }

    #[tokio::test]
    async fn test_timeout() {
        let (host, _module) = duplex(256);
        let mut ctl =
            Dra818::new("test", host, Settings::default()).with_timeout(Duration::from_millis(20));

        let err = ctl.handshake().await.unwrap_err();
        assert!(matches!(
            err,
            ControlError::Protocol(ProtocolError::Timeout(20))
        ));
    }

    #[tokio::test]
    async fn test_disconnect() {
        let (host, module) = duplex(256);
        drop(module);

        let mut ctl = Dra818::new("test", host, Settings::default());
        let err = ctl.handshake().await.unwrap_err();
        assert!(matches!(err, ControlError::Disconnected));
    }

    #[tokio::test]
    async fn test_module_closing_mid_exchange_is_disconnect() {
        let (host, module) = duplex(256);
        let module = tokio::spawn(async move {
            let mut lines = BufReader::new(module).lines();
            lines.next_line().await.unwrap()
        });

        let mut ctl = Dra818::new("test", host, Settings::default());
        let err = ctl.handshake().await.unwrap_err();
        assert!(matches!(err, ControlError::Disconnected));
        assert_eq!(module.await.unwrap().as_deref(), Some("AT+DMOCONNECT"));
    }

    #[tokio::test]
    async fn test_late_reply_is_not_taken_for_next_command() {
        let (host, module) = duplex(256);
        tokio::spawn(async move {
            let (read, mut write) = tokio::io::split(module);
            let mut lines = BufReader::new(read).lines();

            // First answer arrives after the controller gave up
            lines.next_line().await.unwrap();
            tokio::time::sleep(Duration::from_millis(80)).await;
            write.write_all(b"+DMOSETVOLUME:1\r\n").await.unwrap();

            while let Ok(Some(_)) = lines.next_line().await {
                write.write_all(b"+DMOSETVOLUME:0\r\n").await.unwrap();
            }
        });

        let mut ctl =
            Dra818::new("test", host, Settings::default()).with_timeout(Duration::from_millis(50));
        let volume = Volume::new(4).unwrap();

        let err = ctl.set_volume(volume).await.unwrap_err();
        assert!(matches!(
            err,
            ControlError::Protocol(ProtocolError::Timeout(50))
        ));
        assert!(ctl.set_volume(volume).await.unwrap());
        assert!(ctl.set_volume(volume).await.unwrap());
    }

    #[tokio::test]
    async fn test_scan_reply_mapping() {
        let (host, module) = duplex(256);
        tokio::spawn(scripted_module(module, vec!["S=0\r\n", "S=1\r\n"]));

        let mut ctl = Dra818::new("test", host, Settings::default());
        let freq: Frequency = "145.5000".parse().unwrap();
        assert!(ctl.scan(freq).await.unwrap());
        assert!(!ctl.scan(freq).await.unwrap());
    }

    #[test]
    fn test_init_report() {
        assert!(InitReport {
            group: true,
            filter: true
        }
        .all_ok());
        assert!(!InitReport {
            group: true,
            filter: false
        }
        .all_ok());
    }
}
