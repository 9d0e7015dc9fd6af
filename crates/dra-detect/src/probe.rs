//! Handshake probing for module detection
//!
//! Sends `AT+DMOCONNECT` to a stream and, when the module acknowledges,
//! asks for its firmware version to identify the variant.

use std::time::Duration;

use dra_protocol::{
    is_valid_handshake_response, probe_command, Command, EncodeCommand, LineCodec,
    ModuleDatabase, ModuleModel, ReplyCodec, Response,
};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{timeout_at, Instant};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, trace, warn};

use crate::error::DetectError;

/// Result of probing a serial port
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    /// Identified module variant (if the version string is recognised)
    pub model: Option<ModuleModel>,
    /// Firmware version reported by `AT+VERSION`
    pub version: Option<String>,
    /// Baud rate the module answered at, when probed through a port
    pub baud: Option<u32>,
    /// Raw handshake reply
    pub id_data: Vec<u8>,
}

/// Configuration for probing
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Timeout for each probe exchange
    pub timeout: Duration,
    /// Delay after opening a port before the first probe
    pub settle_delay: Duration,
    /// Ask for the firmware version after a successful handshake
    pub query_version: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(500),
            settle_delay: Duration::from_millis(50),
            query_version: true,
        }
    }
}

/// DRA818 module prober
pub struct ModuleProber {
    config: ProbeConfig,
}

impl ModuleProber {
    /// Create a new prober with default configuration
    pub fn new() -> Self {
        Self {
            config: ProbeConfig::default(),
        }
    }

    /// Create a prober with custom configuration
    pub fn with_config(config: ProbeConfig) -> Self {
        Self { config }
    }

    /// Probe a stream for a DRA818-family module
    pub async fn probe<S>(&self, stream: &mut S) -> Option<ProbeResult>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut codec = LineCodec::new();

        debug!("Probing for DRA818 handshake...");
        let probe = probe_command();
        let raw = self.exchange(stream, &mut codec, &probe).await?;
        trace!("Handshake response: {:?}", String::from_utf8_lossy(&raw));

        if !is_valid_handshake_response(&raw) {
            debug!("No DRA818 handshake acknowledgement");
            return None;
        }

        let version = if self.config.query_version {
            self.query_version(stream, &mut codec).await
        } else {
            None
        };
        let model = version.as_deref().and_then(ModuleDatabase::by_version);

        info!(
            "Identified {} (firmware {})",
            model.as_ref().map(|m| m.model.as_str()).unwrap_or("DRA818"),
            version.as_deref().unwrap_or("unknown")
        );

        Some(ProbeResult {
            model,
            version,
            baud: None,
            id_data: raw,
        })
    }

    /// Older firmware has no `AT+VERSION`; silence here is not a failure
    async fn query_version<S>(&self, stream: &mut S, codec: &mut LineCodec) -> Option<String>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let raw = self
            .exchange(stream, codec, &Command::Version.encode())
            .await?;
        match Response::parse(&String::from_utf8_lossy(&raw)) {
            Response::Version(v) => Some(v),
            other => {
                debug!("No version reply: {}", other);
                None
            }
        }
    }

    /// Write `request` and return the first complete reply line
    async fn exchange<S>(
        &self,
        stream: &mut S,
        codec: &mut LineCodec,
        request: &[u8],
    ) -> Option<Vec<u8>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        codec.clear();
        if let Err(e) = stream.write_all(request).await {
            warn!("Failed to write probe: {}", e);
            return None;
        }
        let _ = stream.flush().await;

        let deadline = Instant::now() + self.config.timeout;
        let mut buf = [0u8; 64];
        loop {
            if let Some(line) = codec.next_line() {
                return Some(line.into_bytes());
            }
            match timeout_at(deadline, stream.read(&mut buf)).await {
                Ok(Ok(0)) => {
                    trace!("Stream closed while probing");
                    return None;
                }
                Ok(Ok(n)) => codec.push_bytes(&buf[..n]),
                Ok(Err(e)) => {
                    trace!("Probe read error: {}", e);
                    return None;
                }
                Err(_) => {
                    trace!("Probe timeout");
                    return None;
                }
            }
        }
    }
}

impl Default for ModuleProber {
    fn default() -> Self {
        Self::new()
    }
}

/// Probe a specific port at a given baud rate
///
/// `Ok(None)` means the port opened but nothing answered the handshake.
pub async fn probe_port(port_name: &str, baud_rate: u32) -> Result<Option<ProbeResult>, DetectError> {
    probe_port_with_config(port_name, baud_rate, ProbeConfig::default()).await
}

/// Probe a port with explicit probe settings
pub async fn probe_port_with_config(
    port_name: &str,
    baud_rate: u32,
    config: ProbeConfig,
) -> Result<Option<ProbeResult>, DetectError> {
    debug!("Probing {} at {} baud", port_name, baud_rate);

    let mut stream = tokio_serial::new(port_name, baud_rate)
        .timeout(Duration::from_millis(100))
        .open_native_async()
        .map_err(|e| DetectError::OpenFailed {
            port: port_name.to_string(),
            reason: e.to_string(),
        })?;

    // Give the port a moment to settle
    tokio::time::sleep(config.settle_delay).await;

    let prober = ModuleProber::with_config(config);
    Ok(prober.probe(&mut stream).await.map(|result| ProbeResult {
        baud: Some(baud_rate),
        ..result
    }))
}

/// Try each baud rate in turn until the module answers
pub async fn probe_port_bauds(
    port_name: &str,
    bauds: &[u32],
) -> Result<Option<ProbeResult>, DetectError> {
    for &baud in bauds {
        if let Some(result) = probe_port(port_name, baud).await? {
            return Ok(Some(result));
        }
    }
    info!("No module answered on {} at {:?}", port_name, bauds);
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dra_sim::{run_virtual_module_task, VirtualModule, VirtualModuleConfig};
    use tokio::sync::{broadcast, mpsc};

    fn fast_config() -> ProbeConfig {
        ProbeConfig {
            timeout: Duration::from_millis(100),
            ..Default::default()
        }
    }

    #[test]
    fn test_probe_config_default() {
        let config = ProbeConfig::default();
        assert_eq!(config.timeout, Duration::from_millis(500));
        assert!(config.query_version);
    }

    #[tokio::test]
    async fn test_probe_identifies_virtual_module() {
        let (mut stream, module_stream) = tokio::io::duplex(1024);
        let module = VirtualModule::from_config(VirtualModuleConfig {
            version: "DRA818U_V1.2".to_string(),
            model: "DRA818U".to_string(),
            ..Default::default()
        });
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (state_tx, _state_rx) = broadcast::channel(8);
        let task = tokio::spawn(run_virtual_module_task(module_stream, module, cmd_rx, state_tx));

        let result = ModuleProber::with_config(fast_config())
            .probe(&mut stream)
            .await
            .unwrap();

        assert_eq!(result.version.as_deref(), Some("DRA818U_V1.2"));
        assert_eq!(result.model.unwrap().model, "DRA818U");
        assert_eq!(result.id_data, b"+DMOCONNECT:0".to_vec());

        drop(cmd_tx);
        drop(stream);
        let _ = task.await;
    }

    #[tokio::test]
    async fn test_probe_silent_module_is_not_detected() {
        let (mut stream, module_stream) = tokio::io::duplex(1024);
        let mut module = VirtualModule::new("Quiet", "DRA818V");
        module.set_silent(true);
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (state_tx, _state_rx) = broadcast::channel(8);
        let task = tokio::spawn(run_virtual_module_task(module_stream, module, cmd_rx, state_tx));

        let result = ModuleProber::with_config(fast_config())
            .probe(&mut stream)
            .await;
        assert!(result.is_none());

        drop(cmd_tx);
        drop(stream);
        let _ = task.await;
    }

    #[tokio::test]
    async fn test_probe_ignores_other_devices() {
        let (mut stream, mut other) = tokio::io::duplex(1024);
        let device = tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let _ = other.read(&mut buf).await;
            let _ = other.write_all(b"ID019;\r\n").await;
            other
        });

        let result = ModuleProber::with_config(fast_config())
            .probe(&mut stream)
            .await;
        assert!(result.is_none());
        let _ = device.await;
    }

    #[tokio::test]
    async fn test_probe_tolerates_missing_version() {
        let (mut stream, mut other) = tokio::io::duplex(1024);
        // Old firmware: acknowledges the handshake, ignores AT+VERSION
        let device = tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let _ = other.read(&mut buf).await;
            let _ = other.write_all(b"+DMOCONNECT:0\r\n").await;
            let _ = other.read(&mut buf).await;
            other
        });

        let result = ModuleProber::with_config(fast_config())
            .probe(&mut stream)
            .await
            .unwrap();
        assert!(result.version.is_none());
        assert!(result.model.is_none());
        let _ = device.await;
    }

    #[tokio::test]
    async fn test_probe_port_missing_device() {
        let err = probe_port("/dev/does-not-exist-dra818", 9600)
            .await
            .unwrap_err();
        assert!(matches!(err, DetectError::OpenFailed { .. }));
    }
}
