//! Serial port scanner
//!
//! Lists serial ports and ranks them by how likely they are to carry a module.

use serde::{Deserialize, Serialize};
use serialport::{available_ports, SerialPortType};
use tracing::info;

use crate::error::DetectError;
use crate::usb_ids::{classify_port, PortClassification};

/// Information about a serial port
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialPortInfo {
    /// Port name (e.g., /dev/ttyUSB0, COM3)
    pub port: String,
    /// USB Vendor ID (if USB)
    pub vid: Option<u16>,
    /// USB Product ID (if USB)
    pub pid: Option<u16>,
    /// USB serial number (if available)
    pub serial_number: Option<String>,
    /// USB manufacturer string
    pub manufacturer: Option<String>,
    /// USB product string
    pub product: Option<String>,
    /// Short adapter description, e.g. "CH340" or "onboard UART"
    pub hint: Option<String>,
}

impl SerialPortInfo {
    /// Create from serialport crate's port info
    fn from_serialport(name: String, port_type: &SerialPortType) -> Self {
        let mut info = match port_type {
            SerialPortType::UsbPort(usb) => Self {
                port: name,
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                serial_number: usb.serial_number.clone(),
                manufacturer: usb.manufacturer.clone(),
                product: usb.product.clone(),
                hint: None,
            },
            _ => Self {
                port: name,
                vid: None,
                pid: None,
                serial_number: None,
                manufacturer: None,
                product: None,
                hint: None,
            },
        };
        info.hint = info.classify().1.map(str::to_string);
        info
    }

    pub fn classify(&self) -> (PortClassification, Option<&'static str>) {
        classify_port(self.vid, self.pid, &self.port)
    }
}

/// Serial port scanner configuration
#[derive(Debug, Clone, Default)]
pub struct ScannerConfig {
    /// Skip ports matching these patterns
    pub skip_patterns: Vec<String>,
}

/// Serial port scanner
pub struct PortScanner {
    config: ScannerConfig,
}

impl PortScanner {
    /// Create a new scanner with default configuration
    pub fn new() -> Self {
        Self {
            config: ScannerConfig {
                skip_patterns: vec![
                    // Bluetooth ports on macOS
                    "Bluetooth".to_string(),
                    "debug".to_string(),
                ],
            },
        }
    }

    /// Create a scanner with custom configuration
    pub fn with_config(config: ScannerConfig) -> Self {
        Self { config }
    }

    /// Enumerate available serial ports, known adapters first
    pub fn enumerate_ports(&self) -> Result<Vec<SerialPortInfo>, DetectError> {
        info!("Enumerating serial ports...");
        let ports = available_ports()?;

        let infos = ports
            .into_iter()
            .map(|p| SerialPortInfo::from_serialport(p.port_name, &p.port_type));
        let result = self.filter_and_rank(infos);

        if result.is_empty() {
            info!("No serial ports found");
        } else {
            info!("Found {} serial port(s)", result.len());
            for port in &result {
                let desc = port
                    .hint
                    .as_deref()
                    .or(port.product.as_deref())
                    .unwrap_or("Unknown");
                info!("  {} - {}", port.port, desc);
            }
        }

        Ok(result)
    }

    fn filter_and_rank<I>(&self, ports: I) -> Vec<SerialPortInfo>
    where
        I: IntoIterator<Item = SerialPortInfo>,
    {
        let mut result: Vec<_> = ports
            .into_iter()
            .filter(|p| !self.should_skip_port(p))
            .collect();
        // Stable, so ports keep OS order within a tier
        result.sort_by_key(|p| p.classify().0);
        result
    }

    /// Check if a port should be skipped
    fn should_skip_port(&self, port: &SerialPortInfo) -> bool {
        self.config
            .skip_patterns
            .iter()
            .any(|pattern| port.port.contains(pattern.as_str()))
    }
}

impl Default for PortScanner {
    fn default() -> Self {
        Self::new()
    }
}
