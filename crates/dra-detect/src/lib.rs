//! DRA818 Serial Port Detection Library
//!
//! This crate provides serial port enumeration and handshake probing for
//! DRA818-family modules.
//!
//! # Example
//!
//! ```rust,no_run
//! use dra_detect::PortScanner;
//!
//! let scanner = PortScanner::new();
//! let ports = scanner.enumerate_ports().unwrap();
//!
//! for port in ports {
//!     println!("Found port: {}", port.port);
//! }
//! ```

pub mod error;
pub mod probe;
pub mod scanner;
pub mod usb_ids;

pub use error::DetectError;
pub use probe::{
    probe_port, probe_port_bauds, probe_port_with_config, ModuleProber, ProbeConfig, ProbeResult,
};
pub use scanner::{PortScanner, ScannerConfig, SerialPortInfo};
pub use usb_ids::PortClassification;
