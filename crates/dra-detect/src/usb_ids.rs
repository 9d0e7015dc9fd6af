//! USB Vendor/Product IDs of serial adapters found on DRA818 carrier boards
//!
//! Most breakout boards put a USB-to-UART bridge in front of the module;
//! single-board computers wire it straight to an onboard UART instead.

/// USB Vendor ID / Product ID pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbId {
    pub vid: u16,
    pub pid: u16,
}

impl UsbId {
    pub const fn new(vid: u16, pid: u16) -> Self {
        Self { vid, pid }
    }
}

/// FTDI (Future Technology Devices International)
pub mod ftdi {
    use super::UsbId;

    pub const VID: u16 = 0x0403;

    pub const FT232R: UsbId = UsbId::new(VID, 0x6001);
    pub const FT231X: UsbId = UsbId::new(VID, 0x6015);

    pub const ALL_PIDS: &[u16] = &[0x6001, 0x6010, 0x6011, 0x6014, 0x6015];
}

/// Silicon Labs CP210x
pub mod cp210x {
    use super::UsbId;

    pub const VID: u16 = 0x10C4;

    pub const CP2102: UsbId = UsbId::new(VID, 0xEA60);

    pub const ALL_PIDS: &[u16] = &[0xEA60, 0xEA70, 0xEA71];
}

/// WCH CH340/CH341
pub mod ch340 {
    use super::UsbId;

    pub const VID: u16 = 0x1A86;

    pub const CH340: UsbId = UsbId::new(VID, 0x7523);
    pub const CH341: UsbId = UsbId::new(VID, 0x5523);

    pub const ALL_PIDS: &[u16] = &[0x7523, 0x5523];
}

/// Prolific PL2303
pub mod prolific {
    use super::UsbId;

    pub const VID: u16 = 0x067B;

    pub const PL2303: UsbId = UsbId::new(VID, 0x2303);

    pub const ALL_PIDS: &[u16] = &[0x2303];
}

/// Device name prefixes of UARTs built into the host
const ONBOARD_UART_PREFIXES: &[&str] = &[
    "/dev/ttyS",
    "/dev/ttyAMA",
    "/dev/ttyTHS",
    "/dev/serial0",
    "/dev/serial1",
];

/// Check if a VID/PID is a known serial adapter
pub fn is_known_serial_adapter(vid: u16, pid: u16) -> bool {
    match vid {
        ftdi::VID => ftdi::ALL_PIDS.contains(&pid),
        cp210x::VID => cp210x::ALL_PIDS.contains(&pid),
        ch340::VID => ch340::ALL_PIDS.contains(&pid),
        prolific::VID => prolific::ALL_PIDS.contains(&pid),
        _ => false,
    }
}

/// Get adapter type name from VID
pub fn adapter_name(vid: u16) -> Option<&'static str> {
    match vid {
        ftdi::VID => Some("FTDI"),
        cp210x::VID => Some("CP210x"),
        ch340::VID => Some("CH340"),
        prolific::VID => Some("PL2303"),
        _ => None,
    }
}

/// Whether a device path names a host UART (Raspberry Pi header, PC COM port)
pub fn is_onboard_uart(port_name: &str) -> bool {
    ONBOARD_UART_PREFIXES
        .iter()
        .any(|prefix| port_name.starts_with(prefix))
}

/// Port classification, most likely module connection first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PortClassification {
    /// Known USB-to-UART bridge
    KnownAdapter,
    /// UART on the host board
    OnboardUart,
    /// Anything else
    Unknown,
}

/// Classify a port based on USB IDs and port name
///
/// Returns the classification tier and an optional hint for display
pub fn classify_port(
    vid: Option<u16>,
    pid: Option<u16>,
    port_name: &str,
) -> (PortClassification, Option<&'static str>) {
    if let (Some(v), Some(p)) = (vid, pid) {
        if is_known_serial_adapter(v, p) {
            return (PortClassification::KnownAdapter, adapter_name(v));
        }
    }

    if is_onboard_uart(port_name) {
        return (PortClassification::OnboardUart, Some("onboard UART"));
    }

    (PortClassification::Unknown, None)
}
