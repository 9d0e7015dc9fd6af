//! Error types for module detection

use thiserror::Error;

/// Errors that can occur during detection
#[derive(Debug, Error)]
pub enum DetectError {
    /// Failed to open serial port
    #[error("failed to open port {port}: {reason}")]
    OpenFailed { port: String, reason: String },

    /// Port enumeration or serial port error
    #[error("serial port error: {0}")]
    SerialPort(#[from] serialport::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enumerate(fail: bool) -> Result<usize, DetectError> {
        let ports: Result<Vec<()>, serialport::Error> = if fail {
            Err(serialport::Error::new(serialport::ErrorKind::NoDevice, "no ports"))
        } else {
            Ok(Vec::new())
        };
        Ok(ports?.len())
    }

    #[test]
    fn test_serialport_errors_keep_their_kind() {
        assert_eq!(enumerate(false).unwrap(), 0);

        match enumerate(true).unwrap_err() {
            DetectError::SerialPort(e) => {
                assert_eq!(e.kind(), serialport::ErrorKind::NoDevice);
                assert_eq!(e.to_string(), "no ports");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
