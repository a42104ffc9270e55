//! Error types for the AX206 panel hardware library.

use std::fmt;
use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Phase of a bulk-only command exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// 31-byte command envelope on the OUT endpoint.
    Command,
    /// Optional payload in either direction.
    Data,
    /// 13-byte status reply on the IN endpoint.
    Status,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Command => write!(f, "command"),
            Phase::Data => write!(f, "data"),
            Phase::Status => write!(f, "status"),
        }
    }
}

/// Coarse classification of every [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    DeviceNotFound,
    ProtocolError,
    TransferError,
}

/// Errors that can occur when interacting with the frame.
#[derive(Error, Debug)]
pub enum Error {
    /// Device selector is not `usbN` / `dpfN` with a single digit.
    #[error("Invalid device '{0}': expected a string like 'usb0' or 'dpf0'")]
    InvalidSelector(String),

    /// Backlight level outside 0-7.
    #[error("Invalid backlight level (must be 0-7): {0}")]
    InvalidBacklight(u16),

    /// Pixel slice shorter than the rectangle it is supposed to cover.
    #[error("Pixel data size mismatch: expected {expected}, got {actual}")]
    PixelDataSize { expected: usize, actual: usize },

    /// Fewer matching frames on the bus than the selector index requires.
    #[error("No matching USB device '{selector}' found ({found} AX206 frame(s) present)")]
    DeviceNotFound { selector: String, found: usize },

    /// USB context, open, claim or descriptor failure.
    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),

    /// Status reply did not start with "USBS".
    #[error("Invalid status reply signature: {0:02X?}")]
    StatusSignature([u8; 4]),

    /// Panel parameter query failed while opening.
    #[error("Failed to read panel parameters: {0}")]
    Parameters(#[source] Box<Error>),

    /// Panel parameter reply could not be used.
    #[error("Invalid panel dimensions reported: {width}x{height}")]
    PanelDimensions { width: u16, height: u16 },

    /// Bulk transfer failed outright.
    #[error("Bulk {phase} transfer failed: {source}")]
    Transfer {
        phase: Phase,
        #[source]
        source: rusb::Error,
    },

    /// Bulk transfer moved fewer bytes than requested.
    #[error("Short bulk {phase} transfer: {actual} of {expected} bytes")]
    ShortTransfer {
        phase: Phase,
        expected: usize,
        actual: usize,
    },
}

impl Error {
    /// Returns the error kind this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidSelector(_)
            | Error::InvalidBacklight(_)
            | Error::PixelDataSize { .. } => ErrorKind::InvalidArgument,
            Error::DeviceNotFound { .. } => ErrorKind::DeviceNotFound,
            Error::Usb(_)
            | Error::StatusSignature(_)
            | Error::Parameters(_)
            | Error::PanelDimensions { .. } => ErrorKind::ProtocolError,
            Error::Transfer { .. } | Error::ShortTransfer { .. } => ErrorKind::TransferError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            Error::InvalidSelector("abcd".into()).kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            Error::DeviceNotFound {
                selector: "usb0".into(),
                found: 0
            }
            .kind(),
            ErrorKind::DeviceNotFound
        );
        assert_eq!(
            Error::Usb(rusb::Error::Access).kind(),
            ErrorKind::ProtocolError
        );
        assert_eq!(
            Error::StatusSignature(*b"XXXX").kind(),
            ErrorKind::ProtocolError
        );
        assert_eq!(
            Error::Transfer {
                phase: Phase::Status,
                source: rusb::Error::Timeout
            }
            .kind(),
            ErrorKind::TransferError
        );
    }

    #[test]
    fn test_parameters_error_wraps_transfer_failure() {
        let err = Error::Parameters(Box::new(Error::Transfer {
            phase: Phase::Data,
            source: rusb::Error::NoDevice,
        }));
        assert_eq!(err.kind(), ErrorKind::ProtocolError);
        let source = std::error::Error::source(&err).unwrap();
        assert!(source.to_string().starts_with("Bulk data transfer failed"));
    }

    #[test]
    fn test_transfer_message_names_phase() {
        let err = Error::ShortTransfer {
            phase: Phase::Data,
            expected: 242,
            actual: 100,
        };
        assert_eq!(err.to_string(), "Short bulk data transfer: 100 of 242 bytes");
    }
}
