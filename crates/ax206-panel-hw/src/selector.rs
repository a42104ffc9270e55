//! Device selector parsing.
//!
//! Frames are addressed as `usbN` or `dpfN`, where N (0-9) is the position of
//! the frame among all matching devices in bus enumeration order.

use crate::{Error, Result};
use std::str::FromStr;

/// Selects the Nth AX206 frame on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceSelector {
    index: u8,
}

impl DeviceSelector {
    /// Creates a selector for the given 0-based frame index (0-9).
    pub fn new(index: u8) -> Result<Self> {
        if index > 9 {
            return Err(Error::InvalidSelector(index.to_string()));
        }
        Ok(Self { index })
    }

    /// Returns the 0-based ordinal among matching frames.
    pub fn index(&self) -> u8 {
        self.index
    }
}

impl FromStr for DeviceSelector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = s.as_bytes();
        if bytes.len() != 4 || !(s.starts_with("usb") || s.starts_with("dpf")) {
            return Err(Error::InvalidSelector(s.to_string()));
        }
        match bytes[3] {
            digit @ b'0'..=b'9' => Ok(Self {
                index: digit - b'0',
            }),
            _ => Err(Error::InvalidSelector(s.to_string())),
        }
    }
}

impl std::fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "usb{}", self.index)
    }
}
