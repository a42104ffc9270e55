//! AX206 Panel Hardware Library
//!
//! Drives "hacked" AX206 USB picture frames: device discovery, the
//! bulk-only command channel, RGB565 conversion and dirty-rectangle
//! tracking for mirroring a remote framebuffer onto the panel.

pub mod error;
pub mod lcd;
pub mod mirror;
pub mod selector;

pub use error::{Error, ErrorKind, Result};
pub use lcd::{count_devices, BlitTarget, DisplayBuffer, DpfDevice, Rect, Rgba};
pub use mirror::{Mirror, RemoteFramebuffer};
pub use selector::DeviceSelector;

/// USB VID:PID of AX206 frames running the custom firmware.
pub const DPF_VID: u16 = 0x1908;
pub const DPF_PID: u16 = 0x0102;

/// Bulk endpoints used for the command channel.
pub const ENDPOINT_OUT: u8 = 0x01;
pub const ENDPOINT_IN: u8 = 0x81;

/// Interface claimed on open.
pub const DPF_INTERFACE: u8 = 0;

/// Bytes per panel pixel (RGB565).
pub const BYTES_PER_PIXEL: usize = 2;
