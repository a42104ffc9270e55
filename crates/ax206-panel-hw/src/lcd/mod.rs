//! LCD module.
//!
//! Provides control over the AX206 frame's RGB565 panel via USB bulk transfers.

mod device;

pub mod framebuffer;
pub mod protocol;
pub mod transport;

pub use device::{count_devices, DpfDevice, UsbPipe};
pub use framebuffer::{
    pack_pixel, parse_hex_color, rgb888_to_rgb565, BlitTarget, DirtyRect, DisplayBuffer,
    FlushOutcome, Rgba,
};
pub use protocol::{Command, ExtendedCommand, Rect};
pub use transport::{BulkPipe, DataPhase};
