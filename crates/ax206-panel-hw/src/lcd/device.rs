//! AX206 frame discovery and command dispatch over USB bulk transfers.

use std::time::Duration;

use rusb::{Context, DeviceHandle, UsbContext};
use tracing::{debug, info, warn};

use super::framebuffer::BlitTarget;
use super::protocol::{
    build_blit_command, build_parameters_command, build_property_command, parse_parameters,
    CommandBlock, Property, Rect, MAX_BACKLIGHT, PARAMETERS_SIZE,
};
use super::transport::{execute, BulkPipe, DataPhase};
use crate::selector::DeviceSelector;
use crate::{Error, Result, DPF_INTERFACE, DPF_PID, DPF_VID};

/// An opened USB handle with interface 0 claimed.
///
/// The interface is released when the pipe is dropped.
pub struct UsbPipe {
    handle: DeviceHandle<Context>,
    claimed: bool,
}

impl UsbPipe {
    fn claim(handle: DeviceHandle<Context>) -> Result<Self> {
        handle.claim_interface(DPF_INTERFACE).map_err(|e| {
            warn!("Failed to claim interface {}: {}", DPF_INTERFACE, e);
            Error::Usb(e)
        })?;
        Ok(Self {
            handle,
            claimed: true,
        })
    }

    fn release(&mut self) -> Result<()> {
        if self.claimed {
            self.claimed = false;
            self.handle.release_interface(DPF_INTERFACE)?;
        }
        Ok(())
    }
}

impl BulkPipe for UsbPipe {
    fn write_bulk(&mut self, endpoint: u8, buf: &[u8], timeout: Duration) -> rusb::Result<usize> {
        BulkPipe::write_bulk(&mut self.handle, endpoint, buf, timeout)
    }

    fn read_bulk(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> rusb::Result<usize> {
        BulkPipe::read_bulk(&mut self.handle, endpoint, buf, timeout)
    }
}

impl Drop for UsbPipe {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            debug!("Failed to release interface on drop: {}", e);
        }
    }
}

/// Returns the position in `ids` of the `index`-th AX206 frame, or how many were found.
fn nth_frame(
    ids: impl IntoIterator<Item = (u16, u16)>,
    index: u8,
) -> std::result::Result<usize, usize> {
    let mut found = 0;
    for (position, (vid, pid)) in ids.into_iter().enumerate() {
        if vid == DPF_VID && pid == DPF_PID {
            found += 1;
            debug!("Found AX206 #{}", found);
            if found == index as usize + 1 {
                return Ok(position);
            }
        }
    }
    Err(found)
}

/// Counts the AX206 frames currently on the bus.
pub fn count_devices() -> Result<usize> {
    let context = Context::new()?;
    let mut count = 0;
    for device in context.devices()?.iter() {
        let desc = device.device_descriptor()?;
        if desc.vendor_id() == DPF_VID && desc.product_id() == DPF_PID {
            count += 1;
            debug!(
                "AX206 #{} on bus {:03} address {:03}",
                count,
                device.bus_number(),
                device.address()
            );
        }
    }
    Ok(count)
}

/// An open AX206 frame with known panel dimensions.
pub struct DpfDevice<P: BulkPipe = UsbPipe> {
    pipe: P,
    width: u16,
    height: u16,
}

impl DpfDevice<UsbPipe> {
    /// Opens the frame named by `selector` (e.g. "usb0").
    ///
    /// The selector is validated before the bus is touched.
    pub fn open(selector: &str) -> Result<Self> {
        let parsed: DeviceSelector = selector.parse()?;
        Self::open_selector(parsed, selector)
    }

    fn open_selector(selector: DeviceSelector, name: &str) -> Result<Self> {
        let context = Context::new()?;
        let devices: Vec<_> = context.devices()?.iter().collect();

        let ids = devices
            .iter()
            .map(|device| {
                device
                    .device_descriptor()
                    .map(|desc| (desc.vendor_id(), desc.product_id()))
            })
            .collect::<rusb::Result<Vec<_>>>()
            .inspect_err(|e| warn!("Failed to get device descriptor: {}", e))?;

        let position = nth_frame(ids, selector.index()).map_err(|found| {
            warn!("No matching USB device '{}' found", name);
            Error::DeviceNotFound {
                selector: name.to_string(),
                found,
            }
        })?;
        let device = &devices[position];

        let handle = device.open().map_err(|e| {
            warn!("Failed to open usb device '{}': {}", name, e);
            Error::Usb(e)
        })?;
        let pipe = UsbPipe::claim(handle)?;

        let dpf = Self::from_pipe(pipe)?;
        info!(
            "AX206 frame '{}' opened (VID:{:04X} PID:{:04X}, {}x{})",
            name, DPF_VID, DPF_PID, dpf.width, dpf.height
        );
        Ok(dpf)
    }

    /// Releases the interface and closes the device.
    pub fn close(mut self) -> Result<()> {
        self.pipe.release()?;
        info!("AX206 frame closed");
        Ok(())
    }
}

impl<P: BulkPipe> DpfDevice<P> {
    /// Wraps an already claimed pipe and queries the panel dimensions.
    pub fn from_pipe(mut pipe: P) -> Result<Self> {
        let mut reply = [0u8; PARAMETERS_SIZE];
        execute(
            &mut pipe,
            &build_parameters_command(),
            DataPhase::In(&mut reply),
        )
        .map_err(|e| {
            warn!("Error reading LCD dimensions: {}", e);
            Error::Parameters(Box::new(e))
        })?;

        let (width, height) = parse_parameters(&reply);
        if width == 0 || height == 0 {
            return Err(Error::PanelDimensions { width, height });
        }
        debug!("Got LCD dimensions: {}x{}", width, height);

        Ok(Self {
            pipe,
            width,
            height,
        })
    }

    /// Panel width in pixels.
    pub fn width(&self) -> u16 {
        self.width
    }

    /// Panel height in pixels.
    pub fn height(&self) -> u16 {
        self.height
    }

    /// Runs an arbitrary command block over the bulk-only transport.
    pub fn execute(&mut self, command: &CommandBlock, data: DataPhase<'_>) -> Result<u8> {
        execute(&mut self.pipe, command, data)
    }

    /// Draws RGB565 `pixels` into the exclusive rectangle `rect`.
    pub fn blit(&mut self, pixels: &[u8], rect: Rect) -> Result<u8> {
        let len = rect.byte_len();
        if pixels.len() < len {
            return Err(Error::PixelDataSize {
                expected: len,
                actual: pixels.len(),
            });
        }
        let command = build_blit_command(rect);
        let code = self.execute(&command, DataPhase::Out(&pixels[..len]))?;
        debug!("Blit {} ({} bytes), return code {}", rect, len, code);
        Ok(code)
    }

    /// Sets the backlight level (0 = off, 7 = brightest).
    pub fn set_backlight(&mut self, level: u16) -> Result<u8> {
        if level > MAX_BACKLIGHT {
            return Err(Error::InvalidBacklight(level));
        }
        let command = build_property_command(Property::Brightness, level);
        let code = self.execute(&command, DataPhase::None)?;
        info!("Backlight set to {}", level);
        Ok(code)
    }
}

impl<P: BulkPipe> BlitTarget for DpfDevice<P> {
    fn blit(&mut self, pixels: &[u8], rect: Rect) -> Result<u8> {
        DpfDevice::blit(self, pixels, rect)
    }
}
