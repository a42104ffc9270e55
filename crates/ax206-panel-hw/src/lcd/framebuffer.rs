//! Resident RGB565 panel buffer with dirty-rectangle tracking.

use tracing::{debug, warn};

use super::protocol::Rect;
use crate::{Result, BYTES_PER_PIXEL};

/// A 32-bit source pixel. Alpha is carried but never used by the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Opaque pixel from RGB components.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 0xFF)
    }

    /// Builds a pixel from RGBA bytes.
    pub const fn from_bytes([r, g, b, a]: [u8; 4]) -> Self {
        Self::new(r, g, b, a)
    }

    /// RGBA bytes in memory order.
    pub const fn to_bytes(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

/// Converts RGB888 to RGB565.
#[inline]
pub fn rgb888_to_rgb565(r: u8, g: u8, b: u8) -> u16 {
    let r5 = (r >> 3) as u16;
    let g6 = (g >> 2) as u16;
    let b5 = (b >> 3) as u16;
    (r5 << 11) | (g6 << 5) | b5
}

/// Packs a pixel into the two bytes the panel expects (RGB565, high byte first).
#[inline]
pub fn pack_pixel(pixel: Rgba) -> [u8; 2] {
    rgb888_to_rgb565(pixel.r, pixel.g, pixel.b).to_be_bytes()
}

/// Parses a hex color string (`#RRGGBB` or `RRGGBB`).
pub fn parse_hex_color(hex: &str) -> Option<Rgba> {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some(Rgba::rgb(r, g, b))
}

/// Anything that can put an RGB565 rectangle on a panel.
pub trait BlitTarget {
    /// Sends `pixels` (tightly packed rows) for `rect`, returning the device return code.
    fn blit(&mut self, pixels: &[u8], rect: Rect) -> Result<u8>;
}

/// Inclusive bounding box of pixels changed since the last flush.
///
/// Empty when `min_x > max_x`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtyRect {
    pub min_x: u16,
    pub max_x: u16,
    pub min_y: u16,
    pub max_y: u16,
}

impl DirtyRect {
    pub const EMPTY: DirtyRect = DirtyRect {
        min_x: u16::MAX,
        max_x: 0,
        min_y: u16::MAX,
        max_y: 0,
    };

    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x || self.min_y > self.max_y
    }

    /// Grows the box to include (x, y).
    pub fn include(&mut self, x: u16, y: u16) {
        self.min_x = self.min_x.min(x);
        self.max_x = self.max_x.max(x);
        self.min_y = self.min_y.min(y);
        self.max_y = self.max_y.max(y);
    }

    /// Converts to exclusive bounds, or `None` when empty.
    pub fn to_rect(&self) -> Option<Rect> {
        if self.is_empty() {
            return None;
        }
        Some(Rect::new(
            self.min_x,
            self.min_y,
            self.max_x + 1,
            self.max_y + 1,
        ))
    }
}

impl Default for DirtyRect {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Result of a [`DisplayBuffer::flush`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing changed; no transfer was made.
    Clean,
    /// The rectangle was sent and the device answered with this code.
    Sent { rect: Rect, return_code: u8 },
    /// The blit failed; the change is not retried.
    Dropped { rect: Rect },
}

/// Panel-side pixel state for one open frame.
#[derive(Clone)]
pub struct DisplayBuffer {
    /// RGB565 panel contents, row-major, full-panel stride.
    resident: Vec<u8>,
    /// Packed copy of the dirty rectangle for the next blit.
    scratch: Vec<u8>,
    width: u16,
    height: u16,
    canvas_width: u16,
    canvas_height: u16,
    dirty: DirtyRect,
}

impl DisplayBuffer {
    /// Creates a black, clean buffer for a panel of the given size.
    pub fn new(width: u16, height: u16) -> Self {
        Self::with_canvas(width, height, width, height)
    }

    /// Creates a buffer whose logical canvas differs from the panel.
    ///
    /// Coordinates are reduced modulo the canvas size before being checked
    /// against the panel, so a canvas at least as large as the panel wraps.
    pub fn with_canvas(width: u16, height: u16, canvas_width: u16, canvas_height: u16) -> Self {
        let size = width as usize * height as usize * BYTES_PER_PIXEL;
        Self {
            resident: vec![0; size],
            scratch: Vec::with_capacity(size),
            width,
            height,
            canvas_width: canvas_width.max(1),
            canvas_height: canvas_height.max(1),
            dirty: DirtyRect::EMPTY,
        }
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    /// Returns the raw resident RGB565 bytes.
    pub fn data(&self) -> &[u8] {
        &self.resident
    }

    /// Returns the current dirty rectangle.
    pub fn dirty(&self) -> DirtyRect {
        self.dirty
    }

    /// Returns the packed pixel stored at (x, y).
    pub fn get_pixel(&self, x: u16, y: u16) -> Option<[u8; 2]> {
        if x < self.width && y < self.height {
            let idx = self.offset(x, y);
            Some([self.resident[idx], self.resident[idx + 1]])
        } else {
            None
        }
    }

    /// Marks the whole panel as changed.
    pub fn mark_all_dirty(&mut self) {
        if self.width == 0 || self.height == 0 {
            return;
        }
        self.dirty = DirtyRect {
            min_x: 0,
            max_x: self.width - 1,
            min_y: 0,
            max_y: self.height - 1,
        };
    }

    fn offset(&self, x: u16, y: u16) -> usize {
        (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL
    }

    /// Stores one pixel, growing the dirty rectangle if the panel value changes.
    ///
    /// Out-of-panel coordinates are logged and ignored.
    pub fn set_pixel(&mut self, x: u32, y: u32, pixel: Rgba) {
        let lx = x % self.canvas_width as u32;
        let ly = y % self.canvas_height as u32;
        if lx >= self.width as u32 || ly >= self.height as u32 {
            warn!(
                "x/y out of bounds (x={}, y={}, lx={}, ly={})",
                x, y, lx, ly
            );
            return;
        }
        let (lx, ly) = (lx as u16, ly as u16);

        let packed = pack_pixel(pixel);
        let idx = self.offset(lx, ly);
        if self.resident[idx..idx + BYTES_PER_PIXEL] != packed {
            self.resident[idx..idx + BYTES_PER_PIXEL].copy_from_slice(&packed);
            self.dirty.include(lx, ly);
        }
    }

    /// Copies the dirty rows into the scratch buffer, tightly packed.
    fn pack_dirty(&mut self, rect: Rect) {
        let stride = self.width as usize * BYTES_PER_PIXEL;
        let row_len = rect.width() * BYTES_PER_PIXEL;
        self.scratch.clear();
        for y in rect.y0 as usize..rect.y1 as usize {
            let start = y * stride + rect.x0 as usize * BYTES_PER_PIXEL;
            self.scratch
                .extend_from_slice(&self.resident[start..start + row_len]);
        }
    }

    /// Sends the dirty rectangle to `target` and resets it.
    ///
    /// The rectangle is cleared whether or not the blit succeeds.
    pub fn flush<T: BlitTarget + ?Sized>(&mut self, target: &mut T) -> FlushOutcome {
        let Some(rect) = self.dirty.to_rect() else {
            return FlushOutcome::Clean;
        };

        self.pack_dirty(rect);
        let result = target.blit(&self.scratch, rect);
        self.dirty = DirtyRect::EMPTY;

        match result {
            Ok(return_code) => {
                debug!("Blit {} sent ({} bytes)", rect, self.scratch.len());
                FlushOutcome::Sent { rect, return_code }
            }
            Err(e) => {
                warn!("Blit {} failed, change dropped: {}", rect, e);
                FlushOutcome::Dropped { rect }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    /// Records every blit it is asked to perform.
    #[derive(Default)]
    struct RecordingTarget {
        blits: Vec<(Rect, Vec<u8>)>,
        fail: bool,
    }

    impl BlitTarget for RecordingTarget {
        fn blit(&mut self, pixels: &[u8], rect: Rect) -> Result<u8> {
            self.blits.push((rect, pixels.to_vec()));
            if self.fail {
                Err(Error::Transfer {
                    phase: crate::error::Phase::Data,
                    source: rusb::Error::Timeout,
                })
            } else {
                Ok(0)
            }
        }
    }

    #[test]
    fn test_rgb565_conversion() {
        assert_eq!(rgb888_to_rgb565(255, 0, 0), 0xF800);
        assert_eq!(rgb888_to_rgb565(0, 255, 0), 0x07E0);
        assert_eq!(rgb888_to_rgb565(0, 0, 255), 0x001F);
        assert_eq!(rgb888_to_rgb565(255, 255, 255), 0xFFFF);
        assert_eq!(rgb888_to_rgb565(0, 0, 0), 0x0000);
    }

    #[test]
    fn test_pack_pixel_byte_layout() {
        // byte0 = top 5 bits of R | top 3 bits of G
        // byte1 = next 3 bits of G | top 5 bits of B
        let p = Rgba::rgb(0b1010_1111, 0b1101_0110, 0b0110_1001);
        let [b0, b1] = pack_pixel(p);
        assert_eq!(b0, (p.r & 0xF8) | ((p.g & 0xE0) >> 5));
        assert_eq!(b1, ((p.g & 0x1C) << 3) | ((p.b & 0xF8) >> 3));
        assert_eq!(pack_pixel(Rgba::rgb(255, 0, 0)), [0xF8, 0x00]);
        assert_eq!(pack_pixel(Rgba::rgb(0, 255, 0)), [0x07, 0xE0]);
    }

    #[test]
    fn test_pack_pixel_ignores_alpha() {
        for a in [0u8, 1, 128, 255] {
            assert_eq!(
                pack_pixel(Rgba::new(12, 200, 99, a)),
                pack_pixel(Rgba::new(12, 200, 99, 0))
            );
        }
    }

    #[test]
    fn test_rgba_bytes() {
        let pixel = Rgba::from_bytes([1, 2, 3, 4]);
        assert_eq!(pixel, Rgba::new(1, 2, 3, 4));
        assert_eq!(pixel.to_bytes(), [1, 2, 3, 4]);
    }

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_hex_color("#FF0000"), Some(Rgba::rgb(255, 0, 0)));
        assert_eq!(parse_hex_color("00FF00"), Some(Rgba::rgb(0, 255, 0)));
        assert_eq!(parse_hex_color("invalid"), None);
    }

    #[test]
    fn test_set_pixel_stores_packed_value() {
        let mut buf = DisplayBuffer::new(480, 320);
        let red = Rgba::rgb(255, 0, 0);
        buf.set_pixel(10, 20, red);
        assert_eq!(buf.get_pixel(10, 20), Some(pack_pixel(red)));
        assert_eq!(buf.data().len(), 480 * 320 * 2);
    }

    #[test]
    fn test_unchanged_pixel_does_not_dirty() {
        let mut buf = DisplayBuffer::new(480, 320);
        // Black onto a black panel
        buf.set_pixel(5, 5, Rgba::rgb(0, 0, 0));
        assert!(buf.dirty().is_empty());

        let mut target = RecordingTarget::default();
        buf.set_pixel(5, 5, Rgba::rgb(1, 255, 1));
        buf.flush(&mut target);
        buf.set_pixel(5, 5, Rgba::rgb(1, 255, 1));
        assert!(buf.dirty().is_empty());
    }

    #[test]
    fn test_dirty_rect_is_tight_bounding_box() {
        let mut buf = DisplayBuffer::new(100, 100);
        let white = Rgba::rgb(255, 255, 255);
        for (x, y) in [(40, 7), (3, 60), (77, 12), (50, 50)] {
            buf.set_pixel(x, y, white);
        }
        assert_eq!(
            buf.dirty(),
            DirtyRect {
                min_x: 3,
                max_x: 77,
                min_y: 7,
                max_y: 60
            }
        );
    }

    #[test]
    fn test_flush_two_pixel_scenario() {
        let mut buf = DisplayBuffer::new(480, 320);
        let mut target = RecordingTarget::default();

        buf.set_pixel(10, 10, Rgba::new(255, 0, 0, 255));
        buf.set_pixel(20, 20, Rgba::new(0, 255, 0, 255));
        let outcome = buf.flush(&mut target);

        assert_eq!(target.blits.len(), 1);
        let (rect, payload) = &target.blits[0];
        assert_eq!(*rect, Rect::new(10, 10, 21, 21));
        assert_eq!(payload.len(), 242);
        // Corners of the packed payload
        assert_eq!(&payload[0..2], &[0xF8, 0x00]);
        assert_eq!(&payload[240..242], &[0x07, 0xE0]);
        assert_eq!(
            outcome,
            FlushOutcome::Sent {
                rect: Rect::new(10, 10, 21, 21),
                return_code: 0
            }
        );
        assert!(buf.dirty().is_empty());
    }

    #[test]
    fn test_flush_packs_rows_without_padding() {
        let mut buf = DisplayBuffer::new(8, 4);
        let mut target = RecordingTarget::default();
        buf.set_pixel(2, 1, Rgba::rgb(255, 0, 0));
        buf.set_pixel(4, 2, Rgba::rgb(0, 0, 255));
        buf.flush(&mut target);

        let (rect, payload) = &target.blits[0];
        assert_eq!(*rect, Rect::new(2, 1, 5, 3));
        assert_eq!(
            payload,
            &vec![
                0xF8, 0x00, 0, 0, 0, 0, // row 1: x=2..4
                0, 0, 0, 0, 0x00, 0x1F, // row 2: x=2..4
            ]
        );
    }

    #[test]
    fn test_flush_empty_is_noop() {
        let mut buf = DisplayBuffer::new(480, 320);
        let mut target = RecordingTarget::default();
        assert_eq!(buf.flush(&mut target), FlushOutcome::Clean);
        assert!(target.blits.is_empty());
    }

    #[test]
    fn test_flush_clears_rect_on_failure() {
        let mut buf = DisplayBuffer::new(480, 320);
        let mut target = RecordingTarget {
            fail: true,
            ..Default::default()
        };
        buf.set_pixel(1, 1, Rgba::rgb(255, 255, 255));
        let outcome = buf.flush(&mut target);

        assert_eq!(
            outcome,
            FlushOutcome::Dropped {
                rect: Rect::new(1, 1, 2, 2)
            }
        );
        assert!(buf.dirty().is_empty());
        assert_eq!(buf.flush(&mut target), FlushOutcome::Clean);
        assert_eq!(target.blits.len(), 1);
    }

    #[test]
    fn test_out_of_bounds_is_ignored() {
        let mut buf = DisplayBuffer::with_canvas(10, 10, 20, 20);
        buf.set_pixel(15, 3, Rgba::rgb(255, 255, 255));
        assert!(buf.dirty().is_empty());
    }

    #[test]
    fn test_canvas_wraparound() {
        let mut buf = DisplayBuffer::new(10, 10);
        buf.set_pixel(13, 25, Rgba::rgb(255, 255, 255));
        assert_eq!(buf.get_pixel(3, 5), Some([0xFF, 0xFF]));
        assert_eq!(buf.dirty().to_rect(), Some(Rect::new(3, 5, 4, 6)));
    }

    #[test]
    fn test_mark_all_dirty() {
        let mut buf = DisplayBuffer::new(480, 320);
        let mut target = RecordingTarget::default();
        buf.mark_all_dirty();
        buf.flush(&mut target);
        let (rect, payload) = &target.blits[0];
        assert_eq!(*rect, Rect::new(0, 0, 480, 320));
        assert_eq!(payload.len(), 480 * 320 * 2);
    }
}
