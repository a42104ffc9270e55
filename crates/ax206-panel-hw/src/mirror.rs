//! Remote framebuffer mirroring session.
//!
//! A [`Mirror`] is the context object a remote-display client talks to. The
//! client calls [`Mirror::allocate_framebuffer`] when the session starts,
//! decodes pixels into the returned framebuffer, and calls
//! [`Mirror::update`] for every changed region. Each update is flushed to the
//! panel before returning.

use tracing::{debug, info, warn};

use crate::lcd::{BlitTarget, DisplayBuffer, FlushOutcome, Rgba};

/// RGBA framebuffer owned on behalf of the remote-display client.
#[derive(Debug, Clone, Default)]
pub struct RemoteFramebuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl RemoteFramebuffer {
    /// Allocates a black framebuffer of `width * height` RGBA pixels.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Raw RGBA bytes for the client to decode into.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        let px = &self.data[idx..idx + 4];
        Some(Rgba::from_bytes([px[0], px[1], px[2], px[3]]))
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, pixel: Rgba) {
        if x < self.width && y < self.height {
            let idx = (y as usize * self.width as usize + x as usize) * 4;
            self.data[idx..idx + 4].copy_from_slice(&pixel.to_bytes());
        }
    }
}

/// Mirrors a remote framebuffer onto one panel.
pub struct Mirror<T: BlitTarget> {
    target: T,
    display: DisplayBuffer,
    framebuffer: Option<RemoteFramebuffer>,
}

impl<T: BlitTarget> Mirror<T> {
    /// Starts a session for a `width x height` panel.
    ///
    /// The panel is assumed to show garbage, so the first update repaints all of it.
    pub fn new(target: T, width: u16, height: u16) -> Self {
        Self::with_display(target, DisplayBuffer::new(width, height))
    }

    /// Starts a session with a prepared display buffer (e.g. a custom logical canvas).
    pub fn with_display(target: T, mut display: DisplayBuffer) -> Self {
        display.mark_all_dirty();
        Self {
            target,
            display,
            framebuffer: None,
        }
    }

    /// The panel never follows a remote resize.
    pub fn supports_resize(&self) -> bool {
        false
    }

    /// Resize callback: (re)allocates the RGBA framebuffer the client decodes into.
    pub fn allocate_framebuffer(&mut self, width: u32, height: u32) -> &mut RemoteFramebuffer {
        match &self.framebuffer {
            None => info!("Allocating framebuffer {}x{}", width, height),
            Some(fb) => warn!(
                "Remote resized {}x{} -> {}x{}; panel stays {}x{}",
                fb.width(),
                fb.height(),
                width,
                height,
                self.display.width(),
                self.display.height()
            ),
        }
        self.framebuffer.insert(RemoteFramebuffer::new(width, height))
    }

    /// The framebuffer allocated by the last resize callback.
    pub fn framebuffer(&self) -> Option<&RemoteFramebuffer> {
        self.framebuffer.as_ref()
    }

    pub fn framebuffer_mut(&mut self) -> Option<&mut RemoteFramebuffer> {
        self.framebuffer.as_mut()
    }

    pub fn display(&self) -> &DisplayBuffer {
        &self.display
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    /// Update callback: copies the changed region onto the panel buffer and flushes.
    pub fn update(&mut self, x: u32, y: u32, width: u32, height: u32) -> FlushOutcome {
        let Some(fb) = &self.framebuffer else {
            warn!("Update ({}, {}) {}x{} before framebuffer allocation", x, y, width, height);
            return FlushOutcome::Clean;
        };

        let x_end = x.saturating_add(width).min(fb.width());
        let y_end = y.saturating_add(height).min(fb.height());
        for ly in y..y_end {
            for lx in x..x_end {
                if let Some(pixel) = fb.pixel(lx, ly) {
                    self.display.set_pixel(lx, ly, pixel);
                }
            }
        }

        let outcome = self.display.flush(&mut self.target);
        if outcome == FlushOutcome::Clean {
            debug!("Update ({}, {}) {}x{} changed nothing", x, y, width, height);
        }
        outcome
    }

    /// Ends the session, handing back the blit target.
    pub fn into_target(self) -> T {
        self.target
    }
}
