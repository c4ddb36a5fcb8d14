// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A simple pixmap type.

use crate::peniko::color::PremulRgba8;

/// A pixmap of premultiplied RGBA8 values, the render target of the renderers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pixmap {
    /// Width of the pixmap in pixels.
    width: u16,
    /// Height of the pixmap in pixels.
    height: u16,
    /// Buffer of the pixmap in RGBA8 format.
    buf: Vec<PremulRgba8>,
}

impl Pixmap {
    /// Create a new pixmap with the given width and height in pixels.
    ///
    /// All pixels are initialized to transparent black.
    pub fn new(width: u16, height: u16) -> Self {
        let buf = vec![PremulRgba8::from_u32(0); usize::from(width) * usize::from(height)];
        Self { width, height, buf }
    }

    /// Return the width of the pixmap.
    pub fn width(&self) -> u16 {
        self.width
    }

    /// Return the height of the pixmap.
    pub fn height(&self) -> u16 {
        self.height
    }

    /// Set every pixel to `color`.
    pub fn fill(&mut self, color: PremulRgba8) {
        self.buf.fill(color);
    }

    /// Returns a reference to the underlying data as premultiplied RGBA8.
    ///
    /// The pixels are in row-major order.
    pub fn data(&self) -> &[PremulRgba8] {
        &self.buf
    }

    /// Returns a mutable reference to the underlying data as premultiplied RGBA8.
    ///
    /// The pixels are in row-major order.
    pub fn data_mut(&mut self) -> &mut [PremulRgba8] {
        &mut self.buf
    }

    /// Returns a reference to the underlying data as bytes, `[r, g, b, a]` per pixel.
    pub fn data_as_u8_slice(&self) -> &[u8] {
        bytemuck::cast_slice(&self.buf)
    }

    /// Sample a pixel from the pixmap.
    #[inline(always)]
    pub fn sample(&self, x: u16, y: u16) -> PremulRgba8 {
        let idx = usize::from(self.width) * usize::from(y) + usize::from(x);
        self.buf[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::Pixmap;
    use crate::peniko::color::PremulRgba8;

    #[test]
    fn byte_view() {
        let px = PremulRgba8 {
            r: 64,
            g: 0,
            b: 128,
            a: 128,
        };
        let mut pixmap = Pixmap::new(2, 1);
        pixmap.data_mut()[1] = px;

        assert_eq!(pixmap.sample(1, 0), px);
        assert_eq!(pixmap.data_as_u8_slice(), &[0, 0, 0, 0, 64, 0, 128, 128]);
    }
}
