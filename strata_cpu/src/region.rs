// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Splitting the destination buffer into bands that can be written concurrently.

use std::sync::{Mutex, PoisonError};
use strata_common::color::PremulRgba8;

/// The pixels of one band, or of the whole destination on the synchronous path.
#[derive(Debug)]
pub(crate) struct BandRegion<'a> {
    /// The band index.
    pub(crate) band: u32,
    /// The first row.
    pub(crate) y0: u32,
    width: usize,
    pixels: &'a mut [PremulRgba8],
}

impl<'a> BandRegion<'a> {
    /// A region covering all rows of `pixels`.
    pub(crate) fn whole(pixels: &'a mut [PremulRgba8], width: u16) -> Self {
        Self {
            band: 0,
            y0: 0,
            width: usize::from(width),
            pixels,
        }
    }

    /// The end of the row range, exclusive.
    pub(crate) fn y1(&self) -> u32 {
        let rows = self.pixels.len().checked_div(self.width).unwrap_or(0);
        self.y0 + rows as u32
    }

    /// The pixels of destination row `y`, which must lie within the region.
    #[inline]
    pub(crate) fn row_mut(&mut self, y: u32) -> &mut [PremulRgba8] {
        let start = (y - self.y0) as usize * self.width;
        &mut self.pixels[start..start + self.width]
    }
}

/// The bands of a destination, dealt out round-robin to the participants of a batch.
///
/// Band `b` belongs to participant `b % participants`, so no two threads ever write the same
/// rows.
#[derive(Debug)]
pub(crate) struct BandRegions<'a> {
    owned: Vec<Mutex<Vec<BandRegion<'a>>>>,
}

impl<'a> BandRegions<'a> {
    pub(crate) fn new(
        buffer: &'a mut [PremulRgba8],
        width: u16,
        band_height: u32,
        participants: usize,
    ) -> Self {
        let mut owned: Vec<Vec<BandRegion<'a>>> = (0..participants).map(|_| Vec::new()).collect();
        let band_len = usize::from(width) * band_height as usize;

        if band_len > 0 && participants > 0 {
            for (band, pixels) in buffer.chunks_mut(band_len).enumerate() {
                owned[band % participants].push(BandRegion {
                    band: band as u32,
                    y0: band as u32 * band_height,
                    width: usize::from(width),
                    pixels,
                });
            }
        }

        Self {
            owned: owned.into_iter().map(Mutex::new).collect(),
        }
    }

    /// Take the bands of `participant`. Every participant takes its bands once per batch.
    pub(crate) fn take(&self, participant: usize) -> Vec<BandRegion<'a>> {
        self.owned
            .get(participant)
            .map(|bands| {
                let mut bands = bands.lock().unwrap_or_else(PoisonError::into_inner);
                core::mem::take(&mut *bands)
            })
            .unwrap_or_default()
    }
}
