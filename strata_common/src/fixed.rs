// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Fixed-point coordinates.
//!
//! All edge and coverage math works on 24.8 fixed-point numbers: the integer pixel coordinate lives
//! in the upper 24 bits and the sub-pixel fraction in the lower 8 bits.

/// Number of fractional bits.
pub const FIXED_SHIFT: u32 = 8;
/// The fixed-point representation of `1.0`.
pub const FIXED_SCALE: i32 = 1 << FIXED_SHIFT;
/// Mask of the fractional bits.
pub const FIXED_MASK: i32 = FIXED_SCALE - 1;

/// Convert a coordinate that is already scaled by [`FIXED_SCALE`] to fixed point.
#[inline(always)]
pub fn to_fixed(v: f64) -> i32 {
    v.round() as i32
}

/// Convert a device-pixel coordinate to fixed point.
#[inline(always)]
pub fn pixels_to_fixed(v: f64) -> i32 {
    to_fixed(v * f64::from(FIXED_SCALE))
}

/// A point in fixed-point coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EdgePoint {
    /// The x coordinate.
    pub x: i32,
    /// The y coordinate.
    pub y: i32,
}

impl EdgePoint {
    /// Create a new point.
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// An integer box, `x0`/`y0` inclusive and `x1`/`y1` exclusive.
///
/// Depending on the context the coordinates are either whole pixels or 24.8 fixed point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoxI {
    /// The left edge.
    pub x0: i32,
    /// The top edge.
    pub y0: i32,
    /// The right edge.
    pub x1: i32,
    /// The bottom edge.
    pub y1: i32,
}

impl BoxI {
    /// The "empty" sentinel. Every union with a real box yields that box.
    pub const EMPTY: Self = Self {
        x0: i32::MAX,
        y0: i32::MAX,
        x1: i32::MIN,
        y1: i32::MIN,
    };

    /// Create a new box.
    pub const fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Whether this box is the [`BoxI::EMPTY`] sentinel.
    ///
    /// This is an exact comparison, a box that merely has zero area is not "empty" in this sense.
    pub fn is_sentinel(&self) -> bool {
        *self == Self::EMPTY
    }

    /// Whether the box has no area.
    pub fn is_empty(&self) -> bool {
        self.x0 >= self.x1 || self.y0 >= self.y1
    }

    /// Grow the box so it contains the given point.
    #[inline(always)]
    pub fn add_point(&mut self, p: EdgePoint) {
        self.x0 = self.x0.min(p.x);
        self.y0 = self.y0.min(p.y);
        self.x1 = self.x1.max(p.x);
        self.y1 = self.y1.max(p.y);
    }

    /// Scale a pixel box to fixed point.
    pub fn to_fixed(&self) -> Self {
        Self {
            x0: self.x0 << FIXED_SHIFT,
            y0: self.y0 << FIXED_SHIFT,
            x1: self.x1 << FIXED_SHIFT,
            y1: self.y1 << FIXED_SHIFT,
        }
    }
}
