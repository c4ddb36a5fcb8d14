// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Runs of glyphs.
//!
//! Fonts are not loaded here. A [`GlyphOutlines`] implementation hands out glyph outlines, and
//! text jobs turn them into edges on the worker threads.

use core::fmt::Debug;
use std::sync::Arc;
use strata_common::kurbo::BezPath;

/// A source of glyph outlines.
pub trait GlyphOutlines: Send + Sync + Debug {
    /// Append the outline of `glyph_id` to `path`, already scaled to the font size and with the
    /// origin at the glyph's baseline. Returns `false` if the glyph has no outline.
    fn outline(&self, glyph_id: u32, path: &mut BezPath) -> bool;
}

/// A positioned glyph.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Glyph {
    /// The glyph id.
    pub id: u32,
    /// X-offset in user space.
    pub x: f64,
    /// Y-offset in user space.
    pub y: f64,
}

/// A sequence of glyphs sharing one outline source.
#[derive(Clone, Debug)]
pub struct GlyphRun {
    /// Where the outlines come from.
    pub font: Arc<dyn GlyphOutlines>,
    /// The glyphs.
    pub glyphs: Vec<Glyph>,
}

impl GlyphRun {
    /// Create a new glyph run.
    pub fn new(font: Arc<dyn GlyphOutlines>, glyphs: impl IntoIterator<Item = Glyph>) -> Self {
        Self {
            font,
            glyphs: glyphs.into_iter().collect(),
        }
    }
}
