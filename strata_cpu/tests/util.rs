// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Utility functions shared across different tests.

use std::sync::Arc;
use strata_cpu::color::PremulRgba8;
use strata_cpu::kurbo::{BezPath, Point, Rect, Vec2};
use strata_cpu::{Glyph, GlyphOutlines, GlyphRun, RasterContext, RenderSettings, SyncBackend};

pub(crate) const TRANSPARENT: PremulRgba8 = PremulRgba8 {
    r: 0,
    g: 0,
    b: 0,
    a: 0,
};

pub(crate) fn settings(num_threads: u16, sync_backend: SyncBackend) -> RenderSettings {
    RenderSettings {
        num_threads,
        sync_backend,
        ..Default::default()
    }
}

pub(crate) fn get_ctx(width: u16, height: u16, num_threads: u16) -> RasterContext {
    RasterContext::new_with(width, height, settings(num_threads, SyncBackend::Auto))
}

/// Every pixel of `ctx` that isn't transparent, as `(x, y)`.
pub(crate) fn painted(ctx: &RasterContext) -> Vec<(u16, u16)> {
    let pixmap = ctx.pixmap();
    let mut out = vec![];

    for y in 0..pixmap.height() {
        for x in 0..pixmap.width() {
            if pixmap.sample(x, y) != TRANSPARENT {
                out.push((x, y));
            }
        }
    }

    out
}

pub(crate) fn crossed_line_star() -> BezPath {
    let mut path = BezPath::new();
    path.move_to((50.0, 10.0));
    path.line_to((75.0, 90.0));
    path.line_to((10.0, 40.0));
    path.line_to((90.0, 40.0));
    path.line_to((25.0, 90.0));
    path.line_to((50.0, 10.0));

    path
}

pub(crate) fn circular_star(center: Point, n: usize, inner: f64, outer: f64) -> BezPath {
    let mut path = BezPath::new();
    let start_angle = -std::f64::consts::FRAC_PI_2;
    path.move_to(center + outer * Vec2::from_angle(start_angle));
    for i in 1..n * 2 {
        let th = start_angle + i as f64 * std::f64::consts::PI / n as f64;
        let r = if i % 2 == 0 { outer } else { inner };
        path.line_to(center + r * Vec2::from_angle(th));
    }
    path.close_path();

    path
}

/// A rectangle as a path, clockwise when `reversed` is `false`.
pub(crate) fn rect_path(rect: Rect, reversed: bool) -> BezPath {
    let mut corners = [
        (rect.x0, rect.y0),
        (rect.x1, rect.y0),
        (rect.x1, rect.y1),
        (rect.x0, rect.y1),
    ];
    if reversed {
        corners.reverse();
    }

    let mut path = BezPath::new();
    path.move_to(corners[0]);
    for corner in &corners[1..] {
        path.line_to(*corner);
    }
    path.close_path();

    path
}

/// A font whose glyph `n` is a `2n` x `3n` box standing on the baseline. Glyph `0` is blank.
#[derive(Debug)]
pub(crate) struct BoxFont;

impl GlyphOutlines for BoxFont {
    fn outline(&self, glyph_id: u32, path: &mut BezPath) -> bool {
        if glyph_id == 0 {
            return false;
        }

        let n = f64::from(glyph_id);
        path.extend(rect_path(Rect::new(0.0, -3.0 * n, 2.0 * n, 0.0), false));
        true
    }
}

pub(crate) fn box_run(glyphs: &[(u32, f64, f64)]) -> GlyphRun {
    GlyphRun::new(
        Arc::new(BoxFont),
        glyphs.iter().map(|&(id, x, y)| Glyph { id, x, y }),
    )
}
