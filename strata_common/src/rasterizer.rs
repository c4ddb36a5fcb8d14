// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Analytic coverage rasterization.
//!
//! For every pixel row of a band, each edge deposits the exact signed area it cuts off into a
//! buffer of cells. A running sum over the cells of a row then yields, per pixel, the covered
//! area, which the fill rule maps to an 8-bit coverage.
//!
//! # Cell encoding
//!
//! Areas are kept doubled and in `1/256` sub-pixel units, so a fully covered pixel accumulates
//! `2 * 256 * 256 = 1 << 17`. A piece of an edge that crosses a cell with a vertical extent of
//! `dy` and enters and leaves at the horizontal offsets `fx0` and `fx1` (both in `0..=256`,
//! relative to the left of the cell) adds `dy * (512 - fx0 - fx1)` to its own cell, which is
//! the doubled area to the right of the piece, and `dy * (fx0 + fx1)` to the next cell, so that
//! the cells right of the edge see the full `512 * dy`.

use crate::edge::EdgeRef;
use crate::error::RasterError;
use crate::fixed::{FIXED_MASK, FIXED_SHIFT, FIXED_SCALE};
use crate::peniko::Fill;
use crate::pipeline::Span;
use core::ops::RangeInclusive;

/// The accumulated value of a fully covered pixel.
pub const FULL_COVERAGE: i32 = 1 << 17;

/// Where the rasterizer is in processing a band.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RasterState {
    /// Selecting the next band and its edges.
    AdvanceBand,
    /// Depositing edge areas into the cells.
    AccumulateCells,
    /// Converting cells to coverage and emitting spans.
    EmitSpans,
    /// Idle.
    #[default]
    Done,
}

/// Receives the spans produced by the rasterizer.
pub trait SpanSink {
    /// Fill `span` on row `y`.
    fn span(&mut self, y: u32, span: Span);
}

impl<F: FnMut(u32, Span)> SpanSink for F {
    fn span(&mut self, y: u32, span: Span) {
        self(y, span);
    }
}

/// Map an accumulated cell sum to an 8-bit coverage, scaled by `alpha`.
#[inline(always)]
pub fn coverage(acc: i32, fill_rule: Fill, alpha: u8) -> u8 {
    let area = match fill_rule {
        Fill::NonZero => acc.unsigned_abs().min(FULL_COVERAGE as u32),
        Fill::EvenOdd => {
            let a = (acc & (2 * FULL_COVERAGE - 1)) as u32;
            if a > FULL_COVERAGE as u32 {
                2 * FULL_COVERAGE as u32 - a
            } else {
                a
            }
        }
    };

    ((area * u32::from(alpha) + (1 << 16)) >> 17) as u8
}

/// A scanline rasterizer computing exact area coverage, one band at a time.
#[derive(Debug)]
pub struct AnalyticRasterizer {
    width: u32,
    height: u32,
    band_height: u32,
    stride: usize,
    cells: Vec<i32>,
    row_min: Vec<u32>,
    row_max: Vec<u32>,
    state: RasterState,
}

impl AnalyticRasterizer {
    /// Create a rasterizer for a `width` x `height` destination split into bands of
    /// `band_height` rows.
    ///
    /// The cell buffer for one band is allocated up front and zeroed.
    pub fn new(width: u32, height: u32, band_height: u32) -> Result<Self, RasterError> {
        let stride = width as usize + 2;
        let len = stride * band_height as usize;

        let mut cells = Vec::new();
        cells
            .try_reserve_exact(len)
            .map_err(|_| RasterError::OutOfMemory)?;
        cells.resize(len, 0);

        Ok(Self {
            width,
            height,
            band_height,
            stride,
            cells,
            row_min: vec![u32::MAX; band_height as usize],
            row_max: vec![0; band_height as usize],
            state: RasterState::Done,
        })
    }

    /// Zero all cells, for when a rasterization was abandoned half way.
    pub fn reset(&mut self) {
        self.cells.fill(0);
        self.row_min.fill(u32::MAX);
        self.row_max.fill(0);
        self.state = RasterState::Done;
    }

    /// The current state.
    pub fn state(&self) -> RasterState {
        self.state
    }

    /// Rasterize `edges` within band `band`.
    ///
    /// Edges (or parts of edges) outside of the band are ignored, so it's fine to pass edges
    /// that span several bands.
    pub fn rasterize_band<'e>(
        &mut self,
        band: u32,
        edges: impl IntoIterator<Item = EdgeRef<'e>>,
        fill_rule: Fill,
        alpha: u8,
        sink: &mut impl SpanSink,
    ) -> Result<(), RasterError> {
        self.state = RasterState::AdvanceBand;
        let rows = self.band_rows(band)?;

        self.state = RasterState::AccumulateCells;
        for edge in edges {
            if let Err(e) = self.accumulate_edge(edge, rows) {
                self.discard(rows);
                return Err(e);
            }
        }

        self.emit(rows, fill_rule, alpha, sink);
        self.state = RasterState::Done;

        Ok(())
    }

    /// Rasterize all bands in `bands` from a single list of edges ordered by the band they start
    /// in, as produced by
    /// [`EdgeStorage::flatten_edge_links`](crate::edge::EdgeStorage::flatten_edge_links).
    ///
    /// Edges join the active set when their first band is reached, and are retired once the
    /// bands have moved past their end.
    pub fn rasterize_list<'e>(
        &mut self,
        edges: impl IntoIterator<Item = EdgeRef<'e>>,
        bands: RangeInclusive<u32>,
        fill_rule: Fill,
        alpha: u8,
        sink: &mut impl SpanSink,
    ) -> Result<(), RasterError> {
        let mut pending = edges.into_iter().peekable();
        let mut active: Vec<EdgeRef<'e>> = Vec::new();

        for band in bands {
            self.state = RasterState::AdvanceBand;
            if band * self.band_height >= self.height {
                break;
            }
            let rows = self.band_rows(band)?;
            let top = (rows.0 as i32) << FIXED_SHIFT;
            let bottom = (rows.1 as i32) << FIXED_SHIFT;

            active.retain(|e| e.y1() > top);
            while let Some(edge) = pending.next_if(|e| e.y0() < bottom) {
                if edge.y1() > top {
                    active.push(edge);
                }
            }
            active.sort_by_key(|e| e.points[0].x);

            self.state = RasterState::AccumulateCells;
            for edge in &active {
                if let Err(e) = self.accumulate_edge(*edge, rows) {
                    self.discard(rows);
                    return Err(e);
                }
            }

            self.emit(rows, fill_rule, alpha, sink);
        }

        self.state = RasterState::Done;
        Ok(())
    }

    fn band_rows(&mut self, band: u32) -> Result<(u32, u32), RasterError> {
        let y0 = band.saturating_mul(self.band_height);

        if y0 >= self.height {
            self.state = RasterState::Done;
            return Err(RasterError::invariant("band index out of range"));
        }

        Ok((y0, (y0 + self.band_height).min(self.height)))
    }

    fn accumulate_edge(&mut self, edge: EdgeRef<'_>, rows: (u32, u32)) -> Result<(), RasterError> {
        let top = (rows.0 as i32) << FIXED_SHIFT;
        let bottom = (rows.1 as i32) << FIXED_SHIFT;
        let pts = edge.points;

        let first = pts.partition_point(|p| p.y <= top).saturating_sub(1);

        for seg in pts[first..].windows(2) {
            let (p, q) = (seg[0], seg[1]);

            if q.y < p.y {
                return Err(RasterError::invariant("edge is not monotonic in y"));
            }
            if p.y >= bottom {
                break;
            }

            let ys = p.y.max(top);
            let ye = q.y.min(bottom);
            if ys >= ye {
                continue;
            }

            let x_at = |y: i32| -> i32 {
                let t = i64::from(y - p.y) * i64::from(q.x - p.x);
                (i64::from(p.x) + t.div_euclid(i64::from(q.y - p.y))) as i32
            };

            let max_x = (self.width as i32) << FIXED_SHIFT;
            let mut y = ys;
            while y < ye {
                let row_y = y & !FIXED_MASK;
                let y_next = (row_y + FIXED_SCALE).min(ye);
                let row = ((row_y - top) >> FIXED_SHIFT) as usize;

                let xa = x_at(y).clamp(0, max_x);
                let xb = x_at(y_next).clamp(0, max_x);
                self.accumulate_row(row, xa, y - row_y, xb, y_next - row_y, edge.winding);

                y = y_next;
            }
        }

        Ok(())
    }

    /// Deposit a line from `(xa, ya)` to `(xb, yb)` within one pixel row. `ya < yb` are offsets
    /// into the row.
    fn accumulate_row(&mut self, row: usize, xa: i32, ya: i32, xb: i32, yb: i32, winding: i32) {
        let ca = xa >> FIXED_SHIFT;
        let cb = xb >> FIXED_SHIFT;

        if ca == cb {
            self.add_cell(row, ca, yb - ya, (xa & FIXED_MASK) + (xb & FIXED_MASK), winding);
            return;
        }

        let dx = i64::from(xb - xa);
        let dy = i64::from(yb - ya);
        let y_at = |bx: i32| ya + (i64::from(bx - xa) * dy / dx) as i32;

        let mut x = xa;
        let mut y = ya;

        if cb > ca {
            for c in ca..cb {
                let bx = (c + 1) << FIXED_SHIFT;
                let by = y_at(bx);
                self.add_cell(row, c, by - y, (x - (c << FIXED_SHIFT)) + FIXED_SCALE, winding);
                x = bx;
                y = by;
            }
            self.add_cell(row, cb, yb - y, xb - (cb << FIXED_SHIFT), winding);
        } else {
            for c in (cb + 1..=ca).rev() {
                let bx = c << FIXED_SHIFT;
                let by = y_at(bx);
                self.add_cell(row, c, by - y, x - bx, winding);
                x = bx;
                y = by;
            }
            self.add_cell(row, cb, yb - y, FIXED_SCALE + (xb - (cb << FIXED_SHIFT)), winding);
        }
    }

    #[inline(always)]
    fn add_cell(&mut self, row: usize, cell: i32, dy: i32, fx_sum: i32, winding: i32) {
        if dy == 0 {
            return;
        }

        let c = cell as usize;
        let base = row * self.stride + c;
        let area = winding * dy;

        self.cells[base] += area * (2 * FIXED_SCALE - fx_sum);
        self.cells[base + 1] += area * fx_sum;

        self.row_min[row] = self.row_min[row].min(c as u32);
        self.row_max[row] = self.row_max[row].max(c as u32 + 1);
    }

    fn emit(&mut self, rows: (u32, u32), fill_rule: Fill, alpha: u8, sink: &mut impl SpanSink) {
        self.state = RasterState::EmitSpans;

        for r in 0..(rows.1 - rows.0) as usize {
            let (min, max) = (self.row_min[r], self.row_max[r]);
            if min > max {
                continue;
            }
            self.row_min[r] = u32::MAX;
            self.row_max[r] = 0;

            let y = rows.0 + r as u32;
            let cells = &mut self.cells[r * self.stride..(r + 1) * self.stride];
            let mut acc = 0;
            let mut run_start = min;
            let mut run_coverage = 0;

            for x in min..=max {
                acc += cells[x as usize];
                cells[x as usize] = 0;

                if x >= self.width {
                    continue;
                }

                let c = coverage(acc, fill_rule, alpha);
                if c != run_coverage {
                    if run_coverage != 0 {
                        sink.span(
                            y,
                            Span {
                                x0: run_start,
                                x1: x,
                                coverage: run_coverage,
                            },
                        );
                    }
                    run_start = x;
                    run_coverage = c;
                }
            }

            // Right of the last touched cell the sum doesn't change anymore.
            if run_coverage != 0 && run_start < self.width {
                sink.span(
                    y,
                    Span {
                        x0: run_start,
                        x1: self.width,
                        coverage: run_coverage,
                    },
                );
            }
        }
    }

    fn discard(&mut self, rows: (u32, u32)) {
        for r in 0..(rows.1 - rows.0) as usize {
            if self.row_min[r] <= self.row_max[r] {
                let start = r * self.stride + self.row_min[r] as usize;
                let end = r * self.stride + self.row_max[r] as usize;
                self.cells[start..=end].fill(0);
            }
            self.row_min[r] = u32::MAX;
            self.row_max[r] = 0;
        }
        self.state = RasterState::Done;
    }
}
