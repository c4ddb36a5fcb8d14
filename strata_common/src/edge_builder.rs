// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Converting paths into edges.
//!
//! The builder works in a coordinate space that is already scaled to fixed point: the transform
//! passed to [`EdgeBuilder::add_path`] is expected to include the `1 << FIXED_SHIFT` scale, and
//! the clip box and tolerance are given in fixed-point units as well. Curves are flattened and
//! clipped in floating point; only the final vertices are rounded to fixed point.
//!
//! Consecutive segments that keep going in the same vertical direction are merged into one
//! polyline [`Edge`](crate::edge::Edge), segments going up are stored reversed with a negative
//! sign.

use crate::edge::EdgeStorage;
use crate::error::RasterError;
use crate::fixed::{BoxI, EdgePoint, to_fixed};
use crate::flatten::{Conic, Cubic, Quad, flatten};
use crate::kurbo::{Affine, PathEl, Point};
use log::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Down,
    Up,
}

#[derive(Clone, Copy, Debug)]
struct Run {
    start: u32,
    direction: Direction,
    last: EdgePoint,
}

/// Builds edges into an [`EdgeStorage`].
///
/// When any method returns an error, the storage holds a partial result and should be
/// [cleared](EdgeStorage::clear) by the caller.
#[derive(Debug)]
pub struct EdgeBuilder<'a> {
    storage: &'a mut EdgeStorage,
    clip_x0: f64,
    clip_y0: f64,
    clip_x1: f64,
    clip_y1: f64,
    tolerance: f64,
    run: Option<Run>,
    start: Point,
    current: Point,
    in_contour: bool,
}

impl<'a> EdgeBuilder<'a> {
    /// Create a builder appending to `storage`.
    ///
    /// `clip_box` and `tolerance` are in fixed-point units.
    pub fn new(storage: &'a mut EdgeStorage, clip_box: BoxI, tolerance: f64) -> Self {
        Self {
            storage,
            clip_x0: f64::from(clip_box.x0),
            clip_y0: f64::from(clip_box.y0),
            clip_x1: f64::from(clip_box.x1),
            clip_y1: f64::from(clip_box.y1),
            tolerance,
            run: None,
            start: Point::ZERO,
            current: Point::ZERO,
            in_contour: false,
        }
    }

    /// Add all contours of `path`, transformed by `transform`. Every contour is implicitly
    /// closed.
    ///
    /// A path with non-finite coordinates is ill-defined and ignored.
    pub fn add_path(&mut self, path: &[PathEl], transform: Affine) -> Result<(), RasterError> {
        if !path.iter().all(|el| is_finite(transform * *el)) {
            warn!("A path contains NaN or infinite coordinates, ignoring it.");
            return Ok(());
        }

        for el in path {
            match transform * *el {
                PathEl::MoveTo(p) => self.move_to(p)?,
                PathEl::LineTo(p) => self.line_to(p)?,
                PathEl::QuadTo(p1, p2) => self.quad_to(p1, p2)?,
                PathEl::CurveTo(p1, p2, p3) => self.cubic_to(p1, p2, p3)?,
                PathEl::ClosePath => self.close()?,
            }
        }

        self.finish()
    }

    /// Start a new contour, closing the previous one.
    pub fn move_to(&mut self, p: Point) -> Result<(), RasterError> {
        self.close()?;
        self.start = p;
        self.current = p;
        self.in_contour = true;

        Ok(())
    }

    /// Add a line from the current point.
    pub fn line_to(&mut self, p: Point) -> Result<(), RasterError> {
        self.begin_implicit();
        self.clipped_line(self.current, p)?;
        self.current = p;

        Ok(())
    }

    /// Add a quadratic Bézier curve from the current point.
    pub fn quad_to(&mut self, p1: Point, p2: Point) -> Result<(), RasterError> {
        self.begin_implicit();
        let p0 = self.current;

        if self.outside_vertically(&[p0, p1, p2]) {
            return self.line_to(p2);
        }

        let tolerance = self.tolerance;
        flatten(Quad([p0, p1, p2]), tolerance, |p| self.line_to(p))
    }

    /// Add a cubic Bézier curve from the current point.
    pub fn cubic_to(&mut self, p1: Point, p2: Point, p3: Point) -> Result<(), RasterError> {
        self.begin_implicit();
        let p0 = self.current;

        if self.outside_vertically(&[p0, p1, p2, p3]) {
            return self.line_to(p3);
        }

        let tolerance = self.tolerance;
        flatten(Cubic([p0, p1, p2, p3]), tolerance, |p| self.line_to(p))
    }

    /// Add a conic (rational quadratic curve) with control point `p1` of weight `w` from the
    /// current point.
    ///
    /// A weight of `1` is an ordinary quadratic curve, `w < 1` gives elliptic arcs. The points
    /// must already be transformed.
    pub fn conic_to(&mut self, p1: Point, p2: Point, w: f64) -> Result<(), RasterError> {
        self.begin_implicit();
        let p0 = self.current;

        if !(w.is_finite() && w > 0.0) {
            return Err(RasterError::GeometryTooComplex);
        }

        if self.outside_vertically(&[p0, p1, p2]) {
            return self.line_to(p2);
        }

        let tolerance = self.tolerance;
        flatten(Conic { p: [p0, p1, p2], w }, tolerance, |p| self.line_to(p))
    }

    /// Close the current contour with a line back to its start.
    pub fn close(&mut self) -> Result<(), RasterError> {
        if self.in_contour && self.current != self.start {
            self.clipped_line(self.current, self.start)?;
        }

        self.current = self.start;
        self.in_contour = false;

        Ok(())
    }

    /// Close the current contour and commit the last pending edge.
    pub fn finish(&mut self) -> Result<(), RasterError> {
        self.close()?;
        self.close_run()
    }

    fn begin_implicit(&mut self) {
        if !self.in_contour {
            self.start = self.current;
            self.in_contour = true;
        }
    }

    fn outside_vertically(&self, pts: &[Point]) -> bool {
        pts.iter().all(|p| p.y <= self.clip_y0) || pts.iter().all(|p| p.y >= self.clip_y1)
    }

    fn clipped_line(&mut self, mut p0: Point, mut p1: Point) -> Result<(), RasterError> {
        let (y_min, y_max) = (self.clip_y0, self.clip_y1);

        if p0.y == p1.y || (p0.y <= y_min && p1.y <= y_min) || (p0.y >= y_max && p1.y >= y_max) {
            return Ok(());
        }

        // Clip against the top and bottom of the clip box, keeping the original direction.
        let at_y = |a: Point, b: Point, y: f64| {
            let t = (y - a.y) / (b.y - a.y);
            Point::new(a.x + (b.x - a.x) * t, y)
        };
        let (top, bottom) = if p0.y < p1.y {
            (&mut p0, &mut p1)
        } else {
            (&mut p1, &mut p0)
        };
        let (a, b) = (*top, *bottom);
        if a.y < y_min {
            *top = at_y(a, b, y_min);
        }
        if b.y > y_max {
            *bottom = at_y(a, b, y_max);
        }

        // Split at the left and right sides, clamping the parts that lie outside onto the
        // border. This keeps the winding of the parts left of the box intact.
        let (x_min, x_max) = (self.clip_x0, self.clip_x1);
        let mut ts = [0.0, 1.0, 1.0, 1.0];
        let mut n = 1;
        for x in [x_min, x_max] {
            if (p0.x < x) != (p1.x < x) {
                let t = (x - p0.x) / (p1.x - p0.x);
                if t > 0.0 && t < 1.0 {
                    ts[n] = t;
                    n += 1;
                }
            }
        }
        ts[n] = 1.0;
        ts[1..n].sort_by(f64::total_cmp);

        let lerp = |t: f64| {
            if t == 0.0 {
                p0
            } else if t == 1.0 {
                p1
            } else {
                p0.lerp(p1, t)
            }
        };
        let quantize = |p: Point| EdgePoint::new(to_fixed(p.x.clamp(x_min, x_max)), to_fixed(p.y));

        for pair in ts[..=n].windows(2) {
            let a = quantize(lerp(pair[0]));
            let b = quantize(lerp(pair[1]));
            self.segment(a, b)?;
        }

        Ok(())
    }

    fn segment(&mut self, a: EdgePoint, b: EdgePoint) -> Result<(), RasterError> {
        if a.y == b.y {
            return self.close_run();
        }

        let direction = if b.y > a.y {
            Direction::Down
        } else {
            Direction::Up
        };

        if let Some(run) = &mut self.run {
            if run.direction == direction && run.last == a {
                run.last = b;
                return self.storage.push_point(b);
            }
        }

        self.close_run()?;

        let start = self.storage.point_mark();
        self.run = Some(Run {
            start,
            direction,
            last: b,
        });
        self.storage.push_point(a)?;
        self.storage.push_point(b)
    }

    fn close_run(&mut self) -> Result<(), RasterError> {
        match self.run.take() {
            Some(run) => self
                .storage
                .close_edge(run.start, run.direction == Direction::Up),
            None => Ok(()),
        }
    }
}

fn is_finite(el: PathEl) -> bool {
    match el {
        PathEl::MoveTo(p) | PathEl::LineTo(p) => p.is_finite(),
        PathEl::QuadTo(p1, p2) => p1.is_finite() && p2.is_finite(),
        PathEl::CurveTo(p1, p2, p3) => p1.is_finite() && p2.is_finite() && p3.is_finite(),
        PathEl::ClosePath => true,
    }
}

#[cfg(test)]
mod tests {
    use super::EdgeBuilder;
    use crate::edge::EdgeStorage;
    use crate::fixed::{BoxI, EdgePoint, FIXED_SCALE};
    use crate::kurbo::{Affine, BezPath, Circle, PathEl, Point, Shape};

    const TOLERANCE: f64 = 0.25 * FIXED_SCALE as f64;

    fn to_fixed_space() -> Affine {
        Affine::scale(f64::from(FIXED_SCALE))
    }

    fn build(path: &[PathEl], clip: BoxI) -> EdgeStorage {
        let mut storage = EdgeStorage::new(4, 4);
        EdgeBuilder::new(&mut storage, clip.to_fixed(), TOLERANCE)
            .add_path(path, to_fixed_space())
            .unwrap();
        storage
    }

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Vec<PathEl> {
        vec![
            PathEl::MoveTo(Point::new(x0, y0)),
            PathEl::LineTo(Point::new(x1, y0)),
            PathEl::LineTo(Point::new(x1, y1)),
            PathEl::LineTo(Point::new(x0, y1)),
            PathEl::ClosePath,
        ]
    }

    #[test]
    fn rect_produces_two_opposite_edges() {
        let storage = build(&rect(2.0, 2.0, 8.0, 8.0), BoxI::new(0, 0, 16, 16));

        assert_eq!(storage.edge_count(), 2);
        assert_eq!(storage.bounding_box(), BoxI::new(512, 512, 2048, 2048));

        let mut edges: Vec<_> = storage.band_edges(0).map(|e| (e.points[0].x, e.winding)).collect();
        edges.sort_unstable();
        assert_eq!(edges, vec![(512, -1), (2048, 1)]);
    }

    #[test]
    fn upward_edges_are_stored_top_to_bottom() {
        let storage = build(&rect(1.0, 1.0, 3.0, 7.0), BoxI::new(0, 0, 16, 16));

        for band in 0..4 {
            for edge in storage.band_edges(band) {
                assert!(edge.points.windows(2).all(|w| w[0].y <= w[1].y));
            }
        }
    }

    #[test]
    fn non_finite_paths_are_ignored() {
        let path = [
            PathEl::MoveTo(Point::new(0.0, 0.0)),
            PathEl::LineTo(Point::new(f64::NAN, 4.0)),
            PathEl::LineTo(Point::new(4.0, 4.0)),
        ];
        let storage = build(&path, BoxI::new(0, 0, 16, 16));

        assert!(storage.is_empty());
    }

    #[test]
    fn vertically_outside_is_dropped() {
        let storage = build(&rect(2.0, 20.0, 8.0, 30.0), BoxI::new(0, 0, 16, 16));
        assert!(storage.is_empty());
    }

    #[test]
    fn clipped_to_the_box() {
        let path = [
            PathEl::MoveTo(Point::new(-5.0, -3.0)),
            PathEl::LineTo(Point::new(25.0, 3.0)),
            PathEl::LineTo(Point::new(6.0, 30.0)),
            PathEl::ClosePath,
        ];
        let clip = BoxI::new(0, 0, 16, 16);
        let storage = build(&path, clip);
        let bbox = storage.bounding_box();

        assert!(!storage.is_empty());
        assert_eq!(bbox.y0, 0);
        assert_eq!(bbox.y1, 16 * FIXED_SCALE);
        assert!(bbox.x0 >= 0 && bbox.x1 <= 16 * FIXED_SCALE);

        for band in 0..4 {
            for edge in storage.band_edges(band) {
                assert!(edge.points.iter().all(|p| p.x >= 0 && p.x <= 16 * FIXED_SCALE));
            }
        }
    }

    #[test]
    fn circle_windings_balance_in_every_band() {
        let circle: BezPath = Circle::new((8.0, 8.0), 6.0).to_path(0.1);
        let storage = build(circle.elements(), BoxI::new(0, 0, 16, 16));

        assert!(storage.edge_count() >= 2);
        for band in 0..4 {
            let windings: i32 = storage.band_edges(band).map(|e| e.winding).sum();
            assert_eq!(windings, 0, "band {band}");
        }

        let bbox = storage.bounding_box();
        assert!((bbox.x0 - 2 * FIXED_SCALE).abs() <= 2);
        assert!((bbox.y1 - 14 * FIXED_SCALE).abs() <= 2);
    }

    #[test]
    fn conic_contour() {
        let mut storage = EdgeStorage::new(4, 4);
        let scale = f64::from(FIXED_SCALE);
        let mut builder =
            EdgeBuilder::new(&mut storage, BoxI::new(0, 0, 16, 16).to_fixed(), TOLERANCE);

        builder.move_to(Point::new(0.0, 0.0)).unwrap();
        builder.line_to(Point::new(12.0 * scale, 0.0)).unwrap();
        builder
            .conic_to(
                Point::new(12.0 * scale, 12.0 * scale),
                Point::new(0.0, 12.0 * scale),
                core::f64::consts::FRAC_1_SQRT_2,
            )
            .unwrap();
        builder.finish().unwrap();

        assert_eq!(storage.edge_count(), 2);
        assert_eq!(
            storage.bounding_box(),
            BoxI::new(0, 0, 12 * FIXED_SCALE, 12 * FIXED_SCALE)
        );
        let down = storage.band_edges(0).find(|e| e.winding == 1).unwrap();
        assert_eq!(down.points[0], EdgePoint::new(12 * FIXED_SCALE, 0));
    }
}
