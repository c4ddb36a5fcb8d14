// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Flattening curves into line segments.
//!
//! Curves are split in half until the distance between the curve and its chord is within the
//! tolerance. The recursion is driven by an explicit stack and capped at
//! [`MAX_SUBDIVISION_DEPTH`], so hostile input fails with
//! [`RasterError::GeometryTooComplex`] instead of looping.

use crate::error::RasterError;
use crate::kurbo::{self, BezPath, PathEl, Point, Stroke, StrokeOpts};
use smallvec::SmallVec;

/// How often a single curve may be halved.
pub const MAX_SUBDIVISION_DEPTH: u32 = 32;

/// The default flattening tolerance, in pixels.
pub const DEFAULT_TOLERANCE: f64 = 0.25;

/// A curve that can be split at `t = 0.5`.
pub(crate) trait Subdivide: Copy {
    /// An upper bound of the distance between the curve and the chord from its start to its end.
    fn chord_error(&self) -> f64;
    /// The two halves.
    fn split(&self) -> (Self, Self);
    /// The end point.
    fn end(&self) -> Point;
}

/// A quadratic Bézier curve.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Quad(pub [Point; 3]);

/// A cubic Bézier curve.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Cubic(pub [Point; 4]);

/// A rational quadratic curve with weight `w` on the control point.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Conic {
    pub p: [Point; 3],
    pub w: f64,
}

#[inline(always)]
fn second_difference(p0: Point, p1: Point, p2: Point) -> f64 {
    (p0.to_vec2() - 2.0 * p1.to_vec2() + p2.to_vec2()).hypot()
}

impl Subdivide for Quad {
    fn chord_error(&self) -> f64 {
        let [p0, p1, p2] = self.0;
        0.25 * second_difference(p0, p1, p2)
    }

    fn split(&self) -> (Self, Self) {
        let [p0, p1, p2] = self.0;
        let a = p0.midpoint(p1);
        let b = p1.midpoint(p2);
        let m = a.midpoint(b);

        (Self([p0, a, m]), Self([m, b, p2]))
    }

    fn end(&self) -> Point {
        self.0[2]
    }
}

impl Subdivide for Cubic {
    fn chord_error(&self) -> f64 {
        let [p0, p1, p2, p3] = self.0;
        0.75 * second_difference(p0, p1, p2).max(second_difference(p1, p2, p3))
    }

    fn split(&self) -> (Self, Self) {
        let [p0, p1, p2, p3] = self.0;
        let a = p0.midpoint(p1);
        let b = p1.midpoint(p2);
        let c = p2.midpoint(p3);
        let ab = a.midpoint(b);
        let bc = b.midpoint(c);
        let m = ab.midpoint(bc);

        (Self([p0, a, ab, m]), Self([m, bc, c, p3]))
    }

    fn end(&self) -> Point {
        self.0[3]
    }
}

impl Conic {
    fn midpoint(&self) -> Point {
        let [p0, p1, p2] = self.p;
        let sum = p0.to_vec2() + 2.0 * self.w * p1.to_vec2() + p2.to_vec2();
        let v = sum / (2.0 * (1.0 + self.w));
        v.to_point()
    }
}

impl Subdivide for Conic {
    fn chord_error(&self) -> f64 {
        let [p0, _, p2] = self.p;
        (self.midpoint() - p0.midpoint(p2)).hypot()
    }

    fn split(&self) -> (Self, Self) {
        let [p0, p1, p2] = self.p;
        let w = self.w;
        let m = self.midpoint();
        let a = ((p0.to_vec2() + w * p1.to_vec2()) / (1.0 + w)).to_point();
        let b = ((w * p1.to_vec2() + p2.to_vec2()) / (1.0 + w)).to_point();
        let half_w = ((1.0 + w) * 0.5).sqrt();

        (
            Self {
                p: [p0, a, m],
                w: half_w,
            },
            Self {
                p: [m, b, p2],
                w: half_w,
            },
        )
    }

    fn end(&self) -> Point {
        self.p[2]
    }
}

/// Flatten `curve`, calling `line_to` for the end point of every produced segment. The start
/// point of the curve is not reported.
pub(crate) fn flatten<C: Subdivide>(
    curve: C,
    tolerance: f64,
    mut line_to: impl FnMut(Point) -> Result<(), RasterError>,
) -> Result<(), RasterError> {
    let mut stack: SmallVec<[(C, u32); 32]> = SmallVec::new();
    stack.push((curve, 0));

    while let Some((c, depth)) = stack.pop() {
        if c.chord_error() <= tolerance {
            line_to(c.end())?;
            continue;
        }

        if depth >= MAX_SUBDIVISION_DEPTH {
            return Err(RasterError::GeometryTooComplex);
        }

        let (first, second) = c.split();
        stack.push((second, depth + 1));
        stack.push((first, depth + 1));
    }

    Ok(())
}

/// Expand a stroked path to a filled path.
pub fn expand_stroke(
    path: impl IntoIterator<Item = PathEl>,
    style: &Stroke,
    tolerance: f64,
) -> BezPath {
    kurbo::stroke(path, style, &StrokeOpts::default(), tolerance)
}

#[cfg(test)]
mod tests {
    use super::{Conic, Cubic, MAX_SUBDIVISION_DEPTH, Quad, flatten};
    use crate::error::RasterError;
    use crate::kurbo::{CubicBez, ParamCurve, ParamCurveNearest, Point, QuadBez};

    fn collect(curve: impl super::Subdivide, tolerance: f64) -> Result<Vec<Point>, RasterError> {
        let mut out = vec![];
        flatten(curve, tolerance, |p| {
            out.push(p);
            Ok(())
        })?;
        Ok(out)
    }

    #[test]
    fn straight_quad_is_one_segment() {
        let pts = collect(
            Quad([Point::new(0.0, 0.0), Point::new(5.0, 5.0), Point::new(10.0, 10.0)]),
            0.25,
        )
        .unwrap();

        assert_eq!(pts, vec![Point::new(10.0, 10.0)]);
    }

    #[test]
    fn quad_within_tolerance() {
        let ctrl = [Point::new(0.0, 0.0), Point::new(50.0, 100.0), Point::new(100.0, 0.0)];
        let pts = collect(Quad(ctrl), 0.25).unwrap();
        let exact = QuadBez::new(ctrl[0], ctrl[1], ctrl[2]);

        assert!(pts.len() > 4);
        assert_eq!(*pts.last().unwrap(), ctrl[2]);

        // The produced points lie on the curve, and the chord midpoints stay close to it.
        let mut prev = ctrl[0];
        for p in pts {
            let mid = prev.midpoint(p);
            let nearest = exact.nearest(mid, 1e-6);
            assert!(nearest.distance_sq.sqrt() <= 0.25 + 1e-6);
            prev = p;
        }
    }

    #[test]
    fn cubic_within_tolerance() {
        let ctrl = [
            Point::new(0.0, 0.0),
            Point::new(0.0, 80.0),
            Point::new(100.0, -80.0),
            Point::new(100.0, 0.0),
        ];
        let pts = collect(Cubic(ctrl), 0.25).unwrap();
        let exact = CubicBez::new(ctrl[0], ctrl[1], ctrl[2], ctrl[3]);

        let mut prev = ctrl[0];
        for p in pts {
            let nearest = exact.nearest(prev.midpoint(p), 1e-6);
            assert!(nearest.distance_sq.sqrt() <= 0.25 + 1e-6);
            prev = p;
        }
        assert_eq!(exact.eval(1.0), prev);
    }

    #[test]
    fn conic_quarter_circle() {
        let w = core::f64::consts::FRAC_1_SQRT_2;
        let conic = Conic {
            p: [Point::new(100.0, 0.0), Point::new(100.0, 100.0), Point::new(0.0, 100.0)],
            w,
        };
        let pts = collect(conic, 0.1).unwrap();

        assert!(pts.len() > 2);
        for p in pts {
            let r = p.to_vec2().hypot();
            assert!((r - 100.0).abs() < 1e-6, "{p:?} is off the circle");
        }
    }

    #[test]
    fn subdivision_is_capped() {
        let ctrl = [Point::new(0.0, 0.0), Point::new(1e6, 1e6), Point::new(2e6, 0.0)];

        assert_eq!(
            collect(Quad(ctrl), 0.0),
            Err(RasterError::GeometryTooComplex)
        );
        assert!(MAX_SUBDIVISION_DEPTH >= 16);
    }
}
