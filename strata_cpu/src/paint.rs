// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Paints and their conversion to fetch data.

use std::sync::Arc;
use strata_common::color::{AlphaColor, Srgb};
use strata_common::kurbo::{Affine, Point, Vec2};
use strata_common::pipeline::{CompOp, FetchData, FetchParams, LinearGradient};

/// What the inside of a shape is painted with.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Paint {
    /// A single color.
    Solid(AlphaColor<Srgb>),
    /// A two-stop linear gradient, padded at both ends. The points are in user space.
    LinearGradient {
        /// Where the gradient starts.
        start: Point,
        /// Where the gradient ends.
        end: Point,
        /// Color at `start` and before it.
        start_color: AlphaColor<Srgb>,
        /// Color at `end` and after it.
        end_color: AlphaColor<Srgb>,
    },
}

impl Default for Paint {
    fn default() -> Self {
        Self::Solid(AlphaColor::BLACK)
    }
}

impl From<AlphaColor<Srgb>> for Paint {
    fn from(value: AlphaColor<Srgb>) -> Self {
        Self::Solid(value)
    }
}

impl Paint {
    /// Encode the paint for drawing with `transform`.
    ///
    /// Solid colors are resolved right away. Gradients are created pending, their lookup table
    /// is built by whoever touches them first.
    pub(crate) fn to_fetch_data(
        &self,
        transform: Affine,
        comp_op: CompOp,
        batch_id: u64,
    ) -> Arc<FetchData> {
        match *self {
            Self::Solid(color) => FetchData::new(
                FetchParams::Solid(color.premultiply().to_rgba8()),
                comp_op,
                batch_id,
            ),
            Self::LinearGradient {
                start,
                end,
                start_color,
                end_color,
            } => {
                let (p0, p1) = device_gradient_line(transform, start, end);
                FetchData::pending(
                    FetchParams::LinearGradient(LinearGradient::new(
                        p0,
                        p1,
                        start_color,
                        end_color,
                    )),
                    comp_op,
                    batch_id,
                )
            }
        }
    }
}

/// Map the gradient line `start -> end` to device space.
///
/// The gradient parameter of a device pixel is an affine function of its position, even if
/// `transform` skews or scales unevenly. The returned line has the same parameter at every
/// device pixel as the user-space line has at the corresponding user-space point.
fn device_gradient_line(transform: Affine, start: Point, end: Point) -> (Point, Point) {
    let d = end - start;
    let len2 = d.hypot2();

    if len2 <= f64::EPSILON || transform.determinant().abs() <= f64::EPSILON {
        return (end, end);
    }

    let [a, b, c, dd, e, f] = transform.inverse().as_coeffs();
    let g = Vec2::new((a * d.x + b * d.y) / len2, (c * d.x + dd * d.y) / len2);
    let offset = (Vec2::new(e, f) - start.to_vec2()).dot(d) / len2;
    let g2 = g.hypot2();

    if g2 <= f64::EPSILON {
        return (end, end);
    }

    let p0 = (-offset * g / g2).to_point();
    (p0, p0 + g / g2)
}

#[cfg(test)]
mod tests {
    use super::device_gradient_line;
    use strata_common::kurbo::{Affine, Point};

    fn param(p0: Point, p1: Point, p: Point) -> f64 {
        let d = p1 - p0;
        (p - p0).dot(d) / d.hypot2()
    }

    #[test]
    fn identity_keeps_the_line() {
        let (p0, p1) = device_gradient_line(
            Affine::IDENTITY,
            Point::new(10.0, 0.0),
            Point::new(30.0, 0.0),
        );

        assert!((p0 - Point::new(10.0, 0.0)).hypot() < 1e-9);
        assert!((p1 - Point::new(30.0, 0.0)).hypot() < 1e-9);
    }

    #[test]
    fn skewed_transform_preserves_parameter() {
        let transform = Affine::new([2.0, 0.5, 0.3, 1.5, 7.0, -3.0]);
        let (start, end) = (Point::new(1.0, 2.0), Point::new(9.0, 5.0));
        let (p0, p1) = device_gradient_line(transform, start, end);

        for user in [start, end, Point::new(4.0, -1.0), Point::new(-3.0, 8.0)] {
            let expected = param(start, end, user);
            let actual = param(p0, p1, transform * user);
            assert!((expected - actual).abs() < 1e-9, "{expected} != {actual}");
        }
    }
}
