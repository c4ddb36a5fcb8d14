// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Strokes.

use crate::util::{TRANSPARENT, get_ctx};
use strata_cpu::kurbo::{Affine, BezPath, Cap, Stroke};

fn horizontal_line() -> BezPath {
    let mut path = BezPath::new();
    path.move_to((2.0, 5.0));
    path.line_to((20.0, 5.0));

    path
}

#[test]
fn stroke_covers_half_the_width_on_each_side() {
    for threads in [0, 2] {
        let mut ctx = get_ctx(24, 10, threads);
        ctx.set_stroke(Stroke::new(2.0));
        ctx.stroke_path(&horizontal_line());
        ctx.flush().unwrap();

        assert!(ctx.pixmap().sample(10, 4).a >= 254);
        assert!(ctx.pixmap().sample(10, 5).a >= 254);
        assert!(ctx.pixmap().sample(10, 3).a <= 1);
        assert!(ctx.pixmap().sample(10, 6).a <= 1);
        // Butt caps end at the end points.
        assert!(ctx.pixmap().sample(1, 5).a <= 1);
        assert!(ctx.pixmap().sample(20, 5).a <= 1);
    }
}

#[test]
fn square_caps_extend_the_stroke() {
    let mut ctx = get_ctx(24, 10, 0);
    ctx.set_stroke(Stroke::new(2.0).with_caps(Cap::Square));
    ctx.stroke_path(&horizontal_line());

    assert!(ctx.pixmap().sample(1, 5).a >= 254);
    assert!(ctx.pixmap().sample(20, 5).a >= 254);
    assert!(ctx.pixmap().sample(0, 5).a <= 1);
}

#[test]
fn stroke_width_is_scaled_by_the_transform() {
    let mut ctx = get_ctx(48, 20, 2);
    ctx.set_transform(Affine::scale(2.0));
    ctx.set_stroke(Stroke::new(2.0));
    ctx.stroke_path(&horizontal_line());
    ctx.flush().unwrap();

    for y in 8..12 {
        assert!(ctx.pixmap().sample(20, y).a >= 254, "row {y}");
    }
    assert!(ctx.pixmap().sample(20, 7).a <= 1);
    assert!(ctx.pixmap().sample(20, 12).a <= 1);
}

#[test]
fn zero_length_stroke_draws_nothing() {
    let mut path = BezPath::new();
    path.move_to((5.0, 5.0));
    path.line_to((5.0, 5.0));

    let mut ctx = get_ctx(10, 10, 0);
    ctx.stroke_path(&path);
    ctx.flush().unwrap();

    assert_eq!(ctx.pixmap().sample(5, 5), TRANSPARENT);
}
