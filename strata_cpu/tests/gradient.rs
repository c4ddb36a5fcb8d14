// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Linear gradients.

use crate::util::get_ctx;
use strata_cpu::color::palette::css::{BLACK, WHITE};
use strata_cpu::kurbo::{Affine, Point, Rect, Shape};
use strata_cpu::{Paint, RasterContext};

fn black_to_white(end: Point) -> Paint {
    Paint::LinearGradient {
        start: Point::ZERO,
        end,
        start_color: BLACK,
        end_color: WHITE,
    }
}

fn row(ctx: &RasterContext, y: u16) -> Vec<u8> {
    (0..ctx.width()).map(|x| ctx.pixmap().sample(x, y).r).collect()
}

#[test]
fn horizontal_gradient() {
    for threads in [0, 2] {
        let mut ctx = get_ctx(100, 10, threads);
        ctx.set_paint(black_to_white(Point::new(100.0, 0.0)));
        ctx.fill_rect(&Rect::new(0.0, 0.0, 100.0, 10.0));
        ctx.flush().unwrap();

        let row = row(&ctx, 5);
        assert!(row[0] < 5, "{}", row[0]);
        assert!(row[99] > 250, "{}", row[99]);
        assert!(row.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(ctx.pixmap().sample(50, 0).a, 255);
    }
}

#[test]
fn gradient_is_padded() {
    let mut ctx = get_ctx(100, 4, 0);
    ctx.set_paint(Paint::LinearGradient {
        start: Point::new(25.0, 0.0),
        end: Point::new(75.0, 0.0),
        start_color: BLACK,
        end_color: WHITE,
    });
    ctx.fill_rect(&Rect::new(0.0, 0.0, 100.0, 4.0));

    let row = row(&ctx, 2);
    assert!(row[..25].iter().all(|&r| r == 0));
    assert!(row[75..].iter().all(|&r| r == 255));
}

#[test]
fn gradient_follows_the_transform() {
    let mut plain = get_ctx(100, 10, 0);
    plain.set_paint(black_to_white(Point::new(100.0, 0.0)));
    plain.fill_rect(&Rect::new(0.0, 0.0, 100.0, 10.0));

    let mut scaled = get_ctx(100, 10, 2);
    scaled.set_transform(Affine::scale(2.0));
    scaled.set_paint(black_to_white(Point::new(50.0, 0.0)));
    scaled.fill_path(&Rect::new(0.0, 0.0, 50.0, 5.0).to_path(0.1));
    scaled.flush().unwrap();

    for (a, b) in row(&plain, 5).into_iter().zip(row(&scaled, 5)) {
        assert!(a.abs_diff(b) <= 1, "{a} vs {b}");
    }
}

#[test]
fn gradient_in_every_batch() {
    let mut ctx = get_ctx(64, 64, 2);

    for i in 0..4 {
        let y = f64::from(i) * 16.0;
        ctx.set_paint(black_to_white(Point::new(64.0, 0.0)));
        ctx.fill_path(&Rect::new(0.0, y, 64.0, y + 16.0).to_path(0.1));
        ctx.flush().unwrap();
    }

    let first = row(&ctx, 8);
    assert_eq!(row(&ctx, 56), first);
    assert!(first[63] > first[0]);
}
