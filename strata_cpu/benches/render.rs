// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::Criterion;
use rand::prelude::StdRng;
use rand::{Rng, SeedableRng};
use strata_cpu::color::{AlphaColor, Srgb};
use strata_cpu::kurbo::{BezPath, Circle, Point, Shape, Vec2};
use strata_cpu::{RasterContext, RenderSettings};

const WIDTH: u16 = 1024;
const HEIGHT: u16 = 1024;
const SHAPES: usize = 500;
const SEED: [u8; 32] = [0; 32];

struct Item {
    path: BezPath,
    color: AlphaColor<Srgb>,
}

fn star(center: Point, n: usize, inner: f64, outer: f64) -> BezPath {
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

fn scene() -> Vec<Item> {
    let mut rng = StdRng::from_seed(SEED);

    (0..SHAPES)
        .map(|i| {
            let center = Point::new(
                rng.random_range(0.0..f64::from(WIDTH)),
                rng.random_range(0.0..f64::from(HEIGHT)),
            );
            let radius = rng.random_range(8.0..96.0);
            let path = if i % 2 == 0 {
                star(center, rng.random_range(4..12), radius * 0.4, radius)
            } else {
                Circle::new(center, radius).to_path(0.1)
            };
            let color = AlphaColor::from_rgba8(
                rng.random_range(0..=255),
                rng.random_range(0..=255),
                rng.random_range(0..=255),
                rng.random_range(64..=255),
            );

            Item { path, color }
        })
        .collect()
}

pub fn render(c: &mut Criterion) {
    let mut g = c.benchmark_group("render");
    let items = scene();

    macro_rules! render_with {
        ($name:ident, $threads:expr) => {
            g.bench_function(stringify!($name), |b| {
                let settings = RenderSettings {
                    num_threads: $threads,
                    ..Default::default()
                };
                let mut ctx = RasterContext::new_with(WIDTH, HEIGHT, settings);

                b.iter(|| {
                    ctx.reset();
                    for item in &items {
                        ctx.set_paint(item.color);
                        ctx.fill_path(&item.path);
                    }
                                        ctx.flush().unwrap();
                })
            });
        };
    }

    render_with!(synchronous, 0);
    render_with!(threads_2, 2);
    render_with!(threads_4, 4);
    render_with!(threads_8, 8);
}
