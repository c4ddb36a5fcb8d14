// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! This crate includes the geometry representations, the analytic rasterizer and the pixel
//! pipeline contract used by [Strata CPU][strata_cpu].
//!
//! # Usage
//!
//! This crate should not be used on its own, and you should instead use the renderer which uses it.
//!
//! # Contents
//!
//! - Fixed-point (24.8) coordinates and boxes, see [`fixed`].
//! - Banded edge storage and the edge builder that fills it, see [`edge`] and [`edge_builder`].
//! - Curve flattening, see [`flatten`].
//! - The analytic (exact-area) scanline rasterizer, see [`rasterizer`].
//! - The contract between the rasterizer and the pixel pipelines, see [`pipeline`].
//! - A simple premultiplied RGBA8 pixmap, see [`pixmap`].
//!
//! [strata_cpu]: https://crates.io/crates/strata_cpu
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![warn(clippy::print_stdout, clippy::print_stderr)]
#![cfg_attr(target_pointer_width = "64", warn(clippy::trivially_copy_pass_by_ref))]
#![forbid(unsafe_code)]
#![expect(
    clippy::cast_possible_truncation,
    reason = "Fixed-point conversions truncate on purpose, coordinates are clipped beforehand."
)]

pub mod edge;
pub mod edge_builder;
pub mod error;
pub mod fixed;
pub mod flatten;
pub mod pipeline;
pub mod pixmap;
pub mod rasterizer;

pub use peniko;
pub use peniko::color;
pub use peniko::kurbo;
