// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! This crate implements a banded CPU renderer built on an analytic coverage rasterizer.
//!
//! The destination is split into horizontal bands. Draw calls become *commands*, whose edges
//! are prepared by *jobs*. With worker threads enabled, a batch of jobs and commands is run by
//! all workers and the calling thread together: first everybody prepares geometry, then every
//! thread rasterizes all commands into the bands it owns, in the order they were issued.
//!
//! # Usage
//!
//! ```
//! use strata_cpu::{RasterContext, RenderSettings};
//! use strata_cpu::color::palette::css::REBECCA_PURPLE;
//! use strata_cpu::kurbo::Rect;
//!
//! let settings = RenderSettings {
//!     num_threads: 2,
//!     ..Default::default()
//! };
//! let mut ctx = RasterContext::new_with(64, 64, settings);
//! ctx.set_paint(REBECCA_PURPLE);
//! ctx.fill_rect(&Rect::new(8.0, 8.0, 56.0, 56.0));
//! ctx.flush().unwrap();
//!
//! assert_eq!(ctx.pixmap().sample(32, 32), REBECCA_PURPLE.premultiply().to_rgba8());
//! ```
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![warn(clippy::print_stdout, clippy::print_stderr)]
#![cfg_attr(target_pointer_width = "64", warn(clippy::trivially_copy_pass_by_ref))]
#![expect(
    clippy::cast_possible_truncation,
    reason = "Pixel coordinates are bounded by the u16 size of the destination."
)]

mod batch;
mod command;
mod context;
mod glyph;
mod job;
mod paint;
mod region;
mod settings;
mod sync;
mod work_data;
mod worker;

pub use context::{DegradedRender, RasterContext};
pub use glyph::{Glyph, GlyphOutlines, GlyphRun};
pub use paint::Paint;
pub use settings::{
    MAX_BAND_HEIGHT, MIN_BAND_HEIGHT, RenderSettings, SyncBackend, calculate_band_height,
};
pub use strata_common;
pub use strata_common::error::{ErrorFlags, RasterError};
pub use strata_common::peniko::Fill;
pub use strata_common::pipeline::{CompOp, PipelineProvider, ReferencePipelines};
pub use strata_common::pixmap::Pixmap;
pub use strata_common::{color, kurbo, peniko};
pub use sync::WorkerStats;
