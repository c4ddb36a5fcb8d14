// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-thread scratch state.

use strata_common::edge::EdgeStorage;
use strata_common::error::{ErrorFlags, RasterError};
use strata_common::kurbo::BezPath;
use strata_common::pipeline::PipelineCache;
use strata_common::rasterizer::AnalyticRasterizer;

/// What a [`WorkData`] is sized for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct WorkDataParams {
    pub(crate) width: u16,
    pub(crate) height: u16,
    pub(crate) band_height: u32,
    pub(crate) arena_limit: Option<usize>,
}

impl WorkDataParams {
    pub(crate) fn band_count(&self) -> u32 {
        u32::from(self.height).div_ceil(self.band_height)
    }
}

/// The state one thread needs to build edges and rasterize. Never shared between threads.
#[derive(Debug)]
pub(crate) struct WorkData {
    pub(crate) edge_storage: EdgeStorage,
    pub(crate) rasterizer: AnalyticRasterizer,
    pub(crate) pipelines: PipelineCache,
    pub(crate) error_flags: ErrorFlags,
    /// Reused for glyph outlines.
    pub(crate) tmp_path: BezPath,
}

impl WorkData {
    pub(crate) fn new(params: &WorkDataParams) -> Result<Self, RasterError> {
        let mut edge_storage = EdgeStorage::new(params.band_count(), params.band_height);
        edge_storage.set_byte_limit(params.arena_limit);

        Ok(Self {
            edge_storage,
            rasterizer: AnalyticRasterizer::new(
                u32::from(params.width),
                u32::from(params.height),
                params.band_height,
            )?,
            pipelines: PipelineCache::new(),
            error_flags: ErrorFlags::NONE,
            tmp_path: BezPath::new(),
        })
    }

    pub(crate) fn record(&mut self, err: RasterError) {
        self.error_flags |= err.into();
    }

    pub(crate) fn take_error_flags(&mut self) -> ErrorFlags {
        core::mem::take(&mut self.error_flags)
    }
}
