// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Configuration of a [`RasterContext`](crate::RasterContext).

use std::sync::Arc;
use strata_common::flatten::DEFAULT_TOLERANCE;
use strata_common::pipeline::{PipelineProvider, ReferencePipelines};

/// The largest band height.
pub const MAX_BAND_HEIGHT: u32 = 64;
/// The smallest band height the automatic selection goes down to.
pub const MIN_BAND_HEIGHT: u32 = 8;

/// The cell storage of a band is kept below this size, so it stays in the cache.
const BAND_CACHE_LIMIT: usize = 256 * 1024;

/// How workers block at the synchronization points of a batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncBackend {
    /// Pick the best backend for the target, see [`SyncBackend::detect`].
    #[default]
    Auto,
    /// Park threads on the address of the shared counter.
    Futex,
    /// Use a mutex and a condition variable.
    Condvar,
}

impl SyncBackend {
    /// The backend [`Auto`](Self::Auto) resolves to on this target.
    pub fn detect() -> Self {
        if cfg!(any(unix, windows)) {
            Self::Futex
        } else {
            Self::Condvar
        }
    }

    /// Resolve [`Auto`](Self::Auto), leaving explicit choices alone.
    pub fn resolve(self) -> Self {
        match self {
            Self::Auto => Self::detect(),
            explicit => explicit,
        }
    }
}

/// Settings of a [`RasterContext`](crate::RasterContext).
#[derive(Clone, Debug)]
pub struct RenderSettings {
    /// Number of worker threads. `0` renders synchronously on the calling thread, otherwise the
    /// calling thread takes part in rendering next to `num_threads` workers.
    pub num_threads: u16,
    /// Height of a band in pixels, rounded up to a power of two. Chosen automatically if `None`.
    pub band_height: Option<u32>,
    /// How workers block.
    pub sync_backend: SyncBackend,
    /// Maximum distance between a curve and its flattened polyline, in device pixels.
    pub tolerance: f64,
    /// A batch is flushed automatically once it holds this many commands.
    pub command_queue_limit: usize,
    /// Upper bound of edge storage per worker, in bytes.
    pub arena_limit: Option<usize>,
    /// Where pixel pipelines come from.
    pub pipeline_provider: Arc<dyn PipelineProvider>,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            num_threads: 0,
            band_height: None,
            sync_backend: SyncBackend::Auto,
            tolerance: DEFAULT_TOLERANCE,
            command_queue_limit: 4096,
            arena_limit: None,
            pipeline_provider: Arc::new(ReferencePipelines),
        }
    }
}

impl RenderSettings {
    /// The band height to use for a `width` x `height` destination.
    pub fn effective_band_height(&self, width: u16, height: u16) -> u32 {
        match self.band_height {
            Some(h) => h.clamp(1, 256).next_power_of_two(),
            None => calculate_band_height(width, height, u32::from(self.num_threads)),
        }
    }
}

/// Pick a band height for a `width` x `height` destination rendered by `threads` threads.
///
/// Starts at [`MAX_BAND_HEIGHT`] and halves the height while the cells of a band don't fit
/// into the cache, and, with several threads, until there are enough bands to keep every
/// thread busy. Never goes below [`MIN_BAND_HEIGHT`].
pub fn calculate_band_height(width: u16, height: u16, threads: u32) -> u32 {
    let mut band_height = MAX_BAND_HEIGHT;
    let mut cell_storage = usize::from(width) * band_height as usize * size_of::<u32>();

    while cell_storage > BAND_CACHE_LIMIT && band_height > MIN_BAND_HEIGHT {
        band_height >>= 1;
        cell_storage >>= 1;
    }

    if threads > 1 {
        while band_height > MIN_BAND_HEIGHT && u32::from(height).div_ceil(band_height) < threads {
            band_height >>= 1;
        }
    }

    band_height
}

#[cfg(test)]
mod tests {
    use super::{RenderSettings, SyncBackend, calculate_band_height};

    #[test]
    fn band_height_small_targets() {
        assert_eq!(calculate_band_height(100, 100, 0), 64);
        assert_eq!(calculate_band_height(100, 100, 1), 64);
    }

    #[test]
    fn band_height_wide_targets() {
        // 2048 * 32 * 4 = 256 KiB.
        assert_eq!(calculate_band_height(2048, 1024, 0), 32);
        assert_eq!(calculate_band_height(u16::MAX, 1024, 0), 8);
    }

    #[test]
    fn band_height_many_threads() {
        // 4 bands of 64 rows would leave threads idle.
        assert_eq!(calculate_band_height(256, 256, 8), 32);
        assert_eq!(calculate_band_height(256, 16, 8), 8);
    }

    #[test]
    fn explicit_band_height_is_a_power_of_two() {
        let settings = RenderSettings {
            band_height: Some(5),
            ..Default::default()
        };
        assert_eq!(settings.effective_band_height(10, 10), 8);

        let settings = RenderSettings {
            band_height: Some(1000),
            ..Default::default()
        };
        assert_eq!(settings.effective_band_height(10, 10), 256);
    }

    #[test]
    fn backend_resolution() {
        assert_ne!(SyncBackend::Auto.resolve(), SyncBackend::Auto);
        assert_eq!(SyncBackend::Condvar.resolve(), SyncBackend::Condvar);
    }
}
