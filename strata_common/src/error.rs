// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Errors produced while building edges, rasterizing and running pipelines.
//!
//! None of these errors ever crosses a worker boundary as a value: workers record them as
//! [`ErrorFlags`], which are OR-merged into the batch and inspected by the caller once all
//! workers are done.

use crate::pipeline::Signature;
use core::fmt;
use core::ops::{BitOr, BitOrAssign};
use thiserror::Error;

/// An error that caused one unit of work (a job or a command) to be abandoned.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterError {
    /// An allocation in the arena or the coverage buffer failed.
    #[error("out of memory")]
    OutOfMemory,
    /// Curve flattening exceeded its subdivision budget.
    #[error("geometry too complex to flatten")]
    GeometryTooComplex,
    /// An internal contract was broken.
    #[error("invariant violation: {0}")]
    InvariantViolation(&'static str),
    /// The pipeline provider has no pipeline for the signature.
    #[error("no pipeline found for {0:?}")]
    PipelineNotFound(Signature),
}

impl RasterError {
    /// Construct an [`RasterError::InvariantViolation`].
    ///
    /// Invariant violations are bugs, so this asserts in debug builds.
    #[track_caller]
    pub fn invariant(what: &'static str) -> Self {
        debug_assert!(false, "invariant violation: {what}");
        Self::InvariantViolation(what)
    }
}

/// Accumulated error flags.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ErrorFlags(u32);

impl ErrorFlags {
    /// No errors.
    pub const NONE: Self = Self(0);
    /// See [`RasterError::OutOfMemory`].
    pub const OUT_OF_MEMORY: Self = Self(1 << 0);
    /// See [`RasterError::GeometryTooComplex`].
    pub const GEOMETRY_TOO_COMPLEX: Self = Self(1 << 1);
    /// See [`RasterError::InvariantViolation`].
    pub const INVARIANT_VIOLATION: Self = Self(1 << 2);
    /// See [`RasterError::PipelineNotFound`].
    pub const PIPELINE_NOT_FOUND: Self = Self(1 << 3);

    /// Create flags from their raw bits, unknown bits are dropped.
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & 0xF)
    }

    /// The raw bits.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether no flag is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether all flags of `other` are set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl From<RasterError> for ErrorFlags {
    fn from(err: RasterError) -> Self {
        match err {
            RasterError::OutOfMemory => Self::OUT_OF_MEMORY,
            RasterError::GeometryTooComplex => Self::GEOMETRY_TOO_COMPLEX,
            RasterError::InvariantViolation(_) => Self::INVARIANT_VIOLATION,
            RasterError::PipelineNotFound(_) => Self::PIPELINE_NOT_FOUND,
        }
    }
}

impl BitOr for ErrorFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ErrorFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for ErrorFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(ErrorFlags, &str); 4] = [
            (ErrorFlags::OUT_OF_MEMORY, "OUT_OF_MEMORY"),
            (ErrorFlags::GEOMETRY_TOO_COMPLEX, "GEOMETRY_TOO_COMPLEX"),
            (ErrorFlags::INVARIANT_VIOLATION, "INVARIANT_VIOLATION"),
            (ErrorFlags::PIPELINE_NOT_FOUND, "PIPELINE_NOT_FOUND"),
        ];

        let mut set = f.debug_set();
        for (flag, name) in NAMES {
            if self.contains(flag) {
                set.entry(&format_args!("{name}"));
            }
        }
        set.finish()
    }
}
