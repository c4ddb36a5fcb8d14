// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The contract between the rasterizer and the pixel pipelines.
//!
//! The rasterizer never blends pixels itself. For each span of constant coverage it calls a
//! [`FillSpanFn`] that was located through a [`PipelineProvider`] by the [`Signature`] of the
//! fill's [`FetchData`]. [`ReferencePipelines`] is a portable provider that covers every
//! signature this crate can produce.

use crate::error::RasterError;
use crate::kurbo::Point;
use crate::peniko::color::{AlphaColor, PremulRgba8, Srgb};
use core::fmt;
use std::sync::{Arc, OnceLock};

/// How the source pixels are produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FetchType {
    /// A single color.
    Solid = 0,
    /// A two-stop linear gradient, padded at both ends.
    LinearGradient = 1,
}

/// How the source pixels are combined with the destination.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CompOp {
    /// Porter-Duff source over.
    #[default]
    SrcOver = 0,
    /// Replace the destination, weighted by coverage.
    SrcCopy = 1,
}

/// The pixel format of the destination.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PixelFormat {
    /// Premultiplied RGBA, 8 bits per channel.
    #[default]
    Prgb32 = 0,
}

/// Identifies one pixel pipeline.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature(u32);

impl Signature {
    const FETCH_MASK: u32 = 0xF;
    const COMP_SHIFT: u32 = 4;
    const COMP_MASK: u32 = 0xF << Self::COMP_SHIFT;
    const PENDING_BIT: u32 = 1 << 31;

    /// The signature of fetch data that hasn't been materialized yet.
    pub const PENDING: Self = Self(Self::PENDING_BIT);

    /// Create a signature from its parts.
    pub const fn new(fetch: FetchType, comp_op: CompOp) -> Self {
        Self(fetch as u32 | ((comp_op as u32) << Self::COMP_SHIFT))
    }

    /// The raw bits.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether this is the [pending](Self::PENDING) signature.
    pub const fn is_pending(self) -> bool {
        self.0 & Self::PENDING_BIT != 0
    }

    /// The fetch type, `None` if pending or unknown.
    pub fn fetch_type(self) -> Option<FetchType> {
        if self.is_pending() {
            return None;
        }

        match self.0 & Self::FETCH_MASK {
            0 => Some(FetchType::Solid),
            1 => Some(FetchType::LinearGradient),
            _ => None,
        }
    }

    /// The composition operator, `None` if pending or unknown.
    pub fn comp_op(self) -> Option<CompOp> {
        if self.is_pending() {
            return None;
        }

        match (self.0 & Self::COMP_MASK) >> Self::COMP_SHIFT {
            0 => Some(CompOp::SrcOver),
            1 => Some(CompOp::SrcCopy),
            _ => None,
        }
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_pending() {
            return f.write_str("Signature(Pending)");
        }

        match (self.fetch_type(), self.comp_op()) {
            (Some(fetch), Some(comp)) => write!(f, "Signature({fetch:?}, {comp:?})"),
            _ => write!(f, "Signature({:#x})", self.0),
        }
    }
}

/// A horizontal run of pixels `[x0, x1)` sharing one coverage value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span {
    /// First pixel, inclusive.
    pub x0: u32,
    /// Last pixel, exclusive.
    pub x1: u32,
    /// Coverage in `1..=255`.
    pub coverage: u8,
}

/// A pixel pipeline: fills `span` of the destination row `row` (which is row `y` of the
/// destination) using the parameters in `fetch`.
pub type FillSpanFn = fn(row: &mut [PremulRgba8], y: u32, span: Span, fetch: &FetchData);

/// Locates pixel pipelines by signature.
pub trait PipelineProvider: Send + Sync + fmt::Debug {
    /// Return the pipeline for `signature`, or `None` if there is none.
    fn lookup(&self, signature: Signature) -> Option<FillSpanFn>;
}

/// A two-stop linear gradient.
#[derive(Debug)]
pub struct LinearGradient {
    /// Start point, in device pixels.
    pub p0: Point,
    /// End point, in device pixels.
    pub p1: Point,
    /// Color at `p0` and before it.
    pub c0: AlphaColor<Srgb>,
    /// Color at `p1` and after it.
    pub c1: AlphaColor<Srgb>,
    lut: OnceLock<Box<[PremulRgba8; 256]>>,
}

impl LinearGradient {
    /// Create a new linear gradient.
    pub fn new(p0: Point, p1: Point, c0: AlphaColor<Srgb>, c1: AlphaColor<Srgb>) -> Self {
        Self {
            p0,
            p1,
            c0,
            c1,
            lut: OnceLock::new(),
        }
    }

    /// The color lookup table, `None` until the owning fetch data is materialized.
    pub fn lut(&self) -> Option<&[PremulRgba8; 256]> {
        self.lut.get().map(|lut| &**lut)
    }

    fn build_lut(&self) -> Box<[PremulRgba8; 256]> {
        let mut lut = Box::new([PremulRgba8::from_u32(0); 256]);
        let a = self.c0.components;
        let b = self.c1.components;

        for (i, entry) in lut.iter_mut().enumerate() {
            let t = i as f32 / 255.0;
            let mix = |k: usize| a[k] + (b[k] - a[k]) * t;
            *entry = AlphaColor::<Srgb>::new([mix(0), mix(1), mix(2), mix(3)])
                .premultiply()
                .to_rgba8();
        }

        lut
    }

    /// The lookup table index for the center of pixel `(x, y)`.
    #[inline]
    fn index_at(&self, x: u32, y: u32) -> usize {
        let d = self.p1 - self.p0;
        let len2 = d.hypot2();

        if len2 <= f64::EPSILON {
            return 255;
        }

        let p = Point::new(f64::from(x) + 0.5, f64::from(y) + 0.5) - self.p0;
        let t = (p.dot(d) / len2).clamp(0.0, 1.0);

        (t * 255.0).round() as usize
    }
}

/// Pipeline-specific parameters.
#[derive(Debug)]
pub enum FetchParams {
    /// A solid, premultiplied color.
    Solid(PremulRgba8),
    /// A linear gradient.
    LinearGradient(LinearGradient),
}

impl FetchParams {
    fn fetch_type(&self) -> FetchType {
        match self {
            Self::Solid(_) => FetchType::Solid,
            Self::LinearGradient(_) => FetchType::LinearGradient,
        }
    }
}

/// The header shared by all fetch data.
#[derive(Debug)]
pub struct FetchHeader {
    signature: OnceLock<Signature>,
    comp_op: CompOp,
    batch_id: u64,
    format: PixelFormat,
}

impl FetchHeader {
    /// The resolved signature, [`Signature::PENDING`] until materialized.
    pub fn signature(&self) -> Signature {
        self.signature.get().copied().unwrap_or(Signature::PENDING)
    }

    /// The batch this fetch data was created for.
    pub fn batch_id(&self) -> u64 {
        self.batch_id
    }

    /// The destination pixel format.
    pub fn format(&self) -> PixelFormat {
        self.format
    }
}

/// The parameters a pixel pipeline reads, shared by reference counting between the commands
/// (and workers) that use them.
#[derive(Debug)]
pub struct FetchData {
    /// The header.
    pub header: FetchHeader,
    /// The parameters.
    pub params: FetchParams,
}

impl FetchData {
    /// Create fetch data whose signature is resolved right away.
    ///
    /// Solid colors are cheap to materialize, so this is what they use.
    pub fn new(params: FetchParams, comp_op: CompOp, batch_id: u64) -> Arc<Self> {
        let data = Self::pending(params, comp_op, batch_id);
        data.materialize();
        data
    }

    /// Create fetch data whose (potentially expensive) resolution is deferred until it is first
    /// used by a job or a command.
    pub fn pending(params: FetchParams, comp_op: CompOp, batch_id: u64) -> Arc<Self> {
        Arc::new(Self {
            header: FetchHeader {
                signature: OnceLock::new(),
                comp_op,
                batch_id,
                format: PixelFormat::Prgb32,
            },
            params,
        })
    }

    /// Whether the fetch data still has to be [materialized](Self::materialize).
    pub fn is_pending(&self) -> bool {
        self.header.signature.get().is_none()
    }

    /// Resolve the signature and compute derived parameters such as gradient tables.
    ///
    /// When several threads race, exactly one of them performs the computation and all of them
    /// observe the same result. Calling this on materialized data just returns the signature.
    pub fn materialize(&self) -> Signature {
        *self.header.signature.get_or_init(|| {
            if let FetchParams::LinearGradient(gradient) = &self.params {
                gradient.lut.get_or_init(|| gradient.build_lut());
            }

            Signature::new(self.params.fetch_type(), self.header.comp_op)
        })
    }
}

/// Number of entries of a [`PipelineCache`].
pub const PIPELINE_CACHE_SIZE: usize = 16;

/// A small per-worker cache in front of a [`PipelineProvider`].
///
/// Entries are evicted round-robin.
#[derive(Debug)]
pub struct PipelineCache {
    entries: [Option<(Signature, FillSpanFn)>; PIPELINE_CACHE_SIZE],
    next: usize,
    misses: u64,
}

impl Default for PipelineCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            entries: [None; PIPELINE_CACHE_SIZE],
            next: 0,
            misses: 0,
        }
    }

    /// Find the pipeline for `signature`, asking `provider` on a miss.
    pub fn lookup(
        &mut self,
        signature: Signature,
        provider: &dyn PipelineProvider,
    ) -> Result<FillSpanFn, RasterError> {
        for (sig, func) in self.entries.iter().flatten() {
            if *sig == signature {
                return Ok(*func);
            }
        }

        self.misses += 1;
        let func = provider
            .lookup(signature)
            .ok_or(RasterError::PipelineNotFound(signature))?;

        self.entries[self.next] = Some((signature, func));
        self.next = (self.next + 1) % PIPELINE_CACHE_SIZE;

        Ok(func)
    }

    /// How many lookups had to go to the provider.
    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Drop all entries.
    pub fn clear(&mut self) {
        self.entries = [None; PIPELINE_CACHE_SIZE];
        self.next = 0;
    }
}

/// Portable scalar pipelines for every signature in this crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReferencePipelines;

impl PipelineProvider for ReferencePipelines {
    fn lookup(&self, signature: Signature) -> Option<FillSpanFn> {
        let func: FillSpanFn = match (signature.fetch_type()?, signature.comp_op()?) {
            (FetchType::Solid, CompOp::SrcOver) => fill_solid::<SrcOver>,
            (FetchType::Solid, CompOp::SrcCopy) => fill_solid::<SrcCopy>,
            (FetchType::LinearGradient, CompOp::SrcOver) => fill_linear::<SrcOver>,
            (FetchType::LinearGradient, CompOp::SrcCopy) => fill_linear::<SrcCopy>,
        };

        Some(func)
    }
}

/// `round(v / 255)` for `v <= 255 * 255`.
#[inline(always)]
fn div_255(v: u32) -> u32 {
    let v = v + 128;
    (v + (v >> 8)) >> 8
}

#[inline(always)]
fn scale(p: PremulRgba8, s: u32) -> [u32; 4] {
    [p.r, p.g, p.b, p.a].map(|c| div_255(u32::from(c) * s))
}

trait Compose {
    fn compose(dst: PremulRgba8, src: PremulRgba8, coverage: u32) -> PremulRgba8;
}

struct SrcOver;
struct SrcCopy;

impl Compose for SrcOver {
    #[inline(always)]
    fn compose(dst: PremulRgba8, src: PremulRgba8, coverage: u32) -> PremulRgba8 {
        let s = scale(src, coverage);
        let d = scale(dst, 255 - s[3]);

        pack([s[0] + d[0], s[1] + d[1], s[2] + d[2], s[3] + d[3]])
    }
}

impl Compose for SrcCopy {
    #[inline(always)]
    fn compose(dst: PremulRgba8, src: PremulRgba8, coverage: u32) -> PremulRgba8 {
        let s = scale(src, coverage);
        let d = scale(dst, 255 - coverage);

        pack([s[0] + d[0], s[1] + d[1], s[2] + d[2], s[3] + d[3]])
    }
}

#[inline(always)]
fn pack(c: [u32; 4]) -> PremulRgba8 {
    let [r, g, b, a] = c.map(|v| v.min(255) as u8);
    PremulRgba8 { r, g, b, a }
}

fn fill_solid<C: Compose>(row: &mut [PremulRgba8], _y: u32, span: Span, fetch: &FetchData) {
    let FetchParams::Solid(src) = fetch.params else {
        return;
    };
    let coverage = u32::from(span.coverage);

    for dst in &mut row[span.x0 as usize..span.x1 as usize] {
        *dst = C::compose(*dst, src, coverage);
    }
}

fn fill_linear<C: Compose>(row: &mut [PremulRgba8], y: u32, span: Span, fetch: &FetchData) {
    let FetchParams::LinearGradient(gradient) = &fetch.params else {
        return;
    };
    let Some(lut) = gradient.lut() else {
        return;
    };
    let coverage = u32::from(span.coverage);

    for x in span.x0..span.x1 {
        let dst = &mut row[x as usize];
        *dst = C::compose(*dst, lut[gradient.index_at(x, y)], coverage);
    }
}
