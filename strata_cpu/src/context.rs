// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The drawing front end.

use crate::batch::RenderBatch;
use crate::command::{BandSink, RenderCommand};
use crate::glyph::GlyphRun;
use crate::job::{Geometry, JobKind, RenderJob, SharedFillState, SharedStrokeState};
use crate::paint::Paint;
use crate::region::BandRegion;
use crate::settings::RenderSettings;
use crate::sync::WorkerStats;
use crate::work_data::{WorkData, WorkDataParams};
use crate::worker::{WorkDataSlots, WorkerManager};
use log::{debug, warn};
use std::cell::RefCell;
use std::sync::Arc;
use strata_common::error::{ErrorFlags, RasterError};
use strata_common::fixed::{BoxI, FIXED_MASK, FIXED_SCALE, FIXED_SHIFT, pixels_to_fixed};
use strata_common::kurbo::{Affine, BezPath, Cap, Join, Rect, Shape, Stroke};
use strata_common::peniko::Fill;
use strata_common::pipeline::{CompOp, FetchData, PipelineProvider};
use strata_common::pixmap::Pixmap;
use thiserror::Error;

/// Tolerance used when converting rectangles to paths. Rectangles have no curves, so any value
/// works.
const RECT_TOLERANCE: f64 = 0.1;

/// Rendering finished, but some draw calls were dropped or drawn incompletely.
///
/// The pixmap is still valid: every band holds the result of the commands that did succeed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("rendering completed with degraded results: {flags:?}")]
pub struct DegradedRender {
    /// What went wrong.
    pub flags: ErrorFlags,
}

/// A render context.
///
/// With [`RenderSettings::num_threads`] set to `0`, every draw call is rasterized into the
/// pixmap right away. Otherwise draw calls are recorded into a batch, which is rendered by
/// the worker threads and the calling thread together on [`flush`](Self::flush), or when the
/// batch is full.
#[derive(Debug)]
pub struct RasterContext {
    pixmap: Pixmap,
    settings: RenderSettings,
    params: WorkDataParams,
    transform: Affine,
    fill_rule: Fill,
    paint: Paint,
    comp_op: CompOp,
    alpha: u8,
    stroke: Stroke,
    /// In fixed point.
    clip_box: BoxI,
    fill_state: Option<Arc<SharedFillState>>,
    stroke_state: Option<Arc<SharedStrokeState>>,
    fetch: Option<Arc<FetchData>>,
    batch: RenderBatch,
    workers: Option<WorkerManager>,
    work_data: WorkDataSlots,
    degraded: ErrorFlags,
}

impl RasterContext {
    /// Create a new single-threaded render context with the given width and height in pixels.
    pub fn new(width: u16, height: u16) -> Self {
        Self::new_with(width, height, RenderSettings::default())
    }

    /// Create a new render context with custom settings.
    pub fn new_with(width: u16, height: u16, settings: RenderSettings) -> Self {
        let band_height = settings.effective_band_height(width, height);
        let params = WorkDataParams {
            width,
            height,
            band_height,
            arena_limit: settings.arena_limit,
        };
        let workers = if settings.num_threads > 0 {
            WorkerManager::new(settings.num_threads, settings.sync_backend)
        } else {
            None
        };

        debug!(
            "created a {width}x{height} render context with bands of {band_height} rows, {}",
            if workers.is_some() {
                "rendering asynchronously"
            } else {
                "rendering synchronously"
            }
        );

        let stroke = Stroke {
            width: 1.0,
            join: Join::Bevel,
            start_cap: Cap::Butt,
            end_cap: Cap::Butt,
            ..Default::default()
        };

        Self {
            pixmap: Pixmap::new(width, height),
            settings,
            params,
            transform: Affine::IDENTITY,
            fill_rule: Fill::NonZero,
            paint: Paint::default(),
            comp_op: CompOp::SrcOver,
            alpha: 255,
            stroke,
            clip_box: BoxI::new(0, 0, i32::from(width), i32::from(height)).to_fixed(),
            fill_state: None,
            stroke_state: None,
            fetch: None,
            batch: RenderBatch::new(0),
            workers,
            work_data: WorkDataSlots::new(),
            degraded: ErrorFlags::NONE,
        }
    }

    /// The width of the destination in pixels.
    pub fn width(&self) -> u16 {
        self.params.width
    }

    /// The height of the destination in pixels.
    pub fn height(&self) -> u16 {
        self.params.height
    }

    /// The height of a band in pixels.
    pub fn band_height(&self) -> u32 {
        self.params.band_height
    }

    /// Whether draw calls are rendered by worker threads.
    pub fn is_multithreaded(&self) -> bool {
        self.workers.is_some()
    }

    /// Set the current transform.
    pub fn set_transform(&mut self, transform: Affine) {
        self.transform = transform;
        self.fill_state = None;
        self.stroke_state = None;
        // Gradients are mapped to device space with the transform.
        self.fetch = None;
    }

    /// Reset the current transform.
    pub fn reset_transform(&mut self) {
        self.set_transform(Affine::IDENTITY);
    }

    /// The current transform.
    pub fn transform(&self) -> Affine {
        self.transform
    }

    /// Set the fill rule of [`fill_path`](Self::fill_path) and [`fill_rect`](Self::fill_rect).
    pub fn set_fill_rule(&mut self, fill_rule: Fill) {
        self.fill_rule = fill_rule;
    }

    /// Set the current paint.
    pub fn set_paint(&mut self, paint: impl Into<Paint>) {
        self.paint = paint.into();
        self.fetch = None;
    }

    /// Set how drawn pixels are combined with the destination.
    pub fn set_comp_op(&mut self, comp_op: CompOp) {
        self.comp_op = comp_op;
        self.fetch = None;
    }

    /// Set the global opacity, in `0.0..=1.0`.
    pub fn set_alpha(&mut self, alpha: f32) {
        self.alpha = (alpha.clamp(0.0, 1.0) * 255.0).round() as u8;
    }

    /// Set the current stroke.
    pub fn set_stroke(&mut self, stroke: Stroke) {
        self.stroke = stroke;
        self.stroke_state = None;
    }

    /// Restrict drawing to `rect`, in device pixels.
    pub fn set_clip_box(&mut self, rect: Rect) {
        let (w, h) = (f64::from(self.params.width), f64::from(self.params.height));
        let r = rect.abs();

        if ![r.x0, r.y0, r.x1, r.y1].iter().all(|v| v.is_finite()) {
            warn!("Ignoring a clip box with NaN or infinite coordinates.");
            return;
        }

        self.clip_box = BoxI::new(
            pixels_to_fixed(r.x0.clamp(0.0, w)),
            pixels_to_fixed(r.y0.clamp(0.0, h)),
            pixels_to_fixed(r.x1.clamp(0.0, w)),
            pixels_to_fixed(r.y1.clamp(0.0, h)),
        );
        self.fill_state = None;
    }

    /// Remove the clip box.
    pub fn reset_clip_box(&mut self) {
        self.set_clip_box(Rect::new(
            0.0,
            0.0,
            f64::from(self.params.width),
            f64::from(self.params.height),
        ));
    }

    /// Fill a path.
    pub fn fill_path(&mut self, path: &BezPath) {
        let fill_rule = self.fill_rule;

        if self.workers.is_some() {
            self.enqueue(fill_rule, JobKind::FillGeometry(path.clone()));
        } else {
            self.render_now(Geometry::Fill(path), fill_rule);
        }
    }

    /// Stroke a path.
    pub fn stroke_path(&mut self, path: &BezPath) {
        let stroke = self.stroke_state();

        if self.workers.is_some() {
            self.enqueue(Fill::NonZero, JobKind::StrokeGeometry(path.clone(), stroke));
        } else {
            self.render_now(Geometry::Stroke(path, &stroke), Fill::NonZero);
        }
    }

    /// Fill a rectangle.
    ///
    /// Rectangles that land on whole device pixels are drawn without building edges.
    pub fn fill_rect(&mut self, rect: &Rect) {
        if self.skip_drawing() {
            return;
        }

        if let Some(pixels) = self.aligned_box(rect) {
            if !pixels.is_empty() {
                let command = RenderCommand::fill_box(self.alpha, self.fetch_data(), pixels);
                self.submit(command);
            }
            return;
        }

        let path = rect.to_path(RECT_TOLERANCE);
        if self.workers.is_none() {
            self.render_now(Geometry::Fill(&path), self.fill_rule);
            return;
        }

        // Too cheap to be worth a job: build the edges right here.
        let fill_state = self.fill_state();
        let Some(mut wd) = take_local(&self.work_data, self.params, &mut self.degraded) else {
            return;
        };

        let edges = match Geometry::Fill(&path).build_edges(&mut wd, &fill_state) {
            Ok(()) => wd.edge_storage.take_edge_set(),
            Err(e) => {
                warn!("Dropping a rectangle: {e}.");
                wd.edge_storage.clear();
                wd.record(e);
                return;
            }
        };
        drop(wd);

        let command =
            RenderCommand::fill_edges(self.alpha, self.fetch_data(), self.fill_rule, edges);
        self.submit(command);
    }

    /// Fill a run of glyphs.
    pub fn fill_glyph_run(&mut self, run: &GlyphRun) {
        if self.workers.is_some() {
            self.enqueue(Fill::NonZero, JobKind::FillText(run.clone()));
        } else {
            self.render_now(Geometry::FillText(run), Fill::NonZero);
        }
    }

    /// Stroke the outlines of a run of glyphs.
    pub fn stroke_glyph_run(&mut self, run: &GlyphRun) {
        let stroke = self.stroke_state();

        if self.workers.is_some() {
            self.enqueue(Fill::NonZero, JobKind::StrokeText(run.clone(), stroke));
        } else {
            self.render_now(Geometry::StrokeText(run, &stroke), Fill::NonZero);
        }
    }

    /// Render everything recorded so far into the pixmap.
    ///
    /// Returns [`DegradedRender`] if any draw call since the last flush had to be dropped. The
    /// pixmap is complete apart from those draw calls.
    pub fn flush(&mut self) -> Result<(), DegradedRender> {
        self.run_batch();

        let mut flags = core::mem::take(&mut self.degraded);
        for slot in self.work_data.iter_mut() {
            flags |= slot.get_mut().take_error_flags();
        }

        if flags.is_empty() {
            Ok(())
        } else {
            warn!("Rendering completed with degraded results: {flags:?}.");
            Err(DegradedRender { flags })
        }
    }

    /// Drop everything that wasn't flushed yet and clear the pixmap.
    pub fn reset(&mut self) {
        let next = self.batch.batch_id() + 1;
        self.batch.reset(next);
        self.fetch = None;
        self.degraded = ErrorFlags::NONE;
        for slot in self.work_data.iter_mut() {
            let wd = slot.get_mut();
            wd.edge_storage.clear();
            wd.error_flags = ErrorFlags::NONE;
        }
        self.pixmap.fill(strata_common::color::PremulRgba8::from_u32(0));
    }

    /// The destination. Draw calls that weren't [flushed](Self::flush) yet are missing.
    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    /// Flush and return the destination.
    pub fn into_pixmap(mut self) -> Pixmap {
        // The pixmap is valid even if rendering was degraded, and `flush` already logged it.
        let _ = self.flush();
        self.pixmap
    }

    /// Statistics of the worker threads, all zero when rendering synchronously.
    pub fn worker_stats(&self) -> WorkerStats {
        self.workers
            .as_ref()
            .map(WorkerManager::stats)
            .unwrap_or_default()
    }

    fn skip_drawing(&self) -> bool {
        self.clip_box.is_empty() || self.alpha == 0
    }

    fn fill_state(&mut self) -> Arc<SharedFillState> {
        self.fill_state
            .get_or_insert_with(|| {
                Arc::new(SharedFillState {
                    clip_box: self.clip_box,
                    transform: Affine::scale(f64::from(FIXED_SCALE)) * self.transform,
                    tolerance: self.settings.tolerance * f64::from(FIXED_SCALE),
                })
            })
            .clone()
    }

    fn stroke_state(&mut self) -> Arc<SharedStrokeState> {
        self.stroke_state
            .get_or_insert_with(|| {
                // Strokes are expanded in user space.
                let scale = self.transform.determinant().abs().sqrt();
                let tolerance = if scale > f64::EPSILON {
                    self.settings.tolerance / scale
                } else {
                    self.settings.tolerance
                };

                Arc::new(SharedStrokeState {
                    stroke: self.stroke.clone(),
                    tolerance,
                })
            })
            .clone()
    }

    fn fetch_data(&mut self) -> Arc<FetchData> {
        self.fetch
            .get_or_insert_with(|| {
                self.paint
                    .to_fetch_data(self.transform, self.comp_op, self.batch.batch_id())
            })
            .clone()
    }

    /// The pixel-aligned box `rect` covers in device space, clipped. `None` if `rect` isn't
    /// pixel aligned after transformation or the clip box isn't.
    fn aligned_box(&self, rect: &Rect) -> Option<BoxI> {
        let [a, b, c, d, _, _] = self.transform.as_coeffs();
        if b != 0.0 || c != 0.0 || a == 0.0 || d == 0.0 {
            return None;
        }

        let clip = self.clip_box;
        if (clip.x0 | clip.y0 | clip.x1 | clip.y1) & FIXED_MASK != 0 {
            return None;
        }

        let r = self.transform.transform_rect_bbox(*rect);
        if ![r.x0, r.y0, r.x1, r.y1]
            .iter()
            .all(|v| v.is_finite() && v.fract() == 0.0)
        {
            return None;
        }

        let pixels = BoxI::new(
            clip.x0 >> FIXED_SHIFT,
            clip.y0 >> FIXED_SHIFT,
            clip.x1 >> FIXED_SHIFT,
            clip.y1 >> FIXED_SHIFT,
        );
        let clamp = |v: f64, min: i32, max: i32| v.clamp(f64::from(min), f64::from(max)) as i32;

        Some(BoxI::new(
            clamp(r.x0, pixels.x0, pixels.x1),
            clamp(r.y0, pixels.y0, pixels.y1),
            clamp(r.x1, pixels.x0, pixels.x1),
            clamp(r.y1, pixels.y0, pixels.y1),
        ))
    }

    /// Record a command that needs no job.
    fn submit(&mut self, command: RenderCommand) {
        if self.workers.is_some() {
            self.flush_if_full();
            self.batch.push_command(command);
            return;
        }

        let provider = Arc::clone(&self.settings.pipeline_provider);
        let width = self.params.width;
        let Some(mut wd) = take_local(&self.work_data, self.params, &mut self.degraded) else {
            return;
        };

        let mut region = BandRegion::whole(self.pixmap.data_mut(), width);
        if let Err(e) = command.run(&mut region, &mut wd, &*provider) {
            warn!("Dropping a draw call: {e}.");
            wd.record(e);
        }
    }

    /// Record a command together with the job producing its edges.
    fn enqueue(&mut self, fill_rule: Fill, kind: JobKind) {
        if self.skip_drawing() {
            return;
        }
        self.flush_if_full();

        let fetch = self.fetch_data();
        let fill_state = self.fill_state();
        let compute_pending_fetch = fetch.is_pending();

        let idx = self
            .batch
            .push_command(RenderCommand::fill_analytic(self.alpha, fetch, fill_rule));
        let job = if kind.is_stroke() {
            RenderJob::init_stroke_job(idx, compute_pending_fetch, fill_state, kind)
        } else {
            RenderJob::init_fill_job(idx, compute_pending_fetch, fill_state, kind)
        };
        self.batch.push_job(job);
    }

    /// Build and rasterize on the calling thread.
    fn render_now(&mut self, geometry: Geometry<'_>, fill_rule: Fill) {
        if self.skip_drawing() {
            return;
        }

        let fill_state = self.fill_state();
        let fetch = self.fetch_data();
        let provider = Arc::clone(&self.settings.pipeline_provider);
        let alpha = self.alpha;
        let Some(mut wd) = take_local(&self.work_data, self.params, &mut self.degraded) else {
            return;
        };

        let result = geometry.build_edges(&mut wd, &fill_state).and_then(|()| {
            rasterize_now(
                &mut wd,
                &mut self.pixmap,
                SpanSource {
                    fill_rule,
                    alpha,
                    fetch: &fetch,
                    provider: &*provider,
                },
            )
        });

        if let Err(e) = result {
            warn!("Dropping a draw call: {e}.");
            wd.edge_storage.clear();
            wd.record(e);
        }
    }

    fn flush_if_full(&mut self) {
        if self.batch.command_count() >= self.settings.command_queue_limit {
            debug!("command queue is full, flushing");
            self.run_batch();
        }
    }

    fn run_batch(&mut self) {
        let Some(workers) = self.workers.as_mut() else {
            return;
        };
        if self.batch.is_empty() {
            return;
        }

        self.degraded |= workers.run(
            &self.batch,
            &mut self.pixmap,
            &self.work_data,
            self.params,
            &*self.settings.pipeline_provider,
        );

        let next = self.batch.batch_id() + 1;
        self.batch.reset(next);
        self.fetch = None;
    }
}

/// The scratch state of the calling thread, `None` (and recorded in `degraded`) if it can't be
/// created.
fn take_local<'w>(
    slots: &'w WorkDataSlots,
    params: WorkDataParams,
    degraded: &mut ErrorFlags,
) -> Option<std::cell::RefMut<'w, WorkData>> {
    match slots.get_or_try(|| WorkData::new(&params).map(RefCell::new)) {
        Ok(slot) => Some(slot.borrow_mut()),
        Err(e) => {
            warn!("Failed to create scratch state, dropping the draw call: {e}.");
            *degraded |= e.into();
            None
        }
    }
}

/// Where the spans of a synchronous draw call go.
struct SpanSource<'a> {
    fill_rule: Fill,
    alpha: u8,
    fetch: &'a FetchData,
    provider: &'a dyn PipelineProvider,
}

/// Rasterize the edges in the storage of `wd` straight into `pixmap`, walking all bands with
/// one active edge list.
fn rasterize_now(
    wd: &mut WorkData,
    pixmap: &mut Pixmap,
    source: SpanSource<'_>,
) -> Result<(), RasterError> {
    let Some(bands) = wd.edge_storage.band_range() else {
        return Ok(());
    };

    let func = wd.pipelines.lookup(source.fetch.materialize(), source.provider)?;
    let list = wd.edge_storage.flatten_edge_links();
    let width = pixmap.width();
    let mut region = BandRegion::whole(pixmap.data_mut(), width);
    let mut sink = BandSink {
        region: &mut region,
        func,
        fetch: source.fetch,
    };

    let result = wd.rasterizer.rasterize_list(
        wd.edge_storage.list_edges(list),
        bands,
        source.fill_rule,
        source.alpha,
        &mut sink,
    );
    wd.edge_storage.clear();

    result
}
