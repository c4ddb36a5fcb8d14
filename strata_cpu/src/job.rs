// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Jobs: geometry preparation that runs on any worker.
//!
//! A job is bound to the slot of the command it produces edges for when it is created, so the
//! order in which jobs execute never changes the order in which commands are painted.

use crate::command::RenderCommand;
use crate::glyph::GlyphRun;
use crate::work_data::WorkData;
use log::warn;
use std::sync::Arc;
use strata_common::edge_builder::EdgeBuilder;
use strata_common::error::RasterError;
use strata_common::fixed::BoxI;
use strata_common::flatten::expand_stroke;
use strata_common::kurbo::{Affine, BezPath, Stroke};

/// Clip and transform state shared by all jobs issued with it.
#[derive(Debug)]
pub(crate) struct SharedFillState {
    /// The clip box, in fixed point.
    pub(crate) clip_box: BoxI,
    /// The user transform, pre-scaled to fixed point.
    pub(crate) transform: Affine,
    /// The flattening tolerance, in fixed-point units.
    pub(crate) tolerance: f64,
}

/// Stroke state shared by all stroke jobs issued with it.
#[derive(Debug)]
pub(crate) struct SharedStrokeState {
    pub(crate) stroke: Stroke,
    /// The tolerance of stroke expansion, in user space.
    pub(crate) tolerance: f64,
}

/// Geometry borrowed from a job, or from the caller on the synchronous path.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Geometry<'a> {
    Fill(&'a BezPath),
    Stroke(&'a BezPath, &'a SharedStrokeState),
    FillText(&'a GlyphRun),
    StrokeText(&'a GlyphRun, &'a SharedStrokeState),
}

impl Geometry<'_> {
    /// Build the edges of the geometry into the edge storage of `wd`.
    ///
    /// On error the storage is left with a partial result.
    pub(crate) fn build_edges(
        self,
        wd: &mut WorkData,
        fill: &SharedFillState,
    ) -> Result<(), RasterError> {
        let mut builder = EdgeBuilder::new(&mut wd.edge_storage, fill.clip_box, fill.tolerance);

        match self {
            Self::Fill(path) => builder.add_path(path.elements(), fill.transform),
            Self::Stroke(path, stroke) => {
                let outline = expand_stroke(path.iter(), &stroke.stroke, stroke.tolerance);
                builder.add_path(outline.elements(), fill.transform)
            }
            Self::FillText(run) | Self::StrokeText(run, _) => {
                let stroke = match self {
                    Self::StrokeText(_, stroke) => Some(stroke),
                    _ => None,
                };

                for glyph in &run.glyphs {
                    wd.tmp_path.truncate(0);
                    if !run.font.outline(glyph.id, &mut wd.tmp_path) {
                        continue;
                    }

                    let transform = fill.transform * Affine::translate((glyph.x, glyph.y));
                    match stroke {
                        Some(stroke) => {
                            let outline =
                                expand_stroke(wd.tmp_path.iter(), &stroke.stroke, stroke.tolerance);
                            builder.add_path(outline.elements(), transform)?;
                        }
                        None => builder.add_path(wd.tmp_path.elements(), transform)?,
                    }
                }

                Ok(())
            }
        }
    }
}

#[derive(Debug)]
pub(crate) enum JobKind {
    FillGeometry(BezPath),
    StrokeGeometry(BezPath, Arc<SharedStrokeState>),
    FillText(GlyphRun),
    StrokeText(GlyphRun, Arc<SharedStrokeState>),
}

impl JobKind {
    pub(crate) fn is_stroke(&self) -> bool {
        matches!(self, Self::StrokeGeometry(..) | Self::StrokeText(..))
    }
}

/// Deferred geometry preparation for one command.
#[derive(Debug)]
pub(crate) struct RenderJob {
    command_idx: usize,
    compute_pending_fetch: bool,
    fill_state: Arc<SharedFillState>,
    kind: JobKind,
}

impl RenderJob {
    /// A fill job producing the edges of the command at `command_idx`.
    pub(crate) fn init_fill_job(
        command_idx: usize,
        compute_pending_fetch: bool,
        fill_state: Arc<SharedFillState>,
        kind: JobKind,
    ) -> Self {
        debug_assert!(!kind.is_stroke());

        Self {
            command_idx,
            compute_pending_fetch,
            fill_state,
            kind,
        }
    }

    /// A stroke job producing the edges of the command at `command_idx`.
    pub(crate) fn init_stroke_job(
        command_idx: usize,
        compute_pending_fetch: bool,
        fill_state: Arc<SharedFillState>,
        kind: JobKind,
    ) -> Self {
        debug_assert!(kind.is_stroke());

        Self {
            command_idx,
            compute_pending_fetch,
            fill_state,
            kind,
        }
    }

    pub(crate) fn command_idx(&self) -> usize {
        self.command_idx
    }

    fn geometry(&self) -> Geometry<'_> {
        match &self.kind {
            JobKind::FillGeometry(path) => Geometry::Fill(path),
            JobKind::StrokeGeometry(path, stroke) => Geometry::Stroke(path, stroke),
            JobKind::FillText(run) => Geometry::FillText(run),
            JobKind::StrokeText(run, stroke) => Geometry::StrokeText(run, stroke),
        }
    }

    /// Run the job with the scratch state of the calling thread and install the result in its
    /// command slot.
    ///
    /// A job that fails, or whose geometry produces no edges, marks its command as skipped.
    pub(crate) fn run(&self, wd: &mut WorkData, commands: &[RenderCommand]) {
        let Some(command) = commands.get(self.command_idx) else {
            wd.record(RasterError::invariant("job refers to a missing command"));
            return;
        };

        if self.compute_pending_fetch {
            command.fetch().materialize();
        }

        let edges = match self.geometry().build_edges(wd, &self.fill_state) {
            Ok(()) => Some(wd.edge_storage.take_edge_set()).filter(|edges| !edges.is_empty()),
            Err(e) => {
                warn!("Dropping the geometry of command {}: {e}.", self.command_idx);
                wd.edge_storage.clear();
                wd.record(e);
                None
            }
        };

        if let Err(e) = command.install_edges(edges) {
            wd.record(e);
        }
    }
}
