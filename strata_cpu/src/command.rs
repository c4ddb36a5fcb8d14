// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Commands: rasterization of one draw call into the bands a worker owns.

use crate::region::BandRegion;
use crate::work_data::WorkData;
use std::sync::{Arc, OnceLock};
use strata_common::edge::EdgeSet;
use strata_common::error::RasterError;
use strata_common::fixed::BoxI;
use strata_common::peniko::Fill;
use strata_common::pipeline::{FetchData, FillSpanFn, PipelineProvider, Signature, Span};
use strata_common::rasterizer::SpanSink;

/// Writes the spans of the rasterizer through a pixel pipeline.
pub(crate) struct BandSink<'r, 'a> {
    pub(crate) region: &'r mut BandRegion<'a>,
    pub(crate) func: FillSpanFn,
    pub(crate) fetch: &'r FetchData,
}

impl SpanSink for BandSink<'_, '_> {
    #[inline]
    fn span(&mut self, y: u32, span: Span) {
        (self.func)(self.region.row_mut(y), y, span, self.fetch);
    }
}

#[derive(Debug)]
pub(crate) enum CommandGeometry {
    /// A box in whole pixels, fully covered.
    FillBox(BoxI),
    /// Edges installed by a job (or right away), `None` if there is nothing to draw.
    FillAnalytic {
        fill_rule: Fill,
        edges: OnceLock<Option<EdgeSet>>,
    },
}

/// One draw call, ready to be rasterized.
#[derive(Debug)]
pub(crate) struct RenderCommand {
    alpha: u8,
    /// The signature at issue time, [`Signature::PENDING`] if the fetch data still has to be
    /// materialized.
    signature: Signature,
    fetch: Arc<FetchData>,
    geometry: CommandGeometry,
}

impl RenderCommand {
    pub(crate) fn fill_box(alpha: u8, fetch: Arc<FetchData>, pixels: BoxI) -> Self {
        Self {
            alpha,
            signature: fetch.header.signature(),
            fetch,
            geometry: CommandGeometry::FillBox(pixels),
        }
    }

    /// A command whose edges are installed later by a job.
    pub(crate) fn fill_analytic(alpha: u8, fetch: Arc<FetchData>, fill_rule: Fill) -> Self {
        Self {
            alpha,
            signature: fetch.header.signature(),
            fetch,
            geometry: CommandGeometry::FillAnalytic {
                fill_rule,
                edges: OnceLock::new(),
            },
        }
    }

    /// A command whose edges were already built on the calling thread.
    pub(crate) fn fill_edges(
        alpha: u8,
        fetch: Arc<FetchData>,
        fill_rule: Fill,
        edges: EdgeSet,
    ) -> Self {
        let command = Self::fill_analytic(alpha, fetch, fill_rule);
        if let CommandGeometry::FillAnalytic { edges: slot, .. } = &command.geometry {
            let _ = slot.set((!edges.is_empty()).then_some(edges));
        }
        command
    }

    pub(crate) fn fetch(&self) -> &FetchData {
        &self.fetch
    }

    /// The installed edges: `None` while no job has run, `Some(None)` if skipped.
    #[cfg(test)]
    pub(crate) fn edges(&self) -> Option<Option<&EdgeSet>> {
        match &self.geometry {
            CommandGeometry::FillAnalytic { edges, .. } => edges.get().map(Option::as_ref),
            CommandGeometry::FillBox(_) => None,
        }
    }

    /// Fill the command's slot with the result of its job.
    pub(crate) fn install_edges(&self, result: Option<EdgeSet>) -> Result<(), RasterError> {
        match &self.geometry {
            CommandGeometry::FillAnalytic { edges, .. } => edges
                .set(result)
                .map_err(|_| RasterError::invariant("command slot filled twice")),
            CommandGeometry::FillBox(_) => {
                Err(RasterError::invariant("job bound to a box command"))
            }
        }
    }

    /// Rasterize the command into `region`, using the scratch state of the calling thread.
    pub(crate) fn run(
        &self,
        region: &mut BandRegion<'_>,
        wd: &mut WorkData,
        provider: &dyn PipelineProvider,
    ) -> Result<(), RasterError> {
        if self.alpha == 0 {
            return Ok(());
        }

        match &self.geometry {
            CommandGeometry::FillBox(b) => {
                let y0 = b.y0.max(region.y0 as i32);
                let y1 = b.y1.min(region.y1() as i32);
                if y0 >= y1 || b.x0 >= b.x1 {
                    return Ok(());
                }

                let func = self.pipeline(wd, provider)?;
                let span = Span {
                    x0: b.x0 as u32,
                    x1: b.x1 as u32,
                    coverage: self.alpha,
                };
                for y in y0 as u32..y1 as u32 {
                    func(region.row_mut(y), y, span, &self.fetch);
                }
            }
            CommandGeometry::FillAnalytic { fill_rule, edges } => {
                let Some(Some(edges)) = edges.get() else {
                    return Ok(());
                };
                if !edges
                    .band_range()
                    .is_some_and(|bands| bands.contains(&region.band))
                {
                    return Ok(());
                }

                let band = region.band;
                let func = self.pipeline(wd, provider)?;
                let mut sink = BandSink {
                    region,
                    func,
                    fetch: &self.fetch,
                };
                wd.rasterizer.rasterize_band(
                    band,
                    edges.band_edges(band),
                    *fill_rule,
                    self.alpha,
                    &mut sink,
                )?;
            }
        }

        Ok(())
    }

    fn pipeline(
        &self,
        wd: &mut WorkData,
        provider: &dyn PipelineProvider,
    ) -> Result<FillSpanFn, RasterError> {
        let signature = if self.signature.is_pending() {
            self.fetch.materialize()
        } else {
            self.signature
        };

        wd.pipelines.lookup(signature, provider)
    }
}

#[cfg(test)]
mod tests {
    use super::RenderCommand;
    use crate::region::BandRegions;
    use crate::work_data::{WorkData, WorkDataParams};
    use strata_common::color::PremulRgba8;
    use strata_common::color::palette::css::{BLUE, RED};
    use strata_common::edge::EdgeStorage;
    use strata_common::fixed::{BoxI, EdgePoint};
    use strata_common::peniko::Fill;
    use strata_common::pipeline::{
        CompOp, FetchData, FetchParams, LinearGradient, ReferencePipelines,
    };
    use strata_common::kurbo::Point;

    const RED_PX: PremulRgba8 = PremulRgba8 {
        r: 255,
        g: 0,
        b: 0,
        a: 255,
    };

    fn work_data() -> WorkData {
        WorkData::new(&WorkDataParams {
            width: 8,
            height: 8,
            band_height: 4,
            arena_limit: None,
        })
        .unwrap()
    }

    fn red() -> std::sync::Arc<FetchData> {
        FetchData::new(FetchParams::Solid(RED_PX), CompOp::SrcOver, 0)
    }

    #[test]
    fn box_is_clipped_to_the_band() {
        let mut buf = vec![PremulRgba8::from_u32(0); 8 * 8];
        let mut wd = work_data();
        let command = RenderCommand::fill_box(255, red(), BoxI::new(1, 2, 3, 6));

        {
            let regions = BandRegions::new(&mut buf, 8, 4, 1);
            let mut bands = regions.take(0);
            command
                .run(&mut bands[1], &mut wd, &ReferencePipelines)
                .unwrap();
        }

        for y in 0..8 {
            for x in 0..8 {
                let inside = (1..3).contains(&x) && (4..6).contains(&y);
                let expected = if inside { RED_PX } else { PremulRgba8::from_u32(0) };
                assert_eq!(buf[y * 8 + x], expected, "pixel ({x}, {y})");
            }
        }
    }

    #[test]
    fn analytic_command_only_touches_its_bands() {
        let mut storage = EdgeStorage::new(2, 4);
        // A unit square at (2, 1) in fixed point, entirely in band 0.
        storage
            .push_edge(&[EdgePoint::new(512, 256), EdgePoint::new(512, 512)], true)
            .unwrap();
        storage
            .push_edge(&[EdgePoint::new(768, 256), EdgePoint::new(768, 512)], false)
            .unwrap();
        let command = RenderCommand::fill_edges(255, red(), Fill::NonZero, storage.take_edge_set());

        let mut buf = vec![PremulRgba8::from_u32(0); 8 * 8];
        let mut wd = work_data();
        {
            let regions = BandRegions::new(&mut buf, 8, 4, 1);
            for mut band in regions.take(0) {
                command.run(&mut band, &mut wd, &ReferencePipelines).unwrap();
            }
        }

        let painted: Vec<_> = (0..64).filter(|&i| buf[i] != PremulRgba8::from_u32(0)).collect();
        assert_eq!(painted, [8 + 2]);
        assert_eq!(wd.pipelines.misses(), 1);
    }

    #[test]
    fn pending_fetch_is_materialized_on_use() {
        let gradient = LinearGradient::new(Point::new(0.0, 0.0), Point::new(8.0, 0.0), RED, BLUE);
        let fetch = FetchData::pending(FetchParams::LinearGradient(gradient), CompOp::SrcCopy, 0);
        let command = RenderCommand::fill_box(255, fetch.clone(), BoxI::new(0, 0, 8, 1));
        assert!(fetch.is_pending());

        let mut buf = vec![PremulRgba8::from_u32(0); 8 * 8];
        let mut wd = work_data();
        {
            let regions = BandRegions::new(&mut buf, 8, 4, 1);
            let mut bands = regions.take(0);
            command
                .run(&mut bands[0], &mut wd, &ReferencePipelines)
                .unwrap();
        }

        assert!(!fetch.is_pending());
        assert!(buf[0].r > buf[7].r);
        assert!(buf[0].b < buf[7].b);
    }

    #[test]
    fn slots_are_filled_once() {
        let command = RenderCommand::fill_analytic(255, red(), Fill::NonZero);
        assert!(command.edges().is_none());

        command.install_edges(None).unwrap();
        assert_eq!(command.edges().map(|e| e.is_none()), Some(true));
    }
}
