// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Running a batch on a pool of worker threads.
//!
//! Every worker thread and the thread that flushes the batch take part in two phases:
//!
//! 1. All participants claim jobs through the batch's job cursor until it is exhausted, then
//!    meet at the job barrier. Batches without jobs skip this phase.
//! 2. Every participant rasterizes all commands, in the order they were issued, into the bands
//!    it owns.
//!
//! Finally the worker threads signal that they are done, and the initiator waits for that
//! signal before it hands the destination back.
//!
//! A job or command that panics is dropped and reported as
//! [`ErrorFlags::INVARIANT_VIOLATION`]. The participant still arrives at both barriers, so the
//! batch always completes.

use crate::batch::RenderBatch;
use crate::region::BandRegions;
use crate::settings::SyncBackend;
use crate::sync::{WorkerStats, WorkerSynchronization};
use crate::work_data::{WorkData, WorkDataParams};
use log::{debug, warn};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use strata_common::error::{ErrorFlags, RasterError};
use strata_common::pipeline::PipelineProvider;
use strata_common::pixmap::Pixmap;
use thread_local::ThreadLocal;

/// The per-thread scratch state of all threads that ever rendered for a context.
pub(crate) type WorkDataSlots = ThreadLocal<RefCell<WorkData>>;

/// Everything the participants of a batch share.
struct WorkerContext<'b, 'r> {
    batch: &'b RenderBatch,
    sync: &'b WorkerSynchronization,
    regions: &'b BandRegions<'r>,
    provider: &'b dyn PipelineProvider,
    work_data: &'b WorkDataSlots,
    params: WorkDataParams,
}

/// Owns the worker threads.
pub(crate) struct WorkerManager {
    pool: ThreadPool,
    num_threads: u16,
    sync: WorkerSynchronization,
}

impl core::fmt::Debug for WorkerManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkerManager")
            .field("num_threads", &self.num_threads)
            .field("sync", &self.sync)
            .finish_non_exhaustive()
    }
}

impl WorkerManager {
    /// Start `num_threads` worker threads, `None` if the threads can't be spawned.
    pub(crate) fn new(num_threads: u16, backend: SyncBackend) -> Option<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(usize::from(num_threads))
            .thread_name(|idx| format!("strata-worker-{idx}"))
            .build();

        match pool {
            Ok(pool) => {
                let sync = WorkerSynchronization::new(backend);
                debug!(
                    "started {num_threads} worker threads, synchronizing with {:?}",
                    sync.backend()
                );

                Some(Self {
                    pool,
                    num_threads,
                    sync,
                })
            }
            Err(e) => {
                warn!("Failed to start the worker threads, rendering synchronously: {e}.");
                None
            }
        }
    }

    pub(crate) fn stats(&self) -> WorkerStats {
        self.sync.stats()
    }

    /// Run `batch` to completion, writing into `pixmap`, and return its accumulated error flags.
    pub(crate) fn run(
        &mut self,
        batch: &RenderBatch,
        pixmap: &mut Pixmap,
        work_data: &WorkDataSlots,
        params: WorkDataParams,
        provider: &dyn PipelineProvider,
    ) -> ErrorFlags {
        let workers = u32::from(self.num_threads);
        let initiator = usize::from(self.num_threads);

        debug!(
            "running batch {} with {} jobs and {} commands",
            batch.batch_id(),
            batch.job_count(),
            batch.command_count()
        );

        self.sync.before_start(workers, batch.job_count() > 0);

        let width = pixmap.width();
        let regions = BandRegions::new(pixmap.data_mut(), width, params.band_height, initiator + 1);
        let ctx = WorkerContext {
            batch,
            sync: &self.sync,
            regions: &regions,
            provider,
            work_data,
            params,
        };

        self.pool.in_place_scope(|scope| {
            scope.spawn_broadcast(|_, broadcast| {
                process_work_data(&ctx, broadcast.index());
                ctx.sync.thread_done();
            });

            process_work_data(&ctx, initiator);
            ctx.sync.wait_for_threads_to_finish();
        });

        batch.error_flags()
    }
}

/// The work of one participant of a batch.
fn process_work_data(ctx: &WorkerContext<'_, '_>, participant: usize) {
    let slot = ctx
        .work_data
        .get_or_try(|| WorkData::new(&ctx.params).map(RefCell::new));

    let Ok(slot) = slot else {
        warn!("Participant {participant} has no scratch state, its bands stay unpainted.");
        ctx.batch.record(RasterError::OutOfMemory.into());
        if !ctx.sync.no_jobs_to_wait_for() {
            ctx.sync.wait_for_jobs_to_finish();
        }
        return;
    };
    let mut wd = slot.borrow_mut();

    if !ctx.sync.no_jobs_to_wait_for() {
        process_jobs(ctx, &mut wd);
        ctx.sync.wait_for_jobs_to_finish();
    }

    process_commands(ctx, participant, &mut wd);

    let flags = wd.take_error_flags();
    ctx.batch.record(flags);
}

fn process_jobs(ctx: &WorkerContext<'_, '_>, wd: &mut WorkData) {
    let commands = ctx.batch.commands();

    while let Some(job) = ctx.batch.next_job() {
        let ran = panic::catch_unwind(AssertUnwindSafe(|| job.run(wd, commands)));
        if ran.is_err() {
            // The command slot stays empty, so the command is skipped.
            warn!("Job of command {} panicked, dropping the command.", job.command_idx());
            recover_from_panic(wd);
        }
    }
}

fn process_commands(ctx: &WorkerContext<'_, '_>, participant: usize, wd: &mut WorkData) {
    for mut region in ctx.regions.take(participant) {
        for (idx, command) in ctx.batch.commands().iter().enumerate() {
            let run = || command.run(&mut region, wd, ctx.provider);
            let ran = panic::catch_unwind(AssertUnwindSafe(run));
            match ran {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!("Dropping command {idx} in band {}: {e}.", region.band);
                    wd.record(e);
                }
                Err(_) => {
                    warn!("Command {idx} panicked in band {}, dropping it.", region.band);
                    recover_from_panic(wd);
                }
            }
        }
    }
}

/// Bring the scratch state back to a clean state after a job or command unwound through it.
fn recover_from_panic(wd: &mut WorkData) {
    wd.edge_storage.clear();
    wd.rasterizer.reset();
    wd.tmp_path.truncate(0);
    wd.error_flags |= ErrorFlags::INVARIANT_VIOLATION;
}
