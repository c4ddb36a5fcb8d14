// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A batch: one generation of jobs and commands.

use crate::command::RenderCommand;
use crate::job::RenderJob;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use strata_common::error::ErrorFlags;

/// Jobs and commands recorded by the issuing thread, executed together by the workers.
///
/// Only the issuing thread appends. Once a batch is handed to the workers it is read-only,
/// apart from the job cursor and the error flags.
#[derive(Debug)]
pub(crate) struct RenderBatch {
    batch_id: u64,
    jobs: Vec<RenderJob>,
    commands: Vec<RenderCommand>,
    job_cursor: AtomicUsize,
    error_flags: AtomicU32,
}

impl RenderBatch {
    pub(crate) fn new(batch_id: u64) -> Self {
        Self {
            batch_id,
            jobs: Vec::new(),
            commands: Vec::new(),
            job_cursor: AtomicUsize::new(0),
            error_flags: AtomicU32::new(0),
        }
    }

    pub(crate) fn batch_id(&self) -> u64 {
        self.batch_id
    }

    /// Append a command, returning its slot.
    pub(crate) fn push_command(&mut self, command: RenderCommand) -> usize {
        self.commands.push(command);
        self.commands.len() - 1
    }

    pub(crate) fn push_job(&mut self, job: RenderJob) {
        debug_assert!(job.command_idx() < self.commands.len());
        self.jobs.push(job);
    }

    pub(crate) fn commands(&self) -> &[RenderCommand] {
        &self.commands
    }

    pub(crate) fn command_count(&self) -> usize {
        self.commands.len()
    }

    pub(crate) fn job_count(&self) -> usize {
        self.jobs.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Claim the next job that no other thread has claimed.
    pub(crate) fn next_job(&self) -> Option<&RenderJob> {
        let idx = self.job_cursor.fetch_add(1, Ordering::Relaxed);
        self.jobs.get(idx)
    }

    /// Merge error flags of a participant.
    pub(crate) fn record(&self, flags: ErrorFlags) {
        if !flags.is_empty() {
            self.error_flags.fetch_or(flags.bits(), Ordering::Relaxed);
        }
    }

    pub(crate) fn error_flags(&self) -> ErrorFlags {
        ErrorFlags::from_bits_truncate(self.error_flags.load(Ordering::Relaxed))
    }

    /// Drop all jobs and commands and start the batch `batch_id`, keeping the allocations.
    pub(crate) fn reset(&mut self, batch_id: u64) {
        self.batch_id = batch_id;
        self.jobs.clear();
        self.commands.clear();
        *self.job_cursor.get_mut() = 0;
        *self.error_flags.get_mut() = 0;
    }
}
