// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The two synchronization points of a batch.
//!
//! Both are counters that are decremented by arriving threads. The thread that brings a counter
//! to zero wakes everybody blocked on it. A waiter spins for a short while before it blocks,
//! using either keyed parking on the address of the counter or a mutex and a condition
//! variable, see [`SyncBackend`].

use crate::settings::SyncBackend;
use log::trace;
use parking_lot_core::{DEFAULT_PARK_TOKEN, DEFAULT_UNPARK_TOKEN};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};

/// How often a waiter polls its counter before it blocks.
const SPIN_LIMIT: u32 = 256;

/// Counters describing how the synchronization points were used, for diagnostics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Number of batches that were run on the worker threads.
    pub batches: u64,
    /// Number of arrivals at the job barrier.
    pub job_barrier_waits: u64,
    /// Number of times the last worker of a batch signaled the initiator.
    pub threads_finished_signals: u64,
}

#[derive(Debug)]
pub(crate) struct WorkerSynchronization {
    backend: SyncBackend,
    jobs_running: AtomicU32,
    threads_running: AtomicU32,
    no_jobs_to_wait_for: bool,
    lock: Mutex<()>,
    cond: Condvar,
    batches: u64,
    job_barrier_waits: AtomicU64,
    threads_finished_signals: AtomicU64,
}

impl WorkerSynchronization {
    pub(crate) fn new(backend: SyncBackend) -> Self {
        Self {
            backend: backend.resolve(),
            jobs_running: AtomicU32::new(0),
            threads_running: AtomicU32::new(0),
            no_jobs_to_wait_for: true,
            lock: Mutex::new(()),
            cond: Condvar::new(),
            batches: 0,
            job_barrier_waits: AtomicU64::new(0),
            threads_finished_signals: AtomicU64::new(0),
        }
    }

    pub(crate) fn backend(&self) -> SyncBackend {
        self.backend
    }

    /// Arm the counters for a batch run by `workers` worker threads plus the initiator.
    pub(crate) fn before_start(&mut self, workers: u32, has_jobs: bool) {
        self.batches += 1;
        self.no_jobs_to_wait_for = !has_jobs;
        *self.jobs_running.get_mut() = if has_jobs { workers + 1 } else { 0 };
        *self.threads_running.get_mut() = workers;
    }

    /// Whether the job barrier can be skipped, because the batch has no jobs.
    pub(crate) fn no_jobs_to_wait_for(&self) -> bool {
        self.no_jobs_to_wait_for
    }

    /// Arrive at the job barrier and block until every participant has arrived.
    pub(crate) fn wait_for_jobs_to_finish(&self) {
        self.job_barrier_waits.fetch_add(1, Ordering::Relaxed);

        if self.jobs_running.fetch_sub(1, Ordering::AcqRel) == 1 {
            trace!("all participants finished their jobs");
            self.wake_all(&self.jobs_running);
        } else {
            self.wait_for_zero(&self.jobs_running);
        }
    }

    /// Signal that a worker thread is done with the batch.
    pub(crate) fn thread_done(&self) {
        if self.threads_running.fetch_sub(1, Ordering::AcqRel) == 1 {
            trace!("all worker threads finished the batch");
            self.threads_finished_signals
                .fetch_add(1, Ordering::Relaxed);
            self.wake_all(&self.threads_running);
        }
    }

    /// Block the initiator until every worker thread called [`thread_done`](Self::thread_done).
    pub(crate) fn wait_for_threads_to_finish(&self) {
        self.wait_for_zero(&self.threads_running);
    }

    pub(crate) fn stats(&self) -> WorkerStats {
        WorkerStats {
            batches: self.batches,
            job_barrier_waits: self.job_barrier_waits.load(Ordering::Relaxed),
            threads_finished_signals: self.threads_finished_signals.load(Ordering::Relaxed),
        }
    }

    fn wait_for_zero(&self, counter: &AtomicU32) {
        for _ in 0..SPIN_LIMIT {
            if counter.load(Ordering::Acquire) == 0 {
                return;
            }
            core::hint::spin_loop();
        }

        match self.backend {
            SyncBackend::Futex | SyncBackend::Auto => {
                let key = counter_key(counter);
                while counter.load(Ordering::Acquire) != 0 {
                    // SAFETY: The key is the address of a counter owned by `self`, which no
                    // other parking primitive uses. The callbacks neither panic nor park.
                    unsafe {
                        parking_lot_core::park(
                            key,
                            || counter.load(Ordering::Acquire) != 0,
                            || {},
                            |_, _| {},
                            DEFAULT_PARK_TOKEN,
                            None,
                        );
                    }
                }
            }
            SyncBackend::Condvar => {
                let mut guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
                while counter.load(Ordering::Acquire) != 0 {
                    guard = self
                        .cond
                        .wait(guard)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }

    fn wake_all(&self, counter: &AtomicU32) {
        match self.backend {
            SyncBackend::Futex | SyncBackend::Auto => {
                // SAFETY: See `wait_for_zero`.
                unsafe {
                    parking_lot_core::unpark_all(counter_key(counter), DEFAULT_UNPARK_TOKEN);
                }
            }
            SyncBackend::Condvar => {
                // Taking the lock orders the wake-up after a waiter's last check of the counter.
                let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
                self.cond.notify_all();
            }
        }
    }
}

fn counter_key(counter: &AtomicU32) -> usize {
    core::ptr::from_ref(counter) as usize
}
