//! Lifecycle coordinator: starts every stage of a batch, closes the outcome queue once the
//! pool has exited, and assembles the final tally.

use crossbeam_channel::Sender;
use log::{debug, warn};
use std::fmt::Display;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread::{self, JoinHandle};

use crate::cancel::CancellationToken;
use crate::error::PipelineError;
use crate::{AggregateResult, BatchOpts, Outcome};

use super::collector::{CollectExit, CollectorParams, OutcomeObserver, collect_outcomes};
use super::context::{CompletionLatch, create_pipeline_channels};
use super::source::spawn_job_source;
use super::worker::spawn_workers;

/// `Idle → Running → Draining → Done`. `Done` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    Idle = 0,
    Running = 1,
    Draining = 2,
    Done = 3,
}

impl LifecycleState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => LifecycleState::Idle,
            1 => LifecycleState::Running,
            2 => LifecycleState::Draining,
            _ => LifecycleState::Done,
        }
    }
}

/// Shared state cell for one batch. Transitions are compare-and-swap so two stages racing to
/// start draining (pool finished vs. cancellation) resolve to a single transition.
#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU8,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(LifecycleState::Idle as u8),
        }
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move `from → to`. False if the current state is not `from`.
    pub fn transition(&self, from: LifecycleState, to: LifecycleState) -> bool {
        let moved = self
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if moved {
            debug!("Batch lifecycle: {:?} -> {:?}", from, to);
        }
        moved
    }

    pub fn begin_running(&self) -> bool {
        self.transition(LifecycleState::Idle, LifecycleState::Running)
    }

    pub fn begin_draining(&self) -> bool {
        self.transition(LifecycleState::Running, LifecycleState::Draining)
    }

    /// Enter `Done` from wherever the batch is. Passes through `Draining` when still running.
    pub fn finish(&self) {
        self.begin_draining();
        self.transition(LifecycleState::Draining, LifecycleState::Done);
    }
}

/// Handles for a started batch, returned by [`Coordinator::start`].
pub struct BatchHandles {
    pub source_handle: JoinHandle<usize>,
    pub worker_handles: Vec<JoinHandle<()>>,
    pub watcher_handle: JoinHandle<()>,
    pub collector_handle: JoinHandle<(AggregateResult, CollectExit)>,
    pub latch: Arc<CompletionLatch>,
    /// Batch size, kept so a lost collector still reports against the right total.
    pub total: usize,
}

/// Drives one batch. Build a new coordinator (and token) per run.
pub struct Coordinator {
    lifecycle: Arc<Lifecycle>,
    cancel: CancellationToken,
}

impl Coordinator {
    pub fn new(cancel: &CancellationToken) -> Self {
        Self {
            lifecycle: Arc::new(Lifecycle::new()),
            cancel: cancel.clone(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }

    /// `Idle → Running`: spawn workers, job source, completion watcher and collector.
    pub fn start<T, O, E, F>(
        &self,
        items: Vec<T>,
        opts: &BatchOpts,
        process_fn: F,
        on_outcome: Option<OutcomeObserver<O, E>>,
    ) -> Result<BatchHandles, PipelineError>
    where
        T: Send + 'static,
        O: Send + 'static,
        E: Display + Send + 'static,
        F: Fn(&T, &CancellationToken) -> Result<O, E> + Send + Sync + 'static,
    {
        if opts.workers < 1 {
            return Err(PipelineError::InvalidWorkerCount(opts.workers));
        }
        let total = items.len();
        let channels = create_pipeline_channels::<T, O, E>(total);
        let latch = CompletionLatch::new(opts.workers);
        self.lifecycle.begin_running();

        let worker_handles = spawn_workers(
            &channels.job_rx,
            &channels.outcome_tx,
            Arc::new(process_fn),
            &self.cancel,
            &latch,
            opts.workers,
        )?;
        // Workers hold their own receivers; the source is the only remaining sender.
        drop(channels.job_rx);

        let source_handle = spawn_job_source(
            items,
            opts.admission(),
            channels.job_tx,
            self.cancel.clone(),
        )?;

        let watcher_handle = spawn_completion_watcher(
            Arc::clone(&latch),
            channels.outcome_tx,
            Arc::clone(&self.lifecycle),
        )?;

        let collector_handle = {
            let outcome_rx = channels.outcome_rx;
            let pool_done = latch.done_signal();
            let cancel = self.cancel.clone();
            let lifecycle = Arc::clone(&self.lifecycle);
            let shutdown_grace = opts.shutdown_grace;
            thread::Builder::new()
                .name(format!("{}-collector", env!("CARGO_PKG_NAME")))
                .spawn(move || {
                    let mut tally = AggregateResult::new(total);
                    let exit = collect_outcomes(
                        &mut tally,
                        CollectorParams {
                            outcome_rx,
                            pool_done,
                            cancel: &cancel,
                            shutdown_grace,
                            lifecycle: &lifecycle,
                            on_outcome,
                        },
                    );
                    (tally, exit)
                })
                .map_err(|e| PipelineError::Spawn {
                    role: "collector",
                    reason: e.to_string(),
                })?
        };

        Ok(BatchHandles {
            source_handle,
            worker_handles,
            watcher_handle,
            collector_handle,
            latch,
            total,
        })
    }

    /// Wait for the collector (bounded by the shutdown grace), join what has exited, and
    /// return the frozen tally. Enters `Done`.
    pub fn finish(&self, handles: BatchHandles) -> AggregateResult {
        let BatchHandles {
            source_handle,
            worker_handles,
            watcher_handle,
            collector_handle,
            latch,
            total,
        } = handles;

        let (mut tally, exit) = match collector_handle.join() {
            Ok(r) => r,
            Err(_) => {
                warn!("Result collector panicked; returning an empty partial result");
                self.cancel.cancel();
                let tally = AggregateResult {
                    partial: true,
                    ..AggregateResult::new(total)
                };
                (tally, CollectExit::Cancelled { workers_exited: false })
            }
        };

        // The source never blocks past cancellation, so this join is short.
        tally.admitted = source_handle.join().unwrap_or_else(|_| {
            warn!("Job source panicked");
            0
        });

        if latch.is_done() {
            for h in worker_handles {
                let _ = h.join();
            }
            let _ = watcher_handle.join();
        } else {
            warn!(
                "{} worker(s) still running after shutdown; detaching them",
                latch.remaining()
            );
        }

        tally.partial |= tally.processed() < tally.total;
        if tally.partial && exit == CollectExit::Drained {
            warn!(
                "Only {} of {} items produced an outcome (a worker exited abnormally)",
                tally.processed(),
                tally.total
            );
        }
        self.lifecycle.finish();
        tally
    }
}

/// Wait for every worker to exit, then close the outcome queue by dropping the last sender.
fn spawn_completion_watcher<O: Send + 'static, E: Send + 'static>(
    latch: Arc<CompletionLatch>,
    outcome_tx: Sender<Outcome<O, E>>,
    lifecycle: Arc<Lifecycle>,
) -> Result<JoinHandle<()>, PipelineError> {
    thread::Builder::new()
        .name(format!("{}-watcher", env!("CARGO_PKG_NAME")))
        .spawn(move || {
            let _ = latch.done_signal().recv();
            debug!("Worker pool finished");
            lifecycle.begin_draining();
            drop(outcome_tx);
        })
        .map_err(|e| PipelineError::Spawn {
            role: "completion watcher",
            reason: e.to_string(),
        })
}
