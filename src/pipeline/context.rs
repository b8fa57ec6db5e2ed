//! Pipeline channels and the completion latch shared by the worker pool.

use crossbeam_channel::{Receiver, Sender, bounded};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::{Outcome, WorkItem};

/// Intake and outcome queues for one batch. The job source gets `job_tx`, workers get
/// `job_rx` and `outcome_tx`, the collector gets `outcome_rx`.
pub struct PipelineChannels<T, O, E> {
    pub job_tx: Sender<WorkItem<T>>,
    pub job_rx: Receiver<WorkItem<T>>,
    pub outcome_tx: Sender<Outcome<O, E>>,
    pub outcome_rx: Receiver<Outcome<O, E>>,
}

/// Both queues are sized to the batch so admission and outcome emission never block on a
/// full queue; only cancellation or an empty queue can suspend a stage.
pub fn create_pipeline_channels<T, O, E>(batch_len: usize) -> PipelineChannels<T, O, E> {
    let cap = batch_len.max(1);
    let (job_tx, job_rx) = bounded::<WorkItem<T>>(cap);
    let (outcome_tx, outcome_rx) = bounded::<Outcome<O, E>>(cap);
    PipelineChannels {
        job_tx,
        job_rx,
        outcome_tx,
        outcome_rx,
    }
}

/// Count-down latch for worker exit. Each worker holds a [`LatchGuard`]; when the last guard
/// drops, [`CompletionLatch::done_signal`] receivers become ready (disconnected).
pub struct CompletionLatch {
    remaining: AtomicUsize,
    done_tx: Mutex<Option<Sender<()>>>,
    done_rx: Receiver<()>,
}

impl CompletionLatch {
    pub fn new(count: usize) -> Arc<Self> {
        let (done_tx, done_rx) = bounded::<()>(0);
        let latch = Arc::new(Self {
            remaining: AtomicUsize::new(count),
            done_tx: Mutex::new(Some(done_tx)),
            done_rx,
        });
        if count == 0 {
            latch.release();
        }
        latch
    }

    /// One guard per worker; dropping it (normal exit or unwinding) counts the worker out.
    pub fn guard(self: &Arc<Self>) -> LatchGuard {
        LatchGuard {
            latch: Arc::clone(self),
        }
    }

    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    pub fn is_done(&self) -> bool {
        self.remaining() == 0
    }

    /// Receiver that becomes ready once every worker has exited.
    pub fn done_signal(&self) -> Receiver<()> {
        self.done_rx.clone()
    }

    fn count_down(&self) {
        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.release();
        }
    }

    fn release(&self) {
        let tx = self
            .done_tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        drop(tx);
    }
}

pub struct LatchGuard {
    latch: Arc<CompletionLatch>,
}

impl Drop for LatchGuard {
    fn drop(&mut self) {
        self.latch.count_down();
    }
}
