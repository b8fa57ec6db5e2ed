use crossbeam_channel::{Receiver, Sender, select};
use log::debug;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::cancel::CancellationToken;
use crate::error::PipelineError;
use crate::{Outcome, WorkItem};

use super::context::{CompletionLatch, LatchGuard};

/// Single worker: take items from `job_rx`, run `process_fn`, send one outcome per item on
/// `outcome_tx`. Exits when the intake queue is closed and drained, or on cancellation.
/// Cancellation is checked before each dequeue and again before emitting, so an item that
/// finishes after the stop signal produces no outcome.
fn worker_loop<T, O, E, F>(
    id: usize,
    job_rx: Receiver<WorkItem<T>>,
    outcome_tx: Sender<Outcome<O, E>>,
    process_fn: Arc<F>,
    cancel: CancellationToken,
    guard: LatchGuard,
) where
    F: Fn(&T, &CancellationToken) -> Result<O, E>,
{
    debug!("Worker {} started", id);
    let cancelled = cancel.subscribe();
    loop {
        if cancel.is_cancelled() {
            debug!("Worker {} received stop signal", id);
            break;
        }
        let item = select! {
            recv(cancelled) -> _ => {
                debug!("Worker {} received stop signal", id);
                break;
            }
            recv(job_rx) -> msg => match msg {
                Ok(item) => item,
                Err(_) => break,
            },
        };

        debug!("Worker {} processing item #{}", id, item.index);
        let result = process_fn(&item.payload, &cancel);

        if cancel.is_cancelled() {
            debug!(
                "Worker {} interrupted before reporting item #{}",
                id, item.index
            );
            break;
        }
        let outcome = Outcome {
            index: item.index,
            result,
        };
        if outcome_tx.send(outcome).is_err() {
            break;
        }
    }
    // Release our outcome sender before counting out, so the coordinator's close comes last.
    drop(outcome_tx);
    drop(guard);
    debug!("Worker {} finished", id);
}

/// Spawn `num_workers` workers sharing `job_rx`. Each takes a guard from `latch` so the pool's
/// completion is observable. Caller keeps its own `outcome_tx` and decides when to drop it.
pub fn spawn_workers<T, O, E, F>(
    job_rx: &Receiver<WorkItem<T>>,
    outcome_tx: &Sender<Outcome<O, E>>,
    process_fn: Arc<F>,
    cancel: &CancellationToken,
    latch: &Arc<CompletionLatch>,
    num_workers: usize,
) -> Result<Vec<JoinHandle<()>>, PipelineError>
where
    T: Send + 'static,
    O: Send + 'static,
    E: Send + 'static,
    F: Fn(&T, &CancellationToken) -> Result<O, E> + Send + Sync + 'static,
{
    (1..=num_workers)
        .map(|id| {
            let job_rx = job_rx.clone();
            let outcome_tx = outcome_tx.clone();
            let process_fn = Arc::clone(&process_fn);
            let cancel = cancel.clone();
            let guard = latch.guard();
            thread::Builder::new()
                .name(format!("{}-worker-{}", env!("CARGO_PKG_NAME"), id))
                .spawn(move || worker_loop(id, job_rx, outcome_tx, process_fn, cancel, guard))
                .map_err(|e| PipelineError::Spawn {
                    role: "worker",
                    reason: e.to_string(),
                })
        })
        .collect()
}
