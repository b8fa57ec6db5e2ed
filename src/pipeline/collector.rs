//! Result collector: folds worker outcomes into the batch tally.

use crossbeam_channel::{Receiver, after, select};
use log::{debug, info, warn};
use std::fmt::Display;
use std::time::Duration;

use crate::cancel::CancellationToken;
use crate::utils::config::PROGRESS_LOG_EVERY;
use crate::{AggregateResult, Outcome};

use super::coordinator::Lifecycle;

/// Callback run on the collector thread for every counted outcome (persistence, progress).
pub type OutcomeObserver<O, E> = Box<dyn FnMut(&Outcome<O, E>) + Send>;

/// How [`collect_outcomes`] returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CollectExit {
    /// Outcome queue closed after every worker exited.
    Drained,
    /// Cancelled; `workers_exited` is false when the grace period ran out first.
    Cancelled { workers_exited: bool },
}

/// Parameters for [`collect_outcomes`].
pub struct CollectorParams<'a, O, E> {
    pub outcome_rx: Receiver<Outcome<O, E>>,
    /// Ready once every worker has exited.
    pub pool_done: Receiver<()>,
    pub cancel: &'a CancellationToken,
    pub shutdown_grace: Duration,
    pub lifecycle: &'a Lifecycle,
    pub on_outcome: Option<OutcomeObserver<O, E>>,
}

fn count_outcome<O, E: Display>(
    tally: &mut AggregateResult,
    outcome: &Outcome<O, E>,
    on_outcome: &mut Option<OutcomeObserver<O, E>>,
) {
    tally.record(outcome);
    match &outcome.result {
        Ok(_) => debug!("Item #{} processed", outcome.index),
        Err(e) => warn!("Item #{} failed: {}", outcome.index, e),
    }
    if let Some(cb) = on_outcome.as_mut() {
        cb(outcome);
    }
    let processed = tally.processed();
    if processed.is_multiple_of(PROGRESS_LOG_EVERY) {
        debug!("Processed {} of {} items", processed, tally.total);
    }
}

/// Read outcomes into `tally` until the outcome queue closes or the batch is cancelled.
///
/// On cancellation stop reading, wait up to `shutdown_grace` for the pool to finish, then count
/// whatever outcomes workers had already queued. A timeout sets `tally.shutdown_timed_out` and
/// is only a warning.
pub fn collect_outcomes<O, E: Display>(
    tally: &mut AggregateResult,
    params: CollectorParams<'_, O, E>,
) -> CollectExit {
    let CollectorParams {
        outcome_rx,
        pool_done,
        cancel,
        shutdown_grace,
        lifecycle,
        mut on_outcome,
    } = params;
    let cancelled = cancel.subscribe();

    loop {
        select! {
            recv(cancelled) -> _ => break,
            recv(outcome_rx) -> msg => match msg {
                Ok(outcome) => count_outcome(tally, &outcome, &mut on_outcome),
                Err(_) => {
                    debug!("Outcome queue closed; {} outcomes collected", tally.processed());
                    return CollectExit::Drained;
                }
            },
        }
    }

    lifecycle.begin_draining();
    info!("Result collection interrupted; waiting for workers to stop");
    let workers_exited = select! {
        recv(pool_done) -> _ => true,
        recv(after(shutdown_grace)) -> _ => false,
    };
    if workers_exited {
        info!("All workers stopped");
    } else {
        warn!(
            "Timed out after {:?} waiting for workers to stop; returning partial result",
            shutdown_grace
        );
        tally.shutdown_timed_out = true;
    }

    for outcome in outcome_rx.try_iter() {
        count_outcome(tally, &outcome, &mut on_outcome);
    }
    CollectExit::Cancelled { workers_exited }
}
