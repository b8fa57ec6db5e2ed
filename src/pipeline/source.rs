//! Job source: puts batch items on the intake queue, back-to-back or one per tick.

use crossbeam_channel::{Receiver, Sender, select, tick};
use log::{debug, info};
use std::thread::{self, JoinHandle};

use crate::cancel::CancellationToken;
use crate::error::PipelineError;
use crate::{Admission, WorkItem};

pub fn spawn_job_source<T: Send + 'static>(
    items: Vec<T>,
    admission: Admission,
    job_tx: Sender<WorkItem<T>>,
    cancel: CancellationToken,
) -> Result<JoinHandle<usize>, PipelineError> {
    thread::Builder::new()
        .name(format!("{}-source", env!("CARGO_PKG_NAME")))
        .spawn(move || run_job_source(items, admission, job_tx, &cancel))
        .map_err(|e| PipelineError::Spawn {
            role: "job source",
            reason: e.to_string(),
        })
}

/// Admit `items` in order onto `job_tx`. Takes the sender by value: it is dropped (closing the
/// intake queue) exactly once when this returns, whichever way it returns.
/// Returns the number of items admitted.
pub fn run_job_source<T>(
    items: Vec<T>,
    admission: Admission,
    job_tx: Sender<WorkItem<T>>,
    cancel: &CancellationToken,
) -> usize {
    let total = items.len();
    let cancelled = cancel.subscribe();
    let ticker = match admission {
        Admission::Paced(interval) => Some(tick(interval)),
        Admission::Immediate => None,
    };

    let mut admitted = 0_usize;
    for (index, payload) in items.into_iter().enumerate() {
        if let Some(ref ticker) = ticker
            && index > 0
            && !wait_for_tick(ticker, &cancelled)
        {
            break;
        }
        if cancel.is_cancelled() {
            break;
        }
        debug!("Queueing item {}/{}", index + 1, total);
        let item = WorkItem { index, payload };
        select! {
            recv(cancelled) -> _ => break,
            send(job_tx, item) -> res => {
                if res.is_err() {
                    break;
                }
            }
        }
        admitted += 1;
        if let Admission::Paced(interval) = admission
            && admitted < total
        {
            debug!("Next item in {:?}", interval);
        }
    }

    if admitted < total {
        info!(
            "Admission stopped by cancellation: {} of {} items queued",
            admitted, total
        );
    } else {
        debug!("All {} items queued", admitted);
    }
    drop(job_tx);
    admitted
}

/// Block until the next tick. False when cancellation arrives first.
fn wait_for_tick(ticker: &Receiver<std::time::Instant>, cancelled: &Receiver<()>) -> bool {
    select! {
        recv(cancelled) -> _ => false,
        recv(ticker) -> _ => true,
    }
}
