use log::{debug, info};
use std::fmt::Display;
use std::time::Instant;

use crate::cancel::CancellationToken;
use crate::error::PipelineError;
use crate::{AggregateResult, BatchOpts, Outcome};

use super::coordinator::Coordinator;

/// Process one batch and return its tally; see [`run_batch_with_observer`].
pub fn run_batch<T, O, E, F>(
    items: Vec<T>,
    opts: &BatchOpts,
    process_fn: F,
    cancel: &CancellationToken,
) -> Result<AggregateResult, PipelineError>
where
    T: Send + 'static,
    O: Send + 'static,
    E: Display + Send + 'static,
    F: Fn(&T, &CancellationToken) -> Result<O, E> + Send + Sync + 'static,
{
    run_batch_inner(items, opts, process_fn, cancel, None)
}

/// Main orchestrator: job source → intake queue → workers → outcome queue → collector.
///
/// Blocks until every item has an outcome, or until `cancel` fires and the workers stopped (or
/// the shutdown grace ran out). `on_outcome` runs on the collector thread once per counted
/// outcome. Only invalid options are an `Err`; everything else is in the returned tally.
pub fn run_batch_with_observer<T, O, E, F, G>(
    items: Vec<T>,
    opts: &BatchOpts,
    process_fn: F,
    cancel: &CancellationToken,
    on_outcome: G,
) -> Result<AggregateResult, PipelineError>
where
    T: Send + 'static,
    O: Send + 'static,
    E: Display + Send + 'static,
    F: Fn(&T, &CancellationToken) -> Result<O, E> + Send + Sync + 'static,
    G: FnMut(&Outcome<O, E>) + Send + 'static,
{
    run_batch_inner(items, opts, process_fn, cancel, Some(Box::new(on_outcome)))
}

fn run_batch_inner<T, O, E, F>(
    items: Vec<T>,
    opts: &BatchOpts,
    process_fn: F,
    cancel: &CancellationToken,
    on_outcome: Option<super::collector::OutcomeObserver<O, E>>,
) -> Result<AggregateResult, PipelineError>
where
    T: Send + 'static,
    O: Send + 'static,
    E: Display + Send + 'static,
    F: Fn(&T, &CancellationToken) -> Result<O, E> + Send + Sync + 'static,
{
    let start = Instant::now();
    debug!(
        "Starting batch of {} items: {} workers, {:?} admission, grace {:?}",
        items.len(),
        opts.workers,
        opts.admission(),
        opts.shutdown_grace
    );

    let coordinator = Coordinator::new(cancel);
    let handles = coordinator.start(items, opts, process_fn, on_outcome)?;
    let result = coordinator.finish(handles);

    info!("Batch finished in {:?}: {}", start.elapsed(), result);
    Ok(result)
}
