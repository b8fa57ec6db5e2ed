//! Public and internal types for the tickpool API and pipeline.

use std::fmt;
use std::time::Duration;

use crate::utils::config::{PipelineConsts, WorkerThreadLimits};

/// One unit of work as it travels the intake queue. `index` is the item's position in the
/// submitted batch and is its only identity (payloads need not be unique).
#[derive(Clone, Debug)]
pub struct WorkItem<T> {
    pub index: usize,
    pub payload: T,
}

/// Result of processing one [`WorkItem`]. Built once by the worker that processed it.
#[derive(Debug)]
pub struct Outcome<O, E> {
    /// Position of the item in the batch.
    pub index: usize,
    pub result: Result<O, E>,
}

impl<O, E> Outcome<O, E> {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Tally for one batch. Only the result collector mutates it.
///
/// `partial` is set when cancellation cut the batch short (fewer outcomes counted than items
/// submitted). `shutdown_timed_out` is set when workers did not exit within the grace period
/// after cancellation; some of them may still be running when the caller gets this value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AggregateResult {
    pub success_count: usize,
    pub error_count: usize,
    /// Number of items the job source put on the intake queue.
    pub admitted: usize,
    /// Number of items submitted to the batch.
    pub total: usize,
    pub partial: bool,
    pub shutdown_timed_out: bool,
}

impl AggregateResult {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Outcomes counted so far.
    pub fn processed(&self) -> usize {
        self.success_count + self.error_count
    }

    /// Count one outcome.
    pub fn record<O, E>(&mut self, outcome: &Outcome<O, E>) {
        if outcome.is_success() {
            self.success_count += 1;
        } else {
            self.error_count += 1;
        }
    }

    /// Fold another tally into this one. Commutative and associative over the counts, so
    /// arrival order of outcomes never changes the final numbers.
    pub fn merge(&mut self, other: &AggregateResult) {
        self.success_count += other.success_count;
        self.error_count += other.error_count;
        self.admitted += other.admitted;
        self.total += other.total;
        self.partial |= other.partial;
        self.shutdown_timed_out |= other.shutdown_timed_out;
    }

    /// True when every submitted item produced an outcome.
    pub fn is_complete(&self) -> bool {
        !self.partial && self.processed() == self.total
    }
}

impl fmt::Display for AggregateResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ok, {} failed ({} of {} admitted{})",
            self.success_count,
            self.error_count,
            self.admitted,
            self.total,
            if self.partial { ", partial" } else { "" }
        )
    }
}

/// How the job source releases items onto the intake queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// All items back-to-back.
    Immediate,
    /// First item at once, then one item per tick of the given period.
    Paced(Duration),
}

impl Admission {
    /// Zero interval selects immediate mode.
    pub fn from_interval(interval: Duration) -> Self {
        if interval.is_zero() {
            Admission::Immediate
        } else {
            Admission::Paced(interval)
        }
    }
}

/// Options for one call to [`run_batch`](crate::run_batch).
#[derive(Clone, Debug)]
pub struct BatchOpts {
    /// Number of worker threads. Must be at least 1.
    pub workers: usize,
    /// Zero for immediate admission, otherwise the pacing period.
    pub admission_interval: Duration,
    /// How long to wait for workers to exit after cancellation before returning anyway.
    pub shutdown_grace: Duration,
}

impl Default for BatchOpts {
    fn default() -> Self {
        Self {
            workers: WorkerThreadLimits::current().default_workers(),
            admission_interval: Duration::ZERO,
            shutdown_grace: PipelineConsts::SHUTDOWN_GRACE,
        }
    }
}

impl BatchOpts {
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            ..Self::default()
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.admission_interval = interval;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn admission(&self) -> Admission {
        Admission::from_interval(self.admission_interval)
    }
}
