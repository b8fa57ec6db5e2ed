//! tickpool: fan-out/fan-in worker pool with paced admission and cooperative cancellation.
//!
//! One call processes one batch: a job source feeds items (all at once or one per tick) into an
//! intake queue, `W` worker threads run the caller's function on each item, and a collector
//! folds the outcomes into an [`AggregateResult`]. Cancelling the [`CancellationToken`] stops
//! every stage; the call still returns the tally of what finished, marked partial.
//!
//! ```ignore
//! let cancel = tickpool::CancellationToken::new();
//! let opts = tickpool::BatchOpts::new(2).with_interval(Duration::from_secs(2));
//! let result = tickpool::run_batch(items, &opts, |item, _cancel| send(item), &cancel)?;
//! println!("{} ok, {} failed", result.success_count, result.error_count);
//! ```

pub mod cancel;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod types;
pub mod utils;

/// Re-export types for API
pub use types::*;

pub use cancel::{CancellationToken, install_interrupt_handler};
pub use error::{DeliveryError, FilterError, PipelineError};
pub use pipeline::{run_batch, run_batch_with_observer};

/// Result alias used by the CLI-facing parts of the crate
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;
