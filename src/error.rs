//! Error types for the pipeline and the engine jobs.

use std::path::PathBuf;

use thiserror::Error;

/// Contract misuse caught before a batch starts. Everything that happens once the batch is
/// running (item failures, cancellation, slow shutdown) is reported through
/// [`AggregateResult`](crate::AggregateResult) instead.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("worker count must be at least 1 (got {0})")]
    InvalidWorkerCount(usize),

    #[error("failed to spawn {role} thread: {reason}")]
    Spawn { role: &'static str, reason: String },
}

/// Failure delivering one notification. Captured in that item's outcome.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("notification text is empty")]
    EmptyText,

    #[error("missing chat id")]
    MissingChatId,

    #[error("delivery cancelled")]
    Cancelled,

    #[error("write to outbox {}: {source}", path.display())]
    Outbox {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("encode notification: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failure examining one service record. Captured in that item's outcome.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("malformed service record: {0}")]
    Malformed(#[from] serde_json::Error),
}
