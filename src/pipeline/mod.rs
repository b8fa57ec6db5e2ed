//! Pipeline components: channels, job source, worker pool, collector, lifecycle coordinator.

pub mod collector;
pub mod context;
pub mod coordinator;
pub mod orchestrator;
pub mod source;
pub mod worker;

pub use collector::{CollectExit, CollectorParams, OutcomeObserver, collect_outcomes};
pub use context::{CompletionLatch, LatchGuard, PipelineChannels, create_pipeline_channels};
pub use coordinator::{BatchHandles, Coordinator, Lifecycle, LifecycleState};
pub use orchestrator::{run_batch, run_batch_with_observer};
pub use source::{run_job_source, spawn_job_source};
pub use worker::spawn_workers;
