use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Run a batch job through a paced worker pool.
#[derive(Clone, Debug, Parser)]
#[command(name = "tickpool")]
#[command(
    about = "Run a JSON batch with N workers, optionally one item per interval. Ctrl+C stops gracefully."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Settings file. Default: `.tickpool.toml` in the current directory, if present.
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Number of worker threads.
    #[arg(long, short = 'w', global = true)]
    pub workers: Option<usize>,

    /// Admission interval in milliseconds (0 = queue everything at once).
    #[arg(long, short = 'i', global = true)]
    pub interval_ms: Option<u64>,

    /// How long to wait for workers after cancellation, in milliseconds.
    #[arg(long, global = true)]
    pub grace_ms: Option<u64>,

    /// Cancel the batch after this many seconds.
    #[arg(long, short = 'd', global = true)]
    pub deadline_secs: Option<u64>,

    /// Verbose output and progress bar.
    #[arg(long, short = 'v', global = true, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub verbose: Option<bool>,
}

#[derive(Clone, Debug, Subcommand)]
pub enum Command {
    /// Deliver notifications to the outbox.
    Deliver(DeliverArgs),
    /// Select active services of one business line from a services file.
    Filter(FilterArgs),
}

#[derive(Clone, Debug, Args)]
pub struct DeliverArgs {
    /// JSON file with the batch: an array of {"chat_id", "text"} objects or plain strings.
    #[arg(value_name = "ITEMS")]
    pub items: PathBuf,

    /// Outbox file that delivered notifications are appended to (JSON lines).
    #[arg(long, short = 'o')]
    pub outbox: Option<PathBuf>,

    /// Write stored notifications and receipts as JSON to this file when done.
    #[arg(long)]
    pub ledger: Option<PathBuf>,

    /// Default chat id for notifications that do not carry one.
    #[arg(long)]
    pub chat_id: Option<String>,

    /// Simulated delivery latency per message, in milliseconds.
    #[arg(long)]
    pub delay_ms: Option<u64>,
}

#[derive(Clone, Debug, Args)]
pub struct FilterArgs {
    /// JSON array of service records.
    #[arg(value_name = "SERVICES")]
    pub services: PathBuf,

    /// Where the matching services are written (pretty JSON array).
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Business line a service must belong to.
    #[arg(long, short = 'b')]
    pub business_line: Option<String>,
}
