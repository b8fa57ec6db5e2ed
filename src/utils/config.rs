//! Application configuration constants.
//! Tuning and defaults in one place.

use std::sync::OnceLock;
use std::time::Duration;

// ---- Package / paths (from CARGO_PKG_NAME, cached) ----

/// Package-derived file names: built once from `CARGO_PKG_NAME`, then cached.
pub struct PackagePaths {
    pkg_name: &'static str,
    settings_filename: String,
    outbox_filename: String,
    filter_output_filename: String,
    env_prefix: String,
}

static PACKAGE_PATHS: OnceLock<PackagePaths> = OnceLock::new();

impl PackagePaths {
    /// Build and cache names from `CARGO_PKG_NAME`. Called once on first use.
    pub fn get() -> &'static PackagePaths {
        PACKAGE_PATHS.get_or_init(|| {
            let pkg = env!("CARGO_PKG_NAME");
            PackagePaths {
                pkg_name: pkg,
                settings_filename: format!(".{pkg}.toml"),
                outbox_filename: format!("{pkg}.outbox.jsonl"),
                filter_output_filename: "filtered_services.json".to_string(),
                env_prefix: pkg.to_uppercase(),
            }
        })
    }

    pub fn pkg_name(&self) -> &str {
        self.pkg_name
    }

    /// Settings file looked up in the working directory (e.g. `.tickpool.toml`).
    pub fn settings_filename(&self) -> &str {
        &self.settings_filename
    }

    /// Default JSON-lines file that delivered notifications are appended to.
    pub fn outbox_filename(&self) -> &str {
        &self.outbox_filename
    }

    /// Default output of the service filter.
    pub fn filter_output_filename(&self) -> &str {
        &self.filter_output_filename
    }

    /// Environment variable name for `key`, e.g. `TICKPOOL_WORKERS`.
    pub fn env_key(&self, key: &str) -> String {
        format!("{}_{}", self.env_prefix, key)
    }
}

// ---- Worker threads ----

/// Thread limits for the default worker count.
/// Use [`WorkerThreadLimits::current()`] to fill `all_threads` from rayon; the rest are const.
#[derive(Clone, Copy, Debug)]
pub struct WorkerThreadLimits {
    /// Available threads (from rayon); set by [`WorkerThreadLimits::current()`].
    pub all_threads: usize,
    /// Floor / minimum worker count.
    pub floor: usize,
    /// Upper bound for the default. Workers mostly wait on I/O, so more than this rarely helps.
    pub default_max: usize,
}

impl Default for WorkerThreadLimits {
    fn default() -> Self {
        Self {
            all_threads: 0, // use current() to set from rayon
            floor: Self::FLOOR_THREADS,
            default_max: Self::DEFAULT_MAX_THREADS,
        }
    }
}

impl WorkerThreadLimits {
    pub const FLOOR_THREADS: usize = 1;
    pub const DEFAULT_MAX_THREADS: usize = 8;

    /// Build limits with `all_threads` set from `rayon::current_num_threads()`.
    pub fn current() -> Self {
        Self {
            all_threads: rayon::current_num_threads(),
            ..Self::default()
        }
    }

    /// Worker count used when the caller does not pick one.
    pub fn default_workers(&self) -> usize {
        self.all_threads.clamp(self.floor, self.default_max)
    }
}

// ---- Pipeline ----

/// Timing defaults for the batch pipeline.
pub struct PipelineConsts;

impl PipelineConsts {
    /// Wait for workers to exit after cancellation before returning a partial result.
    pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);
}

// ---- Progress ----

/// Log a progress line every this many outcomes when no progress bar is shown.
pub const PROGRESS_LOG_EVERY: usize = 10;
