//! Run configuration for the CLI: defaults < `.tickpool.toml` < environment (`.env` honoured)
//! < command-line flags. The library takes [`BatchOpts`](crate::BatchOpts) directly and never
//! reads any of this.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::BatchOpts;
use crate::utils::config::{PackagePaths, PipelineConsts, WorkerThreadLimits};

/// Resolved settings for one CLI run.
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub workers: usize,
    pub interval: Duration,
    pub shutdown_grace: Duration,
    /// Cancel the batch after this long.
    pub deadline: Option<Duration>,
    pub outbox: PathBuf,
    /// Optional JSON summary of stored notifications and receipts.
    pub ledger: Option<PathBuf>,
    pub chat_id: String,
    /// Simulated delivery latency per message.
    pub delay: Duration,
    /// Output of the `filter` job.
    pub filter_output: PathBuf,
    /// Business line the `filter` job selects.
    pub business_line: String,
    pub verbose: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workers: WorkerThreadLimits::current().default_workers(),
            interval: Duration::ZERO,
            shutdown_grace: PipelineConsts::SHUTDOWN_GRACE,
            deadline: None,
            outbox: PathBuf::from(PackagePaths::get().outbox_filename()),
            ledger: None,
            chat_id: String::new(),
            delay: Duration::ZERO,
            filter_output: PathBuf::from(PackagePaths::get().filter_output_filename()),
            business_line: String::new(),
            verbose: false,
        }
    }
}

impl RunConfig {
    pub fn batch_opts(&self) -> BatchOpts {
        BatchOpts {
            workers: self.workers,
            admission_interval: self.interval,
            shutdown_grace: self.shutdown_grace,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers < 1 {
            bail!("workers must be at least 1");
        }
        if self.shutdown_grace.is_zero() {
            bail!("shutdown grace must be positive");
        }
        Ok(())
    }

    /// Delivery needs a default chat id as soon as one notification comes without its own.
    pub fn validate_delivery(&self, without_chat_id: usize) -> Result<()> {
        if without_chat_id > 0 && self.chat_id.trim().is_empty() {
            bail!(
                "{} notification(s) have no chat id and no default is configured (--chat-id or {})",
                without_chat_id,
                PackagePaths::get().env_key("CHAT_ID")
            );
        }
        Ok(())
    }

    pub fn validate_filter(&self) -> Result<()> {
        if self.business_line.trim().is_empty() {
            bail!(
                "no business line to filter on (--business-line or {})",
                PackagePaths::get().env_key("BUSINESS_LINE")
            );
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SettingsFile {
    #[serde(default)]
    batch: BatchSection,
    #[serde(default)]
    delivery: DeliverySection,
    #[serde(default)]
    filter: FilterSection,
}

#[derive(Debug, Default, Deserialize)]
struct BatchSection {
    workers: Option<usize>,
    interval_ms: Option<u64>,
    grace_ms: Option<u64>,
    deadline_secs: Option<u64>,
    verbose: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct DeliverySection {
    outbox: Option<String>,
    ledger: Option<String>,
    chat_id: Option<String>,
    delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct FilterSection {
    output: Option<String>,
    business_line: Option<String>,
}

/// Load the settings file. With `explicit` the file must exist and parse; otherwise
/// `.tickpool.toml` in `dir` is used when present and a bad file is only a warning.
pub fn load_settings_file(dir: &Path, explicit: Option<&Path>) -> Result<Option<SettingsFile>> {
    if let Some(path) = explicit {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let file = toml::from_str(&s).with_context(|| format!("parse config {}", path.display()))?;
        log::debug!("Loaded settings from {}", path.display());
        return Ok(Some(file));
    }
    let path = dir.join(PackagePaths::get().settings_filename());
    let Ok(s) = std::fs::read_to_string(&path) else {
        return Ok(None);
    };
    Ok(toml::from_str(&s)
        .map_err(|e| log::warn!("{}: {}", path.display(), e))
        .ok())
}

/// Overwrite config field from file when present.
macro_rules! apply_file_opt {
    ($section:expr, $cfg:expr, $field:ident => $cfg_field:ident) => {
        if let Some(v) = $section.$field.clone() {
            $cfg.$cfg_field = v;
        }
    };
}

/// Apply file settings (only the fields present in the file).
pub fn apply_file_to_config(file: &SettingsFile, cfg: &mut RunConfig) {
    let b = &file.batch;
    apply_file_opt!(b, cfg, workers => workers);
    apply_file_opt!(b, cfg, verbose => verbose);
    if let Some(ms) = b.interval_ms {
        cfg.interval = Duration::from_millis(ms);
    }
    if let Some(ms) = b.grace_ms {
        cfg.shutdown_grace = Duration::from_millis(ms);
    }
    if let Some(secs) = b.deadline_secs {
        cfg.deadline = Some(Duration::from_secs(secs));
    }
    let d = &file.delivery;
    apply_file_opt!(d, cfg, chat_id => chat_id);
    if let Some(ref p) = d.outbox {
        cfg.outbox = PathBuf::from(p);
    }
    if let Some(ref p) = d.ledger {
        cfg.ledger = Some(PathBuf::from(p));
    }
    if let Some(ms) = d.delay_ms {
        cfg.delay = Duration::from_millis(ms);
    }
    let f = &file.filter;
    apply_file_opt!(f, cfg, business_line => business_line);
    if let Some(ref p) = f.output {
        cfg.filter_output = PathBuf::from(p);
    }
}

/// Load `.env` from `dir` (if any) into the process environment. Existing variables win.
pub fn load_dotenv(dir: &Path) {
    let env_path = dir.join(".env");
    if env_path.is_file()
        && let Err(e) = dotenvy::from_path(&env_path)
    {
        log::warn!("{}: {}", env_path.display(), e);
    }
}

fn env_value(key: &str) -> Option<String> {
    let name = PackagePaths::get().env_key(key);
    std::env::var(&name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env_value(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!(
                "Ignoring {}={:?}: not a valid value",
                PackagePaths::get().env_key(key),
                raw
            );
            None
        }
    }
}

/// Apply `TICKPOOL_*` environment overrides.
pub fn apply_env_to_config(cfg: &mut RunConfig) {
    if let Some(n) = env_parsed::<usize>("WORKERS").filter(|n| *n > 0) {
        cfg.workers = n;
    }
    if let Some(ms) = env_parsed::<u64>("INTERVAL_MS") {
        cfg.interval = Duration::from_millis(ms);
    }
    if let Some(ms) = env_parsed::<u64>("GRACE_MS") {
        cfg.shutdown_grace = Duration::from_millis(ms);
    }
    if let Some(chat_id) = env_value("CHAT_ID") {
        cfg.chat_id = chat_id;
    }
    if let Some(line) = env_value("BUSINESS_LINE") {
        cfg.business_line = line;
    }
    if let Some(debug) = env_value("DEBUG") {
        cfg.verbose = debug == "true" || debug == "1";
    }
}
