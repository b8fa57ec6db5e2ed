//! CLI command handler: resolve settings, run the chosen job, report.

use anyhow::{Context, Result};
use kdam::Animation;
use log::{debug, info, warn};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::cancel::{CancellationToken, install_interrupt_handler};
use crate::engine::arg_parser::{Cli, Command, DeliverArgs, FilterArgs};
use crate::engine::delivery::{Deliverer, Notification, SentReceipt, load_notifications};
use crate::engine::filter::{MatchSet, ServiceFilter, ServiceMatch, load_services};
use crate::engine::progress::{
    ProgressBar, ProgressBarConfig, create_progress_bar, finish_progress_bar, update_progress_bar,
};
use crate::engine::store::{EntityStore, StoredEntity};
use crate::error::{DeliveryError, FilterError};
use crate::pipeline::run_batch_with_observer;
use crate::utils::{
    PROGRESS_LOG_EVERY, RunConfig, apply_env_to_config, apply_file_to_config, load_dotenv,
    load_settings_file, set_verbose, setup_logging,
};
use crate::{AggregateResult, Outcome};

/// Flags win over file and environment.
fn apply_cli_to_config(cli: &Cli, cfg: &mut RunConfig) {
    if let Some(n) = cli.workers {
        cfg.workers = n;
    }
    if let Some(ms) = cli.interval_ms {
        cfg.interval = Duration::from_millis(ms);
    }
    if let Some(ms) = cli.grace_ms {
        cfg.shutdown_grace = Duration::from_millis(ms);
    }
    if let Some(secs) = cli.deadline_secs {
        cfg.deadline = Some(Duration::from_secs(secs));
    }
    if let Some(v) = cli.verbose {
        cfg.verbose = v;
    }
    match &cli.command {
        Command::Deliver(args) => {
            if let Some(ref p) = args.outbox {
                cfg.outbox = p.clone();
            }
            if let Some(ref p) = args.ledger {
                cfg.ledger = Some(p.clone());
            }
            if let Some(ref c) = args.chat_id {
                cfg.chat_id = c.clone();
            }
            if let Some(ms) = args.delay_ms {
                cfg.delay = Duration::from_millis(ms);
            }
        }
        Command::Filter(args) => {
            if let Some(ref p) = args.output {
                cfg.filter_output = p.clone();
            }
            if let Some(ref b) = args.business_line {
                cfg.business_line = b.clone();
            }
        }
    }
}

/// defaults < settings file < environment < flags.
pub fn resolve_config(cli: &Cli) -> Result<RunConfig> {
    let cwd = std::env::current_dir().context("resolve working directory")?;
    let mut cfg = RunConfig::default();
    if let Some(file) = load_settings_file(&cwd, cli.config.as_deref())? {
        apply_file_to_config(&file, &mut cfg);
    }
    load_dotenv(&cwd);
    apply_env_to_config(&mut cfg);
    apply_cli_to_config(cli, &mut cfg);
    cfg.validate()?;
    Ok(cfg)
}

/// Notifications with no chat id of their own; these need the configured default.
pub fn count_without_chat_id(items: &[Notification]) -> usize {
    items.iter().filter(|n| n.chat_id.trim().is_empty()).count()
}

/// Observer run on the collector thread: record what was sent, advance the progress bar.
fn delivery_observer(
    items: Arc<Vec<Notification>>,
    store: Arc<Mutex<EntityStore>>,
    bar: Option<ProgressBar>,
) -> impl FnMut(&Outcome<SentReceipt, DeliveryError>) + Send + 'static {
    move |outcome| {
        let mut store = store
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(n) = items.get(outcome.index) {
            store.store(StoredEntity::Notification(n.clone()));
        }
        if let Ok(receipt) = &outcome.result {
            store.store(StoredEntity::Sent(receipt.clone()));
        }
        if let Some(ref bar) = bar {
            update_progress_bar(bar, 1);
        }
    }
}

/// Observer for the filter job: keep matches, log every few of them.
fn filter_observer(
    matches: Arc<Mutex<MatchSet>>,
    bar: Option<ProgressBar>,
) -> impl FnMut(&Outcome<Option<ServiceMatch>, FilterError>) + Send + 'static {
    move |outcome| {
        if let Ok(Some(m)) = &outcome.result {
            let mut matches = matches
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            matches.push(m.clone());
            if matches.len().is_multiple_of(PROGRESS_LOG_EVERY) {
                info!("Matched {} services so far", matches.len());
            }
        }
        if let Some(ref bar) = bar {
            update_progress_bar(bar, 1);
        }
    }
}

fn progress_bar(cfg: &RunConfig, total: usize, desc: &'static str) -> Option<ProgressBar> {
    cfg.verbose
        .then(|| create_progress_bar(ProgressBarConfig::new(total, desc, Animation::Classic)))
}

fn log_summary(result: &AggregateResult, elapsed: Duration, lines: &[String]) {
    let secs = elapsed.as_secs_f64();
    let rate = if secs > 0.0 {
        result.processed() as f64 / secs
    } else {
        0.0
    };
    info!("========================================");
    info!("BATCH COMPLETE");
    info!("Elapsed: {:?}", elapsed);
    for line in lines {
        info!("{}", line);
    }
    info!("Queued: {} of {}", result.admitted, result.total);
    info!("Throughput: {:.2} items/sec", rate);
    info!("========================================");
}

/// Deliver the notifications in `args.items`.
pub fn run_deliver(
    args: &DeliverArgs,
    cfg: &RunConfig,
    cancel: &CancellationToken,
) -> Result<AggregateResult> {
    let items = load_notifications(&args.items)?;
    if items.is_empty() {
        warn!("{} contains no notifications", args.items.display());
    }
    cfg.validate_delivery(count_without_chat_id(&items))?;
    info!(
        "Delivering {} notifications with {} workers{}",
        items.len(),
        cfg.workers,
        if cfg.interval.is_zero() {
            String::new()
        } else {
            format!(", one every {:?}", cfg.interval)
        }
    );

    let deliverer = Arc::new(
        Deliverer::open(&cfg.outbox, &cfg.chat_id, cfg.delay).context("open outbox")?,
    );
    debug!("Outbox: {}", deliverer.outbox_path().display());

    let store = Arc::new(Mutex::new(EntityStore::new()));
    let bar = progress_bar(cfg, items.len(), "Delivering");
    let observer = delivery_observer(Arc::new(items.clone()), Arc::clone(&store), bar.clone());

    let start = Instant::now();
    let process = {
        let deliverer = Arc::clone(&deliverer);
        move |n: &Notification, cancel: &CancellationToken| deliverer.deliver(n, cancel)
    };
    let result = run_batch_with_observer(items, &cfg.batch_opts(), process, cancel, observer)?;
    if let Some(ref bar) = bar {
        finish_progress_bar(bar);
    }
    log_summary(
        &result,
        start.elapsed(),
        &[format!(
            "Delivered: {}, failed: {}",
            result.success_count, result.error_count
        )],
    );

    if let Some(ref ledger) = cfg.ledger {
        let store = store.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        store.save(ledger)?;
        info!(
            "Ledger written to {} ({} notifications, {} receipts)",
            ledger.display(),
            store.notifications().len(),
            store.sent().len()
        );
    }
    Ok(result)
}

/// Filter the services in `args.services` and write the matches. Whatever matched before a
/// cancellation is still written.
pub fn run_filter(
    args: &FilterArgs,
    cfg: &RunConfig,
    cancel: &CancellationToken,
) -> Result<AggregateResult> {
    cfg.validate_filter()?;
    let records = load_services(&args.services)?;
    if records.is_empty() {
        warn!("{} contains no services", args.services.display());
    }
    let filter = ServiceFilter::new(cfg.business_line.clone());
    info!(
        "Filtering {} services for business line {:?} with {} workers",
        records.len(),
        filter.business_line(),
        cfg.workers
    );

    let matches = Arc::new(Mutex::new(MatchSet::new()));
    let bar = progress_bar(cfg, records.len(), "Filtering");
    let observer = filter_observer(Arc::clone(&matches), bar.clone());

    let start = Instant::now();
    let process = move |record: &serde_json::Value, _: &CancellationToken| filter.check(record);
    let result = run_batch_with_observer(records, &cfg.batch_opts(), process, cancel, observer)?;
    if let Some(ref bar) = bar {
        finish_progress_bar(bar);
    }

    let matches = matches.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    log_summary(
        &result,
        start.elapsed(),
        &[
            format!("Matching services: {}", matches.len()),
            format!("Malformed records: {}", result.error_count),
        ],
    );
    matches.save(&cfg.filter_output)?;
    info!(
        "{} matches written to {}",
        matches.len(),
        cfg.filter_output.display()
    );
    Ok(result)
}

/// Run the subcommand. A cancelled (partial) batch is an error so the process exits non-zero;
/// everything processed before the stop has already been written out.
pub fn handle_run(cli: &Cli) -> Result<()> {
    setup_logging(cli.verbose.unwrap_or(false));
    let cfg = resolve_config(cli)?;
    set_verbose(cfg.verbose);
    debug!("{} CONFIG:{:#?}", env!("CARGO_PKG_NAME").to_uppercase(), cfg);

    let cancel = CancellationToken::new();
    install_interrupt_handler(&cancel)?;
    if let Some(deadline) = cfg.deadline {
        cancel.cancel_after(deadline)?;
    }

    let result = match &cli.command {
        Command::Deliver(args) => run_deliver(args, &cfg, &cancel)?,
        Command::Filter(args) => run_filter(args, &cfg, &cancel)?,
    };

    if result.shutdown_timed_out {
        warn!("Some workers were still running at exit");
    }
    if result.partial {
        return Err(anyhow::anyhow!(
            "Batch cancelled; {} of {} items processed",
            result.processed(),
            result.total
        ));
    }
    Ok(())
}
