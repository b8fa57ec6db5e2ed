//! Cancellation token shared by every stage of a batch.
//!
//! The flag is an `AtomicBool` for cheap checks. For blocking points the token also hands out a
//! [`Receiver`] that never carries a message but becomes disconnected the moment the token is
//! cancelled, so it can sit in a `crossbeam_channel::select!` next to the data channel.

use anyhow::Context;
use crossbeam_channel::{Receiver, Sender, after, bounded, select};
use log::{info, warn};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::error::PipelineError;

struct Inner {
    cancelled: AtomicBool,
    /// Dropped on cancel; every subscribed receiver then reports disconnection.
    trigger: Mutex<Option<Sender<()>>>,
    signal: Receiver<()>,
}

/// Set-once cancellation signal. Clones share the same state; a new run needs a new token.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        let (trigger, signal) = bounded::<()>(0);
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                trigger: Mutex::new(Some(trigger)),
                signal,
            }),
        }
    }

    /// Cancel. Returns true only for the call that actually flipped the flag.
    pub fn cancel(&self) -> bool {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return false;
        }
        let trigger = self
            .inner
            .trigger
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        drop(trigger);
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Receiver that becomes ready (disconnected) once the token is cancelled.
    /// Use it as the "cancelled" arm of a `select!`.
    pub fn subscribe(&self) -> Receiver<()> {
        self.inner.signal.clone()
    }

    /// Block until cancelled or `timeout` elapses. Returns true if cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let signal = self.subscribe();
        select! {
            recv(signal) -> _ => true,
            recv(after(timeout)) -> _ => self.is_cancelled(),
        }
    }

    /// Cancel after `deadline` unless cancelled earlier. The timer thread exits as soon as
    /// either happens.
    pub fn cancel_after(
        &self,
        deadline: Duration,
    ) -> Result<thread::JoinHandle<()>, PipelineError> {
        let token = self.clone();
        thread::Builder::new()
            .name(format!("{}-deadline", env!("CARGO_PKG_NAME")))
            .spawn(move || {
                if !token.wait_timeout(deadline) && token.cancel() {
                    info!("Deadline of {:?} reached; cancelling batch", deadline);
                }
            })
            .map_err(|e| PipelineError::Spawn {
                role: "deadline",
                reason: e.to_string(),
            })
    }
}

/// Wire Ctrl+C / SIGTERM to `token`. The first signal cancels; a second one exits the process
/// immediately with status 130. Can be installed once per process.
pub fn install_interrupt_handler(token: &CancellationToken) -> anyhow::Result<()> {
    let token = token.clone();
    let hits = AtomicUsize::new(0);
    ctrlc::set_handler(move || {
        if hits.fetch_add(1, Ordering::SeqCst) == 0 {
            warn!("Stop signal received; shutting down gracefully (press Ctrl+C again to force)");
            token.cancel();
        } else {
            warn!("Forced exit");
            std::process::exit(130);
        }
    })
    .context("set Ctrl+C handler")
}
