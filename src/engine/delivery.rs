//! Notification delivery: the job the CLI runs through the pipeline.
//!
//! Each notification is appended as one JSON line to an outbox file, standing in for the chat
//! API call. A successful write yields a [`SentReceipt`] with a sequential message id.

use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use crate::cancel::CancellationToken;
use crate::error::DeliveryError;

/// Message to deliver. `chat_id` may be omitted in the input file; the configured default
/// chat is used then.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(default)]
    pub chat_id: String,
    pub text: String,
}

impl Notification {
    pub fn new(chat_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            text: text.into(),
        }
    }
}

/// Acknowledgement for a delivered notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentReceipt {
    pub message_id: i64,
    pub chat_id: String,
}

/// Line written to the outbox.
#[derive(Serialize)]
struct OutboxRecord<'a> {
    message_id: i64,
    chat_id: &'a str,
    text: &'a str,
}

/// Read a batch: a JSON array of notifications, or of plain strings (text only).
pub fn load_notifications(path: &Path) -> anyhow::Result<Vec<Notification>> {
    use anyhow::Context;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum InputItem {
        Text(String),
        Full(Notification),
    }

    let data = std::fs::read_to_string(path)
        .with_context(|| format!("read items file {}", path.display()))?;
    let items: Vec<InputItem> = serde_json::from_str(&data)
        .with_context(|| format!("parse items file {}", path.display()))?;
    Ok(items
        .into_iter()
        .map(|i| match i {
            InputItem::Text(text) => Notification::new(String::new(), text),
            InputItem::Full(n) => n,
        })
        .collect())
}

/// Delivers notifications to a JSON-lines outbox. Shared by all workers.
pub struct Deliverer {
    outbox_path: PathBuf,
    outbox: Mutex<BufWriter<File>>,
    default_chat_id: String,
    /// Simulated per-message latency; honours cancellation.
    delay: Duration,
    next_message_id: AtomicI64,
}

impl Deliverer {
    /// Open (append) the outbox at `outbox_path`.
    pub fn open(
        outbox_path: &Path,
        default_chat_id: &str,
        delay: Duration,
    ) -> Result<Self, DeliveryError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(outbox_path)
            .map_err(|source| DeliveryError::Outbox {
                path: outbox_path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            outbox_path: outbox_path.to_path_buf(),
            outbox: Mutex::new(BufWriter::new(file)),
            default_chat_id: default_chat_id.to_string(),
            delay,
            next_message_id: AtomicI64::new(1),
        })
    }

    pub fn outbox_path(&self) -> &Path {
        &self.outbox_path
    }

    /// Deliver one notification. Checks the token before starting and while waiting out the
    /// simulated latency.
    pub fn deliver(
        &self,
        notification: &Notification,
        cancel: &CancellationToken,
    ) -> Result<SentReceipt, DeliveryError> {
        if cancel.is_cancelled() {
            return Err(DeliveryError::Cancelled);
        }
        if notification.text.trim().is_empty() {
            return Err(DeliveryError::EmptyText);
        }
        let chat_id = if notification.chat_id.is_empty() {
            self.default_chat_id.as_str()
        } else {
            notification.chat_id.as_str()
        };
        if chat_id.is_empty() {
            return Err(DeliveryError::MissingChatId);
        }
        if !self.delay.is_zero() && cancel.wait_timeout(self.delay) {
            return Err(DeliveryError::Cancelled);
        }

        let message_id = self.next_message_id.fetch_add(1, Ordering::Relaxed);
        let line = serde_json::to_string(&OutboxRecord {
            message_id,
            chat_id,
            text: &notification.text,
        })?;
        let mut out = self
            .outbox
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        writeln!(out, "{line}")
            .and_then(|_| out.flush())
            .map_err(|source| DeliveryError::Outbox {
                path: self.outbox_path.clone(),
                source,
            })?;
        Ok(SentReceipt {
            message_id,
            chat_id: chat_id.to_string(),
        })
    }
}
