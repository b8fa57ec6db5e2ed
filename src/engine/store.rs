//! In-memory record of what a batch sent, fed from the collector's outcome observer.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use super::delivery::{Notification, SentReceipt};

/// Everything the store accepts. Closed set, matched exhaustively.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoredEntity {
    Notification(Notification),
    Sent(SentReceipt),
}

#[derive(Debug, Default, Serialize)]
pub struct EntityStore {
    notifications: Vec<Notification>,
    sent: Vec<SentReceipt>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&mut self, entity: StoredEntity) {
        match entity {
            StoredEntity::Notification(n) => self.notifications.push(n),
            StoredEntity::Sent(s) => {
                log::debug!(
                    "Stored receipt: message_id={}, chat_id={}",
                    s.message_id,
                    s.chat_id
                );
                self.sent.push(s);
            }
        }
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn sent(&self) -> &[SentReceipt] {
        &self.sent
    }

    /// Write the store as pretty JSON to `path` (overwrites).
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("encode ledger")?;
        std::fs::write(path, json).with_context(|| format!("write ledger {}", path.display()))
    }
}
