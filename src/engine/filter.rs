//! Service filter: the second job the CLI runs through the pipeline.
//!
//! Keeps services that were never deprecated (zero deprecation date) and belong to one business
//! line. Records are decoded per item, so a malformed record fails on its own instead of
//! failing the whole file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::error::FilterError;

/// Deprecation date carried by services that are still active.
pub const ACTIVE_DEPRECATED_DATE: &str = "0001-01-01T00:00:00Z";

/// One record of the services file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub tenant: String,
    #[serde(default)]
    pub deprecated_date: String,
    #[serde(rename = "businessLine", default)]
    pub business_line: String,
}

impl Service {
    pub fn is_active(&self) -> bool {
        self.deprecated_date == ACTIVE_DEPRECATED_DATE
    }
}

/// What is written out for a service that passed the filter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceMatch {
    pub id: i64,
    pub name: String,
    pub tenant: String,
}

impl From<&Service> for ServiceMatch {
    fn from(svc: &Service) -> Self {
        Self {
            id: svc.id,
            name: svc.name.clone(),
            tenant: svc.tenant.clone(),
        }
    }
}

/// Read the services file as raw records (a JSON array); each one is decoded by a worker.
pub fn load_services(path: &Path) -> Result<Vec<Value>> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("read services file {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parse services file {}", path.display()))
}

#[derive(Clone, Debug)]
pub struct ServiceFilter {
    business_line: String,
}

impl ServiceFilter {
    pub fn new(business_line: impl Into<String>) -> Self {
        Self {
            business_line: business_line.into(),
        }
    }

    pub fn business_line(&self) -> &str {
        &self.business_line
    }

    pub fn matches(&self, svc: &Service) -> bool {
        svc.is_active() && svc.business_line == self.business_line
    }

    /// Decode one record; `Some` when it passes the filter.
    pub fn check(&self, record: &Value) -> Result<Option<ServiceMatch>, FilterError> {
        let svc = Service::deserialize(record)?;
        Ok(self.matches(&svc).then(|| ServiceMatch::from(&svc)))
    }
}

/// Matches gathered by the outcome observer. Arrival order depends on scheduling, so the saved
/// file is sorted by id.
#[derive(Debug, Default)]
pub struct MatchSet {
    matches: Vec<ServiceMatch>,
}

impl MatchSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, m: ServiceMatch) {
        self.matches.push(m);
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Matches sorted by id.
    pub fn sorted(&self) -> Vec<ServiceMatch> {
        let mut out = self.matches.clone();
        out.sort_by_key(|m| m.id);
        out
    }

    /// Write the matches as a pretty JSON array to `path` (overwrites).
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.sorted()).context("encode matches")?;
        std::fs::write(path, json).with_context(|| format!("write matches {}", path.display()))
    }
}
