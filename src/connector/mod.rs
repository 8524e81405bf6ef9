//! Mail-store connectors.
//!
//! A connector returns raw records; validation happens in the pipeline. An
//! empty result is a valid batch. Failures are `ConnectorError`s and are not
//! retried here.

pub mod eml;
pub mod json;

pub use eml::EmlDirConnector;
pub use json::JsonFileConnector;

use async_trait::async_trait;
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::error::ConnectorError;
use crate::pipeline::types::RawEmailRecord;

/// What to fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FetchScope {
    /// Keep records within this many days of the newest record.
    pub time_range_days: Option<u32>,
    /// Case-insensitive substring over sender, subject and body.
    pub query: Option<String>,
    pub max_results: Option<usize>,
}

#[async_trait]
pub trait MailConnector: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self, scope: &FetchScope) -> Result<Vec<RawEmailRecord>, ConnectorError>;
}

/// Apply a scope to already-loaded records, preserving order.
///
/// The time window is anchored on the newest timestamp in the set rather
/// than the wall clock, so the same files always give the same batch. A
/// window too wide to represent means no cutoff.
pub fn apply_scope(records: Vec<RawEmailRecord>, scope: &FetchScope) -> Vec<RawEmailRecord> {
    let newest = records.iter().filter_map(|r| r.timestamp).max();
    let cutoff = match (scope.time_range_days, newest) {
        (Some(days), Some(newest)) => TimeDelta::try_days(i64::from(days))
            .and_then(|window| newest.checked_sub_signed(window)),
        _ => None,
    };
    let query = scope
        .query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_lowercase);

    records
        .into_iter()
        .filter(|r| match (cutoff, r.timestamp) {
            (Some(cutoff), Some(ts)) => ts >= cutoff,
            _ => true,
        })
        .filter(|r| match &query {
            Some(q) => {
                r.from.as_deref().unwrap_or_default().to_lowercase().contains(q)
                    || r.subject.to_lowercase().contains(q)
                    || r.body.to_lowercase().contains(q)
            }
            None => true,
        })
        .take(scope.max_results.unwrap_or(usize::MAX))
        .collect()
}

/// Records held in memory. Used by tests and embedding callers.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    records: Vec<RawEmailRecord>,
}

impl MemoryConnector {
    pub fn new(records: Vec<RawEmailRecord>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl MailConnector for MemoryConnector {
    fn name(&self) -> &str {
        "memory"
    }

    async fn fetch(&self, scope: &FetchScope) -> Result<Vec<RawEmailRecord>, ConnectorError> {
        Ok(apply_scope(self.records.clone(), scope))
    }
}
