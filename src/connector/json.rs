//! JSON file connector.
//!
//! Accepts either a bare array of records or an object with an `emails` array.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use super::{FetchScope, MailConnector, apply_scope};
use crate::error::ConnectorError;
use crate::pipeline::types::RawEmailRecord;

#[derive(Deserialize)]
#[serde(untagged)]
enum RecordFile {
    Bare(Vec<RawEmailRecord>),
    Wrapped { emails: Vec<RawEmailRecord> },
}

pub struct JsonFileConnector {
    path: PathBuf,
}

impl JsonFileConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn source_name(&self) -> String {
        self.path.display().to_string()
    }
}

#[async_trait]
impl MailConnector for JsonFileConnector {
    fn name(&self) -> &str {
        "json-file"
    }

    async fn fetch(&self, scope: &FetchScope) -> Result<Vec<RawEmailRecord>, ConnectorError> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            ConnectorError::Unavailable {
                source_name: self.source_name(),
                reason: e.to_string(),
            }
        })?;

        let file: RecordFile =
            serde_json::from_str(&content).map_err(|e| ConnectorError::Malformed {
                source_name: self.source_name(),
                reason: e.to_string(),
            })?;
        let records = match file {
            RecordFile::Bare(records) | RecordFile::Wrapped { emails: records } => records,
        };

        let scoped = apply_scope(records, scope);
        info!(source = %self.source_name(), count = scoped.len(), "Loaded records");
        Ok(scoped)
    }
}
