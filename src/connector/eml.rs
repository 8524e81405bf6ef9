//! Directory of RFC 5322 `.eml` files.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::DateTime;
use mail_parser::{HeaderValue, MessageParser, MimeHeaders};
use tracing::{debug, info, warn};

use super::{FetchScope, MailConnector, apply_scope};
use crate::error::ConnectorError;
use crate::pipeline::types::RawEmailRecord;

const LABELS_HEADER: &str = "X-Gmail-Labels";

/// Reads every `*.eml` file in one directory, in file-name order.
///
/// Files that do not parse are logged and skipped. Fields the message lacks
/// stay empty so the pipeline can reject the record with a reason.
pub struct EmlDirConnector {
    dir: PathBuf,
}

impl EmlDirConnector {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn unavailable(&self, reason: impl ToString) -> ConnectorError {
        ConnectorError::Unavailable {
            source_name: self.dir.display().to_string(),
            reason: reason.to_string(),
        }
    }

    async fn list_files(&self) -> Result<Vec<PathBuf>, ConnectorError> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| self.unavailable(e))?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| self.unavailable(e))? {
            let path = entry.path();
            if is_eml(&path) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl MailConnector for EmlDirConnector {
    fn name(&self) -> &str {
        "eml-dir"
    }

    async fn fetch(&self, scope: &FetchScope) -> Result<Vec<RawEmailRecord>, ConnectorError> {
        let files = self.list_files().await?;
        let mut records = Vec::with_capacity(files.len());
        for path in &files {
            let bytes = match tokio::fs::read(path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Unreadable message file, skipping");
                    continue;
                }
            };
            match parse_message(&bytes) {
                Some(record) => records.push(record),
                None => warn!(path = %path.display(), "Unparsable message file, skipping"),
            }
        }

        let scoped = apply_scope(records, scope);
        info!(
            dir = %self.dir.display(),
            files = files.len(),
            count = scoped.len(),
            "Loaded messages"
        );
        Ok(scoped)
    }
}

/// Parse one message into a raw record.
pub fn parse_message(bytes: &[u8]) -> Option<RawEmailRecord> {
    let parsed = MessageParser::default().parse(bytes)?;

    let message_id = parsed.message_id().map(str::to_string);
    let references = header_ids(parsed.references());
    let in_reply_to = header_ids(parsed.in_reply_to());
    let thread_id = references
        .first()
        .or_else(|| in_reply_to.first())
        .cloned()
        .or_else(|| message_id.clone());
    let thread_position = u32::try_from(references.len().max(in_reply_to.len()))
        .unwrap_or(u32::MAX)
        .saturating_add(1);

    let labels = parsed
        .headers()
        .iter()
        .find(|h| h.name().eq_ignore_ascii_case(LABELS_HEADER))
        .and_then(|h| h.value().as_text())
        .map(|v| {
            v.split(',')
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let record = RawEmailRecord {
        message_id,
        thread_id,
        from: extract_sender(&parsed),
        to: extract_addresses(parsed.to()),
        cc: extract_addresses(parsed.cc()),
        bcc: extract_addresses(parsed.bcc()),
        subject: parsed.subject().unwrap_or_default().to_string(),
        body: strip_quoted_text(&extract_text(&parsed)),
        timestamp: parsed
            .date()
            .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0)),
        thread_position,
        labels,
        has_attachments: parsed.attachment_count() > 0,
        awaiting_reply: false,
    };
    debug!(message_id = ?record.message_id, "Parsed message");
    Some(record)
}

fn header_ids(value: &HeaderValue) -> Vec<String> {
    match value {
        HeaderValue::Text(id) => vec![id.to_string()],
        HeaderValue::TextList(ids) => ids.iter().map(|id| id.to_string()).collect(),
        _ => Vec::new(),
    }
}

fn extract_sender(parsed: &mail_parser::Message) -> Option<String> {
    parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.to_lowercase())
}

pub fn extract_addresses(addr: Option<&mail_parser::Address>) -> Vec<String> {
    let Some(addr) = addr else {
        return Vec::new();
    };
    match addr {
        mail_parser::Address::List(addrs) => addrs
            .iter()
            .filter_map(|a| a.address.as_ref().map(|s| s.to_lowercase()))
            .collect(),
        mail_parser::Address::Group(groups) => groups
            .iter()
            .flat_map(|g| {
                g.addresses
                    .iter()
                    .filter_map(|a| a.address.as_ref().map(|s| s.to_lowercase()))
            })
            .collect(),
    }
}

/// Plain text part, else de-tagged HTML, else the first text attachment.
fn extract_text(parsed: &mail_parser::Message) -> String {
    if let Some(text) = parsed.body_text(0) {
        return text.to_string();
    }
    if let Some(html) = parsed.body_html(0) {
        return strip_html(html.as_ref());
    }
    for part in parsed.attachments() {
        if let Some(ct) = MimeHeaders::content_type(part)
            && ct.ctype() == "text"
            && let Ok(text) = std::str::from_utf8(part.contents())
        {
            return text.to_string();
        }
    }
    String::new()
}

fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Drop quoted history so earlier messages in the thread are not re-scored.
pub fn strip_quoted_text(body: &str) -> String {
    let mut result = Vec::new();

    for line in body.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('>') {
            continue;
        }
        // "On Mon, Jan 1, 2026 at 10:00 AM Alice <alice@ex.com> wrote:"
        if trimmed.starts_with("On ") && trimmed.ends_with("wrote:") {
            break;
        }
        if trimmed.starts_with("---") && trimmed.contains("Original Message") {
            break;
        }
        result.push(line);
    }

    while result.last().is_some_and(|l| l.trim().is_empty()) {
        result.pop();
    }
    result.join("\n")
}

fn is_eml(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("eml"))
}
