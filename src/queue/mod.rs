//! Decision queue assembly.
//!
//! Pure aggregation over finished `DecisionRecord`s: no classification runs
//! here. Output field names are the downstream contract.

pub mod metrics;

pub use metrics::MetricsReport;

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::pipeline::types::{
    Category, DecisionRecord, Disposition, DraftReply, FollowUp, PriorityLevel, SecurityFlag,
};

/// Namespace for batch ids, so identical inputs hash to identical ids.
const BATCH_NAMESPACE: Uuid = Uuid::from_u128(0x6f0e_2d1c_8a4b_4e7f_9c3d_5b2a_1e0f_7d64);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSummary {
    pub total_processed: usize,
    pub high_priority: usize,
    pub drafts_created: usize,
    pub needs_approval: usize,
    pub blocked: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadlineEmail {
    pub message_id: String,
    pub thread_id: String,
    pub from: String,
    pub subject: String,
    pub timestamp: DateTime<Utc>,
    pub score: u8,
    pub level: PriorityLevel,
    pub category: Category,
    pub disposition: Disposition,
    pub hidden_urgency: bool,
    pub reasoning: String,
    pub evidence: Vec<String>,
    pub thread_summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftItem {
    pub message_id: String,
    pub disposition: Disposition,
    pub draft: DraftReply,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedItem {
    pub message_id: String,
    pub from: String,
    pub subject: String,
    pub category: Category,
    pub preview: String,
    pub reasons: Vec<String>,
    pub flags: Vec<SecurityFlag>,
}

/// The single output object of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionQueue {
    pub batch_id: Uuid,
    pub summary: QueueSummary,
    pub headline_emails: Vec<HeadlineEmail>,
    pub draft_replies: Vec<DraftItem>,
    pub follow_ups: Vec<FollowUp>,
    pub blocked_items: Vec<BlockedItem>,
}

impl DecisionQueue {
    /// Queue for a run that produced nothing, e.g. after an ingestion failure.
    pub fn empty(batch_id: Uuid) -> Self {
        Self {
            batch_id,
            summary: QueueSummary {
                total_processed: 0,
                high_priority: 0,
                drafts_created: 0,
                needs_approval: 0,
                blocked: 0,
            },
            headline_emails: Vec::new(),
            draft_replies: Vec::new(),
            follow_ups: Vec::new(),
            blocked_items: Vec::new(),
        }
    }
}

/// UUIDv5 over the sorted message ids.
pub fn batch_id<'a>(message_ids: impl IntoIterator<Item = &'a str>) -> Uuid {
    let mut ids: Vec<&str> = message_ids.into_iter().collect();
    ids.sort_unstable();
    Uuid::new_v5(&BATCH_NAMESPACE, ids.join("\n").as_bytes())
}

/// Score descending, then oldest first, then message id.
fn queue_order(a: &DecisionRecord, b: &DecisionRecord) -> Ordering {
    b.score
        .value
        .cmp(&a.score.value)
        .then_with(|| a.timestamp.cmp(&b.timestamp))
        .then_with(|| a.message_id.cmp(&b.message_id))
}

pub struct QueueBuilder {
    max_headline: usize,
}

impl QueueBuilder {
    pub fn new(max_headline: usize) -> Self {
        Self { max_headline }
    }

    pub fn build(&self, batch_id: Uuid, records: &[DecisionRecord]) -> DecisionQueue {
        let mut active: Vec<&DecisionRecord> = records.iter().filter(|r| r.is_active()).collect();
        active.sort_by(|a, b| queue_order(a, b));

        let mut blocked: Vec<&DecisionRecord> = records
            .iter()
            .filter(|r| r.disposition == Disposition::Blocked)
            .collect();
        blocked.sort_by(|a, b| queue_order(a, b));

        let headline_emails: Vec<HeadlineEmail> = active
            .iter()
            .take(self.max_headline)
            .map(|r| headline(r))
            .collect();

        let draft_replies: Vec<DraftItem> = active
            .iter()
            .filter_map(|r| {
                r.draft.as_ref().map(|draft| DraftItem {
                    message_id: r.message_id.clone(),
                    disposition: r.disposition,
                    draft: draft.clone(),
                })
            })
            .collect();

        let follow_ups: Vec<FollowUp> = active
            .iter()
            .filter_map(|r| r.follow_up.clone())
            .collect();

        let blocked_items: Vec<BlockedItem> = blocked.iter().map(|r| blocked_item(r)).collect();

        let summary = QueueSummary {
            total_processed: records.len(),
            high_priority: records
                .iter()
                .filter(|r| r.disposition != Disposition::Superseded)
                .filter(|r| r.score.level == PriorityLevel::High)
                .count(),
            // drafts on blocked or superseded records are withheld, not created
            drafts_created: draft_replies.len(),
            needs_approval: records
                .iter()
                .filter(|r| r.disposition == Disposition::NeedsApproval)
                .count(),
            blocked: blocked_items.len(),
        };

        info!(
            batch_id = %batch_id,
            total = summary.total_processed,
            high_priority = summary.high_priority,
            drafts = summary.drafts_created,
            needs_approval = summary.needs_approval,
            blocked = summary.blocked,
            "Decision queue assembled"
        );

        DecisionQueue {
            batch_id,
            summary,
            headline_emails,
            draft_replies,
            follow_ups,
            blocked_items,
        }
    }
}

fn headline(record: &DecisionRecord) -> HeadlineEmail {
    HeadlineEmail {
        message_id: record.message_id.clone(),
        thread_id: record.thread_id.clone(),
        from: record.from.clone(),
        subject: record.subject.clone(),
        timestamp: record.timestamp,
        score: record.score.value,
        level: record.score.level,
        category: record.category,
        disposition: record.disposition,
        hidden_urgency: record.score.hidden_urgency,
        reasoning: record.score.reasoning.clone(),
        evidence: record.score.evidence.clone(),
        thread_summary: record.thread.summary.clone(),
    }
}

fn blocked_item(record: &DecisionRecord) -> BlockedItem {
    let mut reasons: Vec<String> = record
        .blocking_flags()
        .map(|f| f.description.clone())
        .collect();
    if record.spam.is_spam {
        reasons.push(format!("Spam (score {})", record.spam.score));
    }
    BlockedItem {
        message_id: record.message_id.clone(),
        from: record.from.clone(),
        subject: record.subject.clone(),
        category: record.category,
        preview: record.preview.clone(),
        reasons,
        flags: record.flags.clone(),
    }
}
