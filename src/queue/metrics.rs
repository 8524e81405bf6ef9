//! Per-run metrics, folded from decision records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::pipeline::types::{DecisionRecord, Disposition, SenderRole};

const TRIAGE_MINUTES: u32 = 2;
const CATEGORIZE_MINUTES: u32 = 1;
const DRAFT_MINUTES: u32 = 5;
const FOLLOW_UP_MINUTES: u32 = 2;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsReport {
    pub total_emails: usize,
    pub skipped_records: usize,
    /// Keyed by category label.
    pub category_counts: BTreeMap<String, usize>,
    pub vip_count: usize,
    pub hidden_urgency_count: usize,
    pub reply_all_risk_count: usize,
    pub flag_count: usize,
    pub superseded_count: usize,
    pub fallback_drafts: usize,
    pub estimated_minutes_saved: u32,
}

impl MetricsReport {
    pub fn from_records(records: &[DecisionRecord], skipped_records: usize) -> Self {
        let mut report = Self {
            total_emails: records.len(),
            skipped_records,
            ..Default::default()
        };

        for record in records {
            *report
                .category_counts
                .entry(record.category.label().to_string())
                .or_default() += 1;
            if record.sender.role == SenderRole::Vip {
                report.vip_count += 1;
            }
            if record.score.hidden_urgency {
                report.hidden_urgency_count += 1;
            }
            if record.envelope.reply_all_risk {
                report.reply_all_risk_count += 1;
            }
            if record.disposition == Disposition::Superseded {
                report.superseded_count += 1;
            }
            report.flag_count += record.flags.len();

            report.estimated_minutes_saved += TRIAGE_MINUTES + CATEGORIZE_MINUTES;
            if let Some(draft) = &record.draft {
                report.estimated_minutes_saved += DRAFT_MINUTES;
                if draft.used_fallback {
                    report.fallback_drafts += 1;
                }
            }
            if record.follow_up.is_some() {
                report.estimated_minutes_saved += FOLLOW_UP_MINUTES;
            }
        }
        report
    }
}
