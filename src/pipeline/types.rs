//! Shared types for the decision pipeline.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::InputError;

// ── Inbound records ─────────────────────────────────────────────────

/// Connector wire form of an email. Identity fields may be missing here;
/// `EmailRecord::from_raw` rejects records the pipeline cannot use.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawEmailRecord {
    pub message_id: Option<String>,
    pub thread_id: Option<String>,
    pub from: Option<String>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub thread_position: u32,
    pub labels: Vec<String>,
    pub has_attachments: bool,
    pub awaiting_reply: bool,
}

/// A validated email. Immutable once ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailRecord {
    pub message_id: String,
    pub thread_id: String,
    pub from: String,
    pub to: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    /// 1-based position of this message within its thread.
    pub thread_position: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(default)]
    pub has_attachments: bool,
    /// The mailbox owner is waiting on the counterpart in this thread.
    #[serde(default)]
    pub awaiting_reply: bool,
}

impl EmailRecord {
    /// Validate a raw record. `position` is its index in the fetched batch.
    pub fn from_raw(raw: RawEmailRecord, position: usize) -> Result<Self, InputError> {
        let message_id = raw
            .message_id
            .filter(|id| !id.trim().is_empty())
            .ok_or(InputError::MissingMessageId { position })?;
        let from = raw
            .from
            .map(|f| f.trim().to_string())
            .filter(|f| f.contains('@'))
            .ok_or_else(|| InputError::MissingSender {
                message_id: message_id.clone(),
            })?;
        let timestamp = raw.timestamp.ok_or_else(|| InputError::MissingTimestamp {
            message_id: message_id.clone(),
        })?;
        let thread_id = raw
            .thread_id
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| message_id.clone());

        Ok(Self {
            message_id,
            thread_id,
            from,
            to: raw.to,
            cc: raw.cc,
            bcc: raw.bcc,
            subject: raw.subject,
            body: raw.body,
            timestamp,
            thread_position: raw.thread_position.max(1),
            labels: raw.labels,
            has_attachments: raw.has_attachments,
            awaiting_reply: raw.awaiting_reply,
        })
    }

    /// Subject and body joined for text scanning.
    pub fn full_text(&self) -> String {
        format!("{}\n{}", self.subject, self.body)
    }

    /// Thread signals used by the scorer and categorizer.
    pub fn thread_meta(&self) -> ThreadMeta {
        let subject = self.subject.trim_start().to_lowercase();
        ThreadMeta {
            sent_on: self.timestamp.date_naive(),
            position: self.thread_position,
            is_reply: subject.starts_with("re:") || self.thread_position > 1,
            has_attachments: self.has_attachments,
            awaiting_reply: self.awaiting_reply,
        }
    }
}

impl From<EmailRecord> for RawEmailRecord {
    fn from(record: EmailRecord) -> Self {
        Self {
            message_id: Some(record.message_id),
            thread_id: Some(record.thread_id),
            from: Some(record.from),
            to: record.to,
            cc: record.cc,
            bcc: record.bcc,
            subject: record.subject,
            body: record.body,
            timestamp: Some(record.timestamp),
            thread_position: record.thread_position,
            labels: record.labels,
            has_attachments: record.has_attachments,
            awaiting_reply: record.awaiting_reply,
        }
    }
}

/// Thread-level signals for one email.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThreadMeta {
    pub sent_on: NaiveDate,
    pub position: u32,
    pub is_reply: bool,
    pub has_attachments: bool,
    pub awaiting_reply: bool,
}

// ── Sender profile ──────────────────────────────────────────────────

/// Who the sender is to the mailbox owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderRole {
    Vip,
    Team,
    Vendor,
    Customer,
    Unknown,
}

impl SenderRole {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Vip => "vip",
            Self::Team => "team",
            Self::Vendor => "vendor",
            Self::Customer => "customer",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderProfile {
    pub role: SenderRole,
    pub is_spam_likely: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_domain_rule: Option<String>,
}

// ── Intent ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Question,
    MeetingRequest,
    Deadline,
    CommitmentRequest,
    Fyi,
}

impl Intent {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Question => "question",
            Self::MeetingRequest => "meeting_request",
            Self::Deadline => "deadline",
            Self::CommitmentRequest => "commitment_request",
            Self::Fyi => "fyi",
        }
    }

    /// Intents that, on their own, make an email actionable.
    pub fn is_actionable(&self) -> bool {
        match self {
            Self::Question | Self::Deadline | Self::CommitmentRequest => true,
            Self::MeetingRequest | Self::Fyi => false,
        }
    }
}

/// A deadline phrase and the calendar date it resolves to, relative to the
/// email's own timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedDeadline {
    pub phrase: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentResult {
    pub intents: BTreeSet<Intent>,
    pub urgency_keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_deadline: Option<ExtractedDeadline>,
    pub is_polite: bool,
}

impl IntentResult {
    pub fn has(&self, intent: Intent) -> bool {
        self.intents.contains(&intent)
    }

    pub fn has_actionable_intent(&self) -> bool {
        self.intents.iter().any(Intent::is_actionable)
    }

    /// Question + FYI with no commitment verb reads both ways.
    pub fn is_ambiguous(&self) -> bool {
        self.has(Intent::Question)
            && self.has(Intent::Fyi)
            && !self.has(Intent::CommitmentRequest)
    }
}

// ── Priority ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityLevel {
    High,
    Medium,
    Low,
    NotRequired,
}

impl PriorityLevel {
    pub fn from_score(value: u8, high_threshold: u8) -> Self {
        if value >= high_threshold {
            Self::High
        } else if value >= 50 {
            Self::Medium
        } else if value >= 30 {
            Self::Low
        } else {
            Self::NotRequired
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::NotRequired => "not_required",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorityScore {
    pub value: u8,
    pub level: PriorityLevel,
    pub evidence: Vec<String>,
    pub reasoning: String,
    pub confidence: f32,
    pub hidden_urgency: bool,
}

// ── Category ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Action,
    Fyi,
    Waiting,
    Spam,
    Legal,
    Finance,
}

impl Category {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Action => "action",
            Self::Fyi => "fyi",
            Self::Waiting => "waiting",
            Self::Spam => "spam",
            Self::Legal => "legal",
            Self::Finance => "finance",
        }
    }
}

/// Outcome of the spam check, with its own evidence trail.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpamVerdict {
    pub is_spam: bool,
    pub score: u32,
    pub evidence: Vec<String>,
}

// ── Flags ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagKind {
    Pii,
    Domain,
    Tone,
    Legal,
    Finance,
}

impl FlagKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pii => "pii",
            Self::Domain => "domain",
            Self::Tone => "tone",
            Self::Legal => "legal",
            Self::Finance => "finance",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// A guardrail or escalation finding. Flags are append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityFlag {
    pub kind: FlagKind,
    pub severity: Severity,
    pub description: String,
    pub blocks_send: bool,
}

impl SecurityFlag {
    pub fn blocking(kind: FlagKind, severity: Severity, description: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            description: description.into(),
            blocks_send: true,
        }
    }

    pub fn advisory(kind: FlagKind, severity: Severity, description: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            description: description.into(),
            blocks_send: false,
        }
    }
}

// ── Drafting ────────────────────────────────────────────────────────

/// The recipient set a reply to this email would address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyEnvelope {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub external_recipient_count: usize,
    pub reply_all_risk: bool,
}

impl ReplyEnvelope {
    pub fn total_recipients(&self) -> usize {
        self.to.len() + self.cc.len()
    }

    pub fn recipients(&self) -> impl Iterator<Item = &String> {
        self.to.iter().chain(self.cc.iter())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftReply {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub subject: String,
    pub body: String,
    pub tone_label: String,
    pub external_recipient_count: usize,
    pub reply_all_risk: bool,
    /// Set by the approval gate, never by the generator.
    pub requires_approval: bool,
    pub reasoning: String,
    pub confidence: f32,
    pub evidence: Vec<String>,
    /// The template stood in for a failed or timed-out generator.
    #[serde(default)]
    pub used_fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUp {
    pub message_id: String,
    pub subject: String,
    pub suggested_date: NaiveDate,
    pub reason: String,
    pub draft_message: String,
}

// ── Disposition ─────────────────────────────────────────────────────

/// Terminal routing decision for one email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Disposition {
    AutoSafe,
    NeedsApproval,
    Blocked,
    Superseded,
}

impl Disposition {
    pub fn label(&self) -> &'static str {
        match self {
            Self::AutoSafe => "autoSafe",
            Self::NeedsApproval => "needsApproval",
            Self::Blocked => "blocked",
            Self::Superseded => "superseded",
        }
    }
}

// ── Thread context ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Sentiment {
    Positive,
    #[default]
    Neutral,
    Negative,
    Urgent,
}

impl Sentiment {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
            Self::Urgent => "urgent",
        }
    }
}

/// What the batch shows of one thread. Shared by every record in it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadSummary {
    pub summary: String,
    /// Distinct subjects, oldest first.
    pub key_points: Vec<String>,
    pub decisions: Vec<String>,
    pub open_questions: Vec<String>,
    pub action_items: Vec<String>,
    pub participants: Vec<String>,
    pub sentiment: Sentiment,
    pub message_count: usize,
}

// ── Decision record ─────────────────────────────────────────────────

/// Everything the pipeline decided about one email, kept for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRecord {
    pub message_id: String,
    pub thread_id: String,
    pub from: String,
    pub subject: String,
    pub timestamp: DateTime<Utc>,
    /// Redacted opening of the body.
    pub preview: String,
    pub sender: SenderProfile,
    pub intent: IntentResult,
    pub score: PriorityScore,
    pub spam: SpamVerdict,
    pub category: Category,
    /// Name of the precedence rule that assigned the category.
    pub category_rule: String,
    pub flags: Vec<SecurityFlag>,
    pub envelope: ReplyEnvelope,
    #[serde(default)]
    pub thread: ThreadSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft: Option<DraftReply>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up: Option<FollowUp>,
    pub disposition: Disposition,
    /// Message id of the email that replaced this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<String>,
    pub notes: Vec<String>,
}

impl DecisionRecord {
    pub fn is_active(&self) -> bool {
        !matches!(self.disposition, Disposition::Blocked | Disposition::Superseded)
    }

    pub fn blocking_flags(&self) -> impl Iterator<Item = &SecurityFlag> {
        self.flags.iter().filter(|f| f.blocks_send)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn raw() -> RawEmailRecord {
        RawEmailRecord {
            message_id: Some("m1".into()),
            thread_id: None,
            from: Some("alice@example.com".into()),
            to: vec!["me@corp.com".into()],
            subject: "Re: Budget".into(),
            body: "Numbers attached".into(),
            timestamp: Some(Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap()),
            ..Default::default()
        }
    }

    #[test]
    fn valid_raw_record_converts() {
        let record = EmailRecord::from_raw(raw(), 0).unwrap();
        assert_eq!(record.thread_id, "m1");
        assert_eq!(record.thread_position, 1);
        assert!(record.thread_meta().is_reply);
    }

    #[test]
    fn missing_sender_is_rejected() {
        let mut r = raw();
        r.from = Some("   ".into());
        assert_eq!(
            EmailRecord::from_raw(r, 0),
            Err(InputError::MissingSender {
                message_id: "m1".into()
            })
        );
    }

    #[test]
    fn missing_timestamp_is_rejected() {
        let mut r = raw();
        r.timestamp = None;
        assert!(matches!(
            EmailRecord::from_raw(r, 0),
            Err(InputError::MissingTimestamp { .. })
        ));
    }

    #[test]
    fn missing_message_id_reports_position() {
        let mut r = raw();
        r.message_id = None;
        assert_eq!(
            EmailRecord::from_raw(r, 7),
            Err(InputError::MissingMessageId { position: 7 })
        );
    }

    #[test]
    fn priority_levels_follow_threshold() {
        assert_eq!(PriorityLevel::from_score(70, 70), PriorityLevel::High);
        assert_eq!(PriorityLevel::from_score(69, 70), PriorityLevel::Medium);
        assert_eq!(PriorityLevel::from_score(30, 70), PriorityLevel::Low);
        assert_eq!(PriorityLevel::from_score(29, 70), PriorityLevel::NotRequired);
    }

    #[test]
    fn enums_serialize_with_contract_names() {
        assert_eq!(
            serde_json::to_value(Intent::MeetingRequest).unwrap(),
            "meeting_request"
        );
        assert_eq!(
            serde_json::to_value(Disposition::NeedsApproval).unwrap(),
            "needsApproval"
        );
        let flag = SecurityFlag::blocking(FlagKind::Pii, Severity::High, "ssn");
        let json = serde_json::to_value(&flag).unwrap();
        assert_eq!(json["blocksSend"], true);
        assert_eq!(json["kind"], "pii");
    }

    #[test]
    fn ambiguity_requires_question_and_fyi_without_commitment() {
        let mut intent = IntentResult::default();
        intent.intents.insert(Intent::Question);
        intent.intents.insert(Intent::Fyi);
        assert!(intent.is_ambiguous());
        intent.intents.insert(Intent::CommitmentRequest);
        assert!(!intent.is_ambiguous());
    }
}
