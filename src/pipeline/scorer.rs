//! Priority scoring.
//!
//! Every rule that adds points pushes one evidence line, so the evidence list
//! reads as the score's derivation in firing order.

use crate::config::TriageConfig;
use crate::pipeline::types::{
    Intent, IntentResult, PriorityLevel, PriorityScore, SenderProfile, SenderRole, ThreadMeta,
};

const URGENCY_POINTS: u32 = 10;
const URGENCY_CAP: u32 = 20;
const COMMITMENT_POINTS: u32 = 10;
const QUESTION_POINTS: u32 = 5;
const NEAR_DEADLINE_POINTS: u32 = 10;
const REPLY_THREAD_POINTS: u32 = 5;
const ATTACHMENT_POINTS: u32 = 2;

fn base_points(role: SenderRole) -> u32 {
    match role {
        SenderRole::Vip => 40,
        SenderRole::Team => 30,
        SenderRole::Customer => 25,
        SenderRole::Vendor => 15,
        SenderRole::Unknown => 5,
    }
}

/// Stateless scorer; holds only the thresholds it reads from config.
#[derive(Debug, Clone)]
pub struct PriorityScorer {
    priority_threshold: u8,
    near_term_deadline_days: i64,
    hidden_urgency_boost: u8,
    hidden_urgency_keyword_threshold: usize,
}

impl PriorityScorer {
    pub fn new(config: &TriageConfig) -> Self {
        Self {
            priority_threshold: config.priority_threshold,
            near_term_deadline_days: config.near_term_deadline_days,
            hidden_urgency_boost: config.hidden_urgency_boost,
            hidden_urgency_keyword_threshold: config.hidden_urgency_keyword_threshold,
        }
    }

    pub fn score(
        &self,
        sender: &SenderProfile,
        intent: &IntentResult,
        thread: &ThreadMeta,
    ) -> PriorityScore {
        let mut total: u32 = 0;
        let mut evidence = Vec::new();

        let base = base_points(sender.role);
        total += base;
        evidence.push(format!("Sender role {} (+{base})", sender.role.label()));

        if !intent.urgency_keywords.is_empty() {
            let points =
                (URGENCY_POINTS * intent.urgency_keywords.len() as u32).min(URGENCY_CAP);
            total += points;
            evidence.push(format!(
                "Urgency keywords: {} (+{points})",
                intent.urgency_keywords.join(", ")
            ));
        }

        if intent.has(Intent::CommitmentRequest) {
            total += COMMITMENT_POINTS;
            evidence.push(format!("Commitment requested (+{COMMITMENT_POINTS})"));
        }
        if intent.has(Intent::Question) {
            total += QUESTION_POINTS;
            evidence.push(format!("Direct question (+{QUESTION_POINTS})"));
        }

        if let Some(deadline) = &intent.extracted_deadline {
            let days_out = (deadline.date - thread.sent_on).num_days();
            if (0..=self.near_term_deadline_days).contains(&days_out) {
                total += NEAR_DEADLINE_POINTS;
                evidence.push(format!(
                    "Deadline \"{}\" ({}) within {} day(s) (+{NEAR_DEADLINE_POINTS})",
                    deadline.phrase, deadline.date, self.near_term_deadline_days
                ));
            }
        }

        if thread.is_reply {
            total += REPLY_THREAD_POINTS;
            evidence.push(format!(
                "Active thread, message {} (+{REPLY_THREAD_POINTS})",
                thread.position
            ));
        }
        if thread.has_attachments {
            total += ATTACHMENT_POINTS;
            evidence.push(format!("Has attachments (+{ATTACHMENT_POINTS})"));
        }

        let hidden_urgency = intent.is_polite
            && intent.extracted_deadline.is_some()
            && intent.urgency_keywords.len() < self.hidden_urgency_keyword_threshold;
        if hidden_urgency {
            let boost = u32::from(self.hidden_urgency_boost);
            total += boost;
            evidence.push(format!(
                "Hidden urgency: polite request with a deadline and {} explicit urgency keyword(s) (+{boost})",
                intent.urgency_keywords.len()
            ));
        }

        let value = total.min(100) as u8;
        let level = PriorityLevel::from_score(value, self.priority_threshold);
        let confidence = confidence(evidence.len(), intent.is_ambiguous());
        let reasoning = reasoning(value, level, sender.role, hidden_urgency, evidence.len());

        PriorityScore {
            value,
            level,
            evidence,
            reasoning,
            confidence,
            hidden_urgency,
        }
    }
}

fn confidence(signals: usize, ambiguous: bool) -> f32 {
    let base: f32 = match signals {
        0 | 1 => 0.5,
        2 => 0.65,
        3 => 0.75,
        _ => 0.85,
    };
    let adjusted = if ambiguous { base * 0.8 } else { base };
    (adjusted * 100.0).round() / 100.0
}

fn reasoning(
    value: u8,
    level: PriorityLevel,
    role: SenderRole,
    hidden_urgency: bool,
    signals: usize,
) -> String {
    let hidden = if hidden_urgency {
        ", including hidden urgency behind polite phrasing"
    } else {
        ""
    };
    format!(
        "Scored {value} ({} priority) from a {} sender and {signals} signal(s){hidden}.",
        level.label(),
        role.label()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::ExtractedDeadline;
    use chrono::NaiveDate;

    fn sender(role: SenderRole) -> SenderProfile {
        SenderProfile {
            role,
            is_spam_likely: false,
            matched_domain_rule: None,
        }
    }

    fn thread() -> ThreadMeta {
        ThreadMeta {
            sent_on: NaiveDate::from_ymd_opt(2025, 3, 5).unwrap(),
            position: 1,
            ..Default::default()
        }
    }

    fn deadline(days: u64) -> Option<ExtractedDeadline> {
        Some(ExtractedDeadline {
            phrase: "tomorrow".into(),
            date: NaiveDate::from_ymd_opt(2025, 3, 5)
                .unwrap()
                .checked_add_days(chrono::Days::new(days))
                .unwrap(),
        })
    }

    #[test]
    fn base_only_still_has_evidence() {
        let scorer = PriorityScorer::new(&TriageConfig::default());
        let score = scorer.score(
            &sender(SenderRole::Unknown),
            &IntentResult::default(),
            &thread(),
        );
        assert_eq!(score.value, 5);
        assert_eq!(score.evidence.len(), 1);
        assert_eq!(score.level, PriorityLevel::NotRequired);
        assert!(!score.hidden_urgency);
    }

    #[test]
    fn hidden_urgency_adds_boost() {
        let scorer = PriorityScorer::new(&TriageConfig::default());
        let mut intent = IntentResult {
            is_polite: true,
            extracted_deadline: deadline(1),
            ..Default::default()
        };
        intent.intents.insert(Intent::Deadline);

        let score = scorer.score(&sender(SenderRole::Team), &intent, &thread());
        assert!(score.hidden_urgency);
        // 30 base + 10 near deadline + 15 hidden
        assert_eq!(score.value, 55);
        assert!(score.evidence.last().unwrap().contains("+15"));
    }

    #[test]
    fn explicit_urgency_disables_hidden_rule() {
        let scorer = PriorityScorer::new(&TriageConfig::default());
        let intent = IntentResult {
            is_polite: true,
            extracted_deadline: deadline(1),
            urgency_keywords: vec!["urgent".into(), "asap".into()],
            ..Default::default()
        };
        let score = scorer.score(&sender(SenderRole::Team), &intent, &thread());
        assert!(!score.hidden_urgency);
    }

    #[test]
    fn urgency_points_are_capped() {
        let scorer = PriorityScorer::new(&TriageConfig::default());
        let intent = IntentResult {
            urgency_keywords: vec!["urgent".into(), "asap".into(), "eod".into()],
            ..Default::default()
        };
        let score = scorer.score(&sender(SenderRole::Unknown), &intent, &thread());
        assert_eq!(score.value, 25);
    }

    #[test]
    fn far_deadline_earns_nothing() {
        let scorer = PriorityScorer::new(&TriageConfig::default());
        let intent = IntentResult {
            extracted_deadline: deadline(10),
            ..Default::default()
        };
        let score = scorer.score(&sender(SenderRole::Vendor), &intent, &thread());
        assert_eq!(score.value, 15);
    }

    #[test]
    fn value_is_clamped() {
        let mut config = TriageConfig::default();
        config.hidden_urgency_boost = 100;
        let scorer = PriorityScorer::new(&config);
        let mut intent = IntentResult {
            is_polite: true,
            extracted_deadline: deadline(0),
            ..Default::default()
        };
        intent.intents.insert(Intent::CommitmentRequest);
        intent.intents.insert(Intent::Question);
        let meta = ThreadMeta {
            is_reply: true,
            has_attachments: true,
            ..thread()
        };
        let score = scorer.score(&sender(SenderRole::Vip), &intent, &meta);
        assert_eq!(score.value, 100);
        assert_eq!(score.level, PriorityLevel::High);
    }

    #[test]
    fn ambiguity_lowers_confidence() {
        let scorer = PriorityScorer::new(&TriageConfig::default());
        let mut clear = IntentResult::default();
        clear.intents.insert(Intent::Question);
        let mut ambiguous = clear.clone();
        ambiguous.intents.insert(Intent::Fyi);

        let a = scorer.score(&sender(SenderRole::Team), &clear, &thread());
        let b = scorer.score(&sender(SenderRole::Team), &ambiguous, &thread());
        assert!(b.confidence < a.confidence);
        assert_eq!(a.confidence, 0.65);
        assert_eq!(b.confidence, 0.52);
    }
}
