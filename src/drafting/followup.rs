//! Follow-up reminders.

use chrono::Days;

use crate::pipeline::types::{EmailRecord, FollowUp, Intent, IntentResult, PriorityScore};

/// Suggests a dated reminder for an email, or nothing.
pub trait FollowUpSuggester: Send + Sync {
    fn suggest(
        &self,
        email: &EmailRecord,
        intent: &IntentResult,
        score: &PriorityScore,
    ) -> Option<FollowUp>;
}

/// Intent-driven reminders dated from the email's own timestamp.
///
/// Urgent mail comes back after 1 day, meetings after 2, questions after 3,
/// anything else that needs tracking after 5. An earlier extracted deadline
/// pulls the date forward.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleFollowUpSuggester;

impl RuleFollowUpSuggester {
    fn needs_follow_up(intent: &IntentResult) -> bool {
        [
            Intent::Question,
            Intent::MeetingRequest,
            Intent::CommitmentRequest,
            Intent::Deadline,
        ]
        .iter()
        .any(|i| intent.has(*i))
    }
}

impl FollowUpSuggester for RuleFollowUpSuggester {
    fn suggest(
        &self,
        email: &EmailRecord,
        intent: &IntentResult,
        score: &PriorityScore,
    ) -> Option<FollowUp> {
        if !Self::needs_follow_up(intent) {
            return None;
        }

        let urgent = !intent.urgency_keywords.is_empty() || score.hidden_urgency;
        let (days, reason, draft_message) = if urgent {
            (
                1,
                "Urgent matter - follow up if no response",
                "Hi,\n\nI wanted to follow up on my previous email as this is time-sensitive. Please let me know where things stand.\n\nBest regards",
            )
        } else if intent.has(Intent::MeetingRequest) {
            (
                2,
                "Meeting request pending - check availability",
                "Hi,\n\nI wanted to follow up regarding scheduling a meeting. Have you had a chance to review your calendar?\n\nBest regards",
            )
        } else if intent.has(Intent::Question) {
            (
                3,
                "Question asked - follow up if unanswered",
                "Hi,\n\nI wanted to check in regarding the open question. Please let me know if you need any clarification.\n\nBest regards",
            )
        } else {
            (
                5,
                "Request made - verify completion",
                "Hi,\n\nJust following up on the earlier request. Please let me know if you have any updates.\n\nBest regards",
            )
        };

        let sent_on = email.timestamp.date_naive();
        let mut suggested_date = sent_on.checked_add_days(Days::new(days))?;
        if let Some(deadline) = &intent.extracted_deadline
            && deadline.date > sent_on
            && deadline.date < suggested_date
        {
            suggested_date = deadline.date;
        }

        Some(FollowUp {
            message_id: email.message_id.clone(),
            subject: format!("Follow-up: {}", email.subject),
            suggested_date,
            reason: reason.to_string(),
            draft_message: draft_message.to_string(),
        })
    }
}
