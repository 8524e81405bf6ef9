//! Deterministic template drafts.

use async_trait::async_trait;

use super::{DraftContext, DraftGenerator, DraftText};
use crate::error::GenerationError;
use crate::pipeline::types::{EmailRecord, Intent};

const TEMPLATE_CONFIDENCE: f32 = 0.6;

/// Locally assembled reply. Same input, same text.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateDraftGenerator;

impl TemplateDraftGenerator {
    pub fn name(&self) -> &'static str {
        "template"
    }

    pub fn render(&self, email: &EmailRecord, context: &DraftContext) -> DraftText {
        let intent = &context.intent;
        let opening = if intent.has(Intent::MeetingRequest) {
            "Thank you for the invitation. I will check my calendar and confirm a time that works."
        } else if intent.has(Intent::CommitmentRequest) {
            "Thank you for reaching out. I have noted your request and will follow up soon."
        } else if intent.has(Intent::Question) {
            "Thank you for your email. I have received your question and will review it shortly."
        } else {
            "Thank you for your email. I have received your message and will respond accordingly."
        };

        let mut body = String::from("Hi,\n\n");
        body.push_str(opening);
        if let Some(deadline) = &intent.extracted_deadline {
            body.push_str(&format!(
                " I have noted the timing ({}, {}).",
                deadline.phrase, deadline.date
            ));
        }
        body.push_str("\n\nBest regards");

        DraftText {
            subject: reply_subject(&email.subject),
            body,
            tone_label: "professional".into(),
            confidence: TEMPLATE_CONFIDENCE,
        }
    }
}

#[async_trait]
impl DraftGenerator for TemplateDraftGenerator {
    fn name(&self) -> &str {
        TemplateDraftGenerator::name(self)
    }

    async fn generate(
        &self,
        email: &EmailRecord,
        context: &DraftContext,
    ) -> Result<DraftText, GenerationError> {
        Ok(self.render(email, context))
    }
}

pub fn reply_subject(original: &str) -> String {
    let trimmed = original.trim();
    if trimmed.to_lowercase().starts_with("re:") {
        trimmed.to_string()
    } else {
        format!("Re: {trimmed}")
    }
}
