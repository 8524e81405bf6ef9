//! Reply drafting and follow-up suggestion.
//!
//! Draft text comes from a `DraftGenerator`. The `FallbackDrafter` wraps an
//! optional remote generator with a timeout and swaps in the deterministic
//! template once on any failure. There are no retries.

pub mod followup;
pub mod http;
pub mod template;

pub use followup::{FollowUpSuggester, RuleFollowUpSuggester};
pub use http::{HttpDraftGenerator, HttpGeneratorConfig};
pub use template::TemplateDraftGenerator;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::config::{TriageConfig, domain_of};
use crate::error::GenerationError;
use crate::pipeline::types::{
    Category, EmailRecord, IntentResult, ReplyEnvelope, SenderRole,
};

/// Confidence given to a template draft that replaced a failed generator.
pub const FALLBACK_CONFIDENCE: f32 = 0.4;

/// What the generator knows about the email beyond its text.
#[derive(Debug, Clone)]
pub struct DraftContext {
    pub intent: IntentResult,
    pub category: Category,
    pub sender_role: SenderRole,
    pub priority: u8,
}

/// Generator output before the pipeline annotates it.
#[derive(Debug, Clone, PartialEq)]
pub struct DraftText {
    pub subject: String,
    pub body: String,
    pub tone_label: String,
    pub confidence: f32,
}

/// Produces reply text for one email.
#[async_trait]
pub trait DraftGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(
        &self,
        email: &EmailRecord,
        context: &DraftContext,
    ) -> Result<DraftText, GenerationError>;
}

/// Draft text plus how it was produced.
#[derive(Debug, Clone)]
pub struct DraftOutcome {
    pub text: DraftText,
    pub generator: String,
    /// Set when the template replaced a failed generator.
    pub fallback_reason: Option<String>,
}

/// Timeout-and-fallback policy around the generator.
pub struct FallbackDrafter {
    primary: Option<Arc<dyn DraftGenerator>>,
    template: TemplateDraftGenerator,
    timeout: Duration,
}

impl FallbackDrafter {
    /// Template-only drafting.
    pub fn template_only() -> Self {
        Self {
            primary: None,
            template: TemplateDraftGenerator,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn new(primary: Arc<dyn DraftGenerator>, timeout: Duration) -> Self {
        Self {
            primary: Some(primary),
            template: TemplateDraftGenerator,
            timeout,
        }
    }

    pub async fn draft(&self, email: &EmailRecord, context: &DraftContext) -> DraftOutcome {
        let Some(primary) = &self.primary else {
            return DraftOutcome {
                text: self.template.render(email, context),
                generator: self.template.name().to_string(),
                fallback_reason: None,
            };
        };

        let result = match tokio::time::timeout(self.timeout, primary.generate(email, context))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(GenerationError::Timeout {
                timeout: self.timeout,
            }),
        };

        match result {
            Ok(text) => DraftOutcome {
                text,
                generator: primary.name().to_string(),
                fallback_reason: None,
            },
            Err(e) => {
                warn!(
                    message_id = %email.message_id,
                    generator = primary.name(),
                    error = %e,
                    "Draft generator failed, using template"
                );
                let mut text = self.template.render(email, context);
                text.confidence = FALLBACK_CONFIDENCE;
                DraftOutcome {
                    text,
                    generator: self.template.name().to_string(),
                    fallback_reason: Some(e.to_string()),
                }
            }
        }
    }
}

/// Who a reply to `email` would go to.
///
/// The sender goes in `to`; every other visible participant except the
/// mailbox owner goes in `cc`. External means outside the team domains.
pub fn reply_envelope(email: &EmailRecord, config: &TriageConfig) -> ReplyEnvelope {
    let sender = email.from.trim().to_lowercase();
    let owner = config.owner_address.as_deref().map(str::to_lowercase);

    let mut seen = BTreeSet::new();
    seen.insert(sender.clone());
    let mut cc = Vec::new();
    for address in email.to.iter().chain(email.cc.iter()) {
        let address = address.trim().to_lowercase();
        if owner.as_deref() == Some(address.as_str()) {
            continue;
        }
        if seen.insert(address.clone()) {
            cc.push(address);
        }
    }

    let to = vec![sender];
    let external_recipient_count = to
        .iter()
        .chain(cc.iter())
        .filter(|a| !config.is_internal_domain(&domain_of(a)))
        .count();
    let total = to.len() + cc.len();
    let reply_all_risk = total > config.reply_all_max_recipients
        || external_recipient_count > config.reply_all_max_external;

    ReplyEnvelope {
        to,
        cc,
        external_recipient_count,
        reply_all_risk,
    }
}
