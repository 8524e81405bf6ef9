//! Outbound guardrails: PII, recipient domains, tone.
//!
//! Each scanner turns matches into `SecurityFlag`s. A `Block` policy raises a
//! flag with `blocks_send`; a `Warn` policy raises an advisory flag that sends
//! the email to human approval. The set runs every enabled scanner, even
//! after one has already blocked, so the audit trail is complete.

pub mod domain;
pub mod pii;
pub mod tone;

pub use domain::DomainChecker;
pub use pii::PiiScanner;
pub use tone::ToneEnforcer;

use regex::Regex;
use tracing::debug;

use crate::config::TriageConfig;
use crate::pipeline::types::{
    DraftReply, EmailRecord, FlagKind, ReplyEnvelope, SecurityFlag, Severity,
};

/// What to do when a policy rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyAction {
    Warn,
    Block,
}

/// A named pattern with the action it triggers.
#[derive(Debug, Clone)]
pub struct PolicyRule {
    pub name: String,
    pub regex: Regex,
    pub action: PolicyAction,
    pub severity: Severity,
}

impl PolicyRule {
    pub fn new(
        name: &str,
        pattern: &str,
        action: PolicyAction,
        severity: Severity,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.into(),
            regex: Regex::new(pattern)?,
            action,
            severity,
        })
    }

    pub fn to_flag(&self, kind: FlagKind, description: String) -> SecurityFlag {
        match self.action {
            PolicyAction::Block => SecurityFlag::blocking(kind, self.severity, description),
            PolicyAction::Warn => SecurityFlag::advisory(kind, self.severity, description),
        }
    }
}

/// What a guardrail sees for one email.
pub struct ScanContext<'a> {
    pub email: &'a EmailRecord,
    pub envelope: &'a ReplyEnvelope,
    pub draft: Option<&'a DraftReply>,
}

/// One independent outbound scanner.
pub trait Guardrail: Send + Sync {
    fn name(&self) -> &'static str;

    fn scan(&self, ctx: &ScanContext<'_>) -> Vec<SecurityFlag>;
}

/// The enabled guardrails, in a fixed order.
pub struct GuardrailSet {
    guardrails: Vec<Box<dyn Guardrail>>,
}

impl GuardrailSet {
    pub fn from_config(config: &TriageConfig) -> Self {
        let mut guardrails: Vec<Box<dyn Guardrail>> = Vec::new();
        if config.enable_pii_detection {
            guardrails.push(Box::new(PiiScanner::new()));
        }
        if config.enable_domain_restrictions {
            guardrails.push(Box::new(DomainChecker::new(config)));
        }
        if config.enable_tone_enforcement {
            guardrails.push(Box::new(ToneEnforcer::new()));
        }
        Self { guardrails }
    }

    pub fn with_guardrails(guardrails: Vec<Box<dyn Guardrail>>) -> Self {
        Self { guardrails }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.guardrails.iter().map(|g| g.name()).collect()
    }

    /// Run every guardrail and concatenate their flags.
    pub fn run(&self, ctx: &ScanContext<'_>) -> Vec<SecurityFlag> {
        let mut flags = Vec::new();
        for guardrail in &self.guardrails {
            let found = guardrail.scan(ctx);
            if !found.is_empty() {
                debug!(
                    message_id = %ctx.email.message_id,
                    guardrail = guardrail.name(),
                    count = found.len(),
                    blocking = found.iter().any(|f| f.blocks_send),
                    "Guardrail raised flags"
                );
            }
            flags.extend(found);
        }
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn make_email(body: &str) -> EmailRecord {
        EmailRecord {
            message_id: "m1".into(),
            thread_id: "t1".into(),
            from: "alice@partner.io".into(),
            to: vec!["me@corp.com".into()],
            cc: vec![],
            bcc: vec![],
            subject: "Hello".into(),
            body: body.into(),
            timestamp: Utc.with_ymd_and_hms(2025, 3, 5, 9, 0, 0).unwrap(),
            thread_position: 1,
            labels: vec![],
            has_attachments: false,
            awaiting_reply: false,
        }
    }

    #[test]
    fn disabled_guardrails_are_skipped() {
        let mut config = TriageConfig::default();
        config.enable_tone_enforcement = false;
        let set = GuardrailSet::from_config(&config);
        assert_eq!(set.names(), vec!["pii", "domain"]);
    }

    #[test]
    fn all_scanners_run_after_a_block() {
        let mut config = TriageConfig::default();
        config.blocked_domains.insert("partner.io".into());
        let set = GuardrailSet::from_config(&config);
        let email = make_email("My SSN is 123-45-6789.");
        let envelope = ReplyEnvelope {
            to: vec!["alice@partner.io".into()],
            ..Default::default()
        };
        let flags = set.run(&ScanContext {
            email: &email,
            envelope: &envelope,
            draft: None,
        });
        assert!(flags.iter().any(|f| f.kind == FlagKind::Pii && f.blocks_send));
        assert!(flags.iter().any(|f| f.kind == FlagKind::Domain && f.blocks_send));
    }

    #[test]
    fn policy_rule_maps_action_to_flag() {
        let rule = PolicyRule::new("x", "x", PolicyAction::Warn, Severity::Low).unwrap();
        assert!(!rule.to_flag(FlagKind::Tone, "x".into()).blocks_send);
        let rule = PolicyRule::new("x", "x", PolicyAction::Block, Severity::High).unwrap();
        assert!(rule.to_flag(FlagKind::Tone, "x".into()).blocks_send);
    }
}
