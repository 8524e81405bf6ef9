//! PII and confidentiality detection.
//!
//! Scans the incoming email and, once it exists, the draft. Every hit blocks.
//! Card-like digit runs only count when they pass the Luhn checksum.

use regex::Regex;

use super::{Guardrail, PolicyAction, PolicyRule, ScanContext};
use crate::pipeline::types::{FlagKind, SecurityFlag, Severity};

pub struct PiiScanner {
    rules: Vec<PolicyRule>,
    card: Regex,
}

impl PiiScanner {
    pub fn new() -> Self {
        let rule = |name: &str, pattern: &str, severity| {
            PolicyRule::new(name, pattern, PolicyAction::Block, severity)
                .expect("static pii pattern")
        };
        Self {
            rules: vec![
                rule(
                    "ssn",
                    r"\b(?:00[1-9]|0[1-9]\d|[1-578]\d{2}|6[0-57-9]\d|66[0-57-9])-\d{2}-\d{4}\b",
                    Severity::Critical,
                ),
                rule(
                    "phone",
                    r"(?:\+?1[\s.-]?)?(?:\(\d{3}\)\s?|\b\d{3}[\s.-])\d{3}[\s.-]\d{4}\b",
                    Severity::Medium,
                ),
                rule(
                    "api_key",
                    r"\b(?:(?:sk|pk|rk)_(?:live|test)_[A-Za-z0-9]{16,}|AKIA[0-9A-Z]{16}|gh[pousr]_[A-Za-z0-9]{36,}|xox[abp]-[A-Za-z0-9-]{10,})\b",
                    Severity::Critical,
                ),
                rule(
                    "credential",
                    r"(?i)\b(?:password|passwd|pwd|api[_-]?key|secret)\s*[:=]\s*\S{6,}",
                    Severity::Critical,
                ),
                rule(
                    "confidential_marker",
                    r"(?i)\b(?:confidential|proprietary|internal use only|internal only|do not share|do not forward|trade secret|attorney[- ]client privileged)\b",
                    Severity::High,
                ),
            ],
            card: Regex::new(r"\b\d(?:[ -]?\d){12,18}\b").expect("static regex"),
        }
    }

    /// PII kinds found in `text`, in rule order, with card numbers last.
    pub fn detect(&self, text: &str) -> Vec<(&str, Severity)> {
        let mut found: Vec<(&str, Severity)> = self
            .rules
            .iter()
            .filter(|rule| rule.regex.is_match(text))
            .map(|rule| (rule.name.as_str(), rule.severity))
            .collect();
        if self.card.find_iter(text).any(|m| luhn_valid(m.as_str())) {
            found.push(("card_number", Severity::Critical));
        }
        found
    }

    /// Mask every detected PII span, for previews and logs.
    pub fn redact(&self, text: &str) -> String {
        let masked = self
            .card
            .replace_all(text, |caps: &regex::Captures<'_>| {
                if luhn_valid(&caps[0]) {
                    "[REDACTED_CARD]".to_string()
                } else {
                    caps[0].to_string()
                }
            })
            .into_owned();
        self.rules
            .iter()
            .filter(|rule| rule.name != "confidential_marker")
            .fold(masked, |acc, rule| {
                rule.regex
                    .replace_all(&acc, format!("[REDACTED_{}]", rule.name.to_uppercase()))
                    .into_owned()
            })
    }
}

impl Default for PiiScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Guardrail for PiiScanner {
    fn name(&self) -> &'static str {
        "pii"
    }

    fn scan(&self, ctx: &ScanContext<'_>) -> Vec<SecurityFlag> {
        let mut flags = Vec::new();
        let mut sources = vec![("email", ctx.email.full_text())];
        if let Some(draft) = ctx.draft {
            sources.push(("draft", format!("{}\n{}", draft.subject, draft.body)));
        }
        for (source, text) in &sources {
            for (kind, severity) in self.detect(text) {
                flags.push(SecurityFlag::blocking(
                    FlagKind::Pii,
                    severity,
                    format!("{kind} detected in {source}"),
                ));
            }
        }
        flags
    }
}

/// Luhn checksum over the digits of `candidate`, ignoring separators.
pub fn luhn_valid(candidate: &str) -> bool {
    let digits: Vec<u32> = candidate.chars().filter_map(|c| c.to_digit(10)).collect();
    if !(13..=19).contains(&digits.len()) {
        return false;
    }
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::{DraftReply, EmailRecord, ReplyEnvelope};
    use chrono::{TimeZone, Utc};

    fn make_email(body: &str) -> EmailRecord {
        EmailRecord {
            message_id: "m1".into(),
            thread_id: "t1".into(),
            from: "alice@example.com".into(),
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

    fn make_draft(body: &str) -> DraftReply {
        DraftReply {
            to: vec!["alice@example.com".into()],
            cc: vec![],
            subject: "Re: Hello".into(),
            body: body.into(),
            tone_label: "professional".into(),
            external_recipient_count: 1,
            reply_all_risk: false,
            requires_approval: false,
            reasoning: String::new(),
            confidence: 0.8,
            evidence: vec![],
            used_fallback: false,
        }
    }

    #[test]
    fn luhn_checksum() {
        assert!(luhn_valid("4111111111111111"));
        assert!(luhn_valid("4111 1111 1111 1111"));
        assert!(!luhn_valid("4111111111111112"));
        assert!(!luhn_valid("1234"));
    }

    #[test]
    fn card_in_draft_blocks() {
        let scanner = PiiScanner::new();
        let email = make_email("Can you confirm the order?");
        let draft = make_draft("Use card 4111111111111111 for the order.");
        let envelope = ReplyEnvelope::default();
        let flags = scanner.scan(&ScanContext {
            email: &email,
            envelope: &envelope,
            draft: Some(&draft),
        });
        assert_eq!(flags.len(), 1);
        assert!(flags[0].blocks_send);
        assert_eq!(flags[0].description, "card_number detected in draft");
    }

    #[test]
    fn non_luhn_digits_are_ignored() {
        let scanner = PiiScanner::new();
        assert!(scanner.detect("order 4111111111111112 shipped").is_empty());
    }

    #[test]
    fn detects_ssn_phone_and_keys() {
        let scanner = PiiScanner::new();
        let kinds: Vec<&str> = scanner
            .detect("SSN 123-45-6789, call 415-555-0134, key sk_live_abcdefghijklmnop1234")
            .into_iter()
            .map(|(kind, _)| kind)
            .collect();
        assert_eq!(kinds, vec!["ssn", "phone", "api_key"]);
    }

    #[test]
    fn confidentiality_marker_is_pii() {
        let scanner = PiiScanner::new();
        let found = scanner.detect("CONFIDENTIAL: board minutes attached");
        assert_eq!(found, vec![("confidential_marker", Severity::High)]);
    }

    #[test]
    fn clean_text_has_no_hits() {
        let scanner = PiiScanner::new();
        assert!(scanner.detect("See you at 3pm on the 12th floor.").is_empty());
    }

    #[test]
    fn redact_masks_values() {
        let scanner = PiiScanner::new();
        let masked = scanner.redact("SSN 123-45-6789 card 4111 1111 1111 1111");
        assert!(!masked.contains("6789"));
        assert!(masked.contains("[REDACTED_SSN]"));
        assert!(masked.contains("[REDACTED_CARD]"));
    }
}
