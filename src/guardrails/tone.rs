//! Tone enforcement over draft text.
//!
//! Liability-admitting or promissory phrasing blocks. Aggressive wording and
//! unprofessional texture only ask for approval.

use super::{Guardrail, PolicyAction, PolicyRule, ScanContext};
use crate::pipeline::types::{FlagKind, SecurityFlag, Severity};

const MAX_EXCLAMATIONS: usize = 2;
const MAX_SHOUTED_WORDS: usize = 1;

pub struct ToneEnforcer {
    rules: Vec<PolicyRule>,
}

impl ToneEnforcer {
    pub fn new() -> Self {
        let rule = |name: &str, pattern: &str, action, severity| {
            PolicyRule::new(name, pattern, action, severity).expect("static tone pattern")
        };
        Self {
            rules: vec![
                rule(
                    "liability",
                    r"(?i)\b(i|we) (guarantee|promise|assure you)\b|\byou will be liable\b|\b(we|i) (accept|admit) (full )?(liability|responsibility|fault)\b|\blegally binding\b|\bwithout exception\b",
                    PolicyAction::Block,
                    Severity::High,
                ),
                rule(
                    "aggressive",
                    r"(?i)\b(unacceptable|ridiculous|incompetent|furious|outraged|idiot|stupid|i demand|you must|what were you thinking)\b",
                    PolicyAction::Warn,
                    Severity::Medium,
                ),
                rule(
                    "unprofessional",
                    r"(?i)\b(lol|omg|wtf|btw|gonna|wanna|gotta|nope|yeah)\b",
                    PolicyAction::Warn,
                    Severity::Low,
                ),
            ],
        }
    }

    /// Flags for one piece of outbound text.
    pub fn check(&self, text: &str) -> Vec<SecurityFlag> {
        let mut flags: Vec<SecurityFlag> = self
            .rules
            .iter()
            .filter_map(|rule| {
                let found = rule.regex.find(text)?;
                Some(rule.to_flag(
                    FlagKind::Tone,
                    format!("{} language: \"{}\"", rule.name, found.as_str()),
                ))
            })
            .collect();

        let exclamations = text.matches('!').count();
        if exclamations > MAX_EXCLAMATIONS {
            flags.push(SecurityFlag::advisory(
                FlagKind::Tone,
                Severity::Low,
                format!("{exclamations} exclamation marks"),
            ));
        }

        let shouted = text
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
            .filter(|w| w.len() > 3 && w.chars().all(|c| c.is_ascii_uppercase()))
            .count();
        if shouted > MAX_SHOUTED_WORDS {
            flags.push(SecurityFlag::advisory(
                FlagKind::Tone,
                Severity::Low,
                format!("{shouted} all-caps words"),
            ));
        }
        flags
    }
}

impl Default for ToneEnforcer {
    fn default() -> Self {
        Self::new()
    }
}

impl Guardrail for ToneEnforcer {
    fn name(&self) -> &'static str {
        "tone"
    }

    fn scan(&self, ctx: &ScanContext<'_>) -> Vec<SecurityFlag> {
        match ctx.draft {
            Some(draft) => self.check(&format!("{}\n{}", draft.subject, draft.body)),
            None => Vec::new(),
        }
    }
}
