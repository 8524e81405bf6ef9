//! Legal and finance escalation scan.
//!
//! Runs before categorization. Any match raises a flag and marks the email's
//! regulated topic; a critical match also blocks sending and skips drafting.
//! Nothing downstream clears a critical flag.

use regex::Regex;
use tracing::warn;

use crate::config::{TriageConfig, domain_of};
use crate::pipeline::types::{Category, EmailRecord, FlagKind, SecurityFlag, Severity};

const LEGAL_TERMS: &[&str] = &[
    "contract",
    "agreement",
    "legal",
    "attorney",
    "lawyer",
    "settlement",
    "terms and conditions",
    "nda",
];

const LEGAL_HIGH_RISK: &[&str] = &[
    "lawsuit",
    "litigation",
    "hereby agree",
    "binding agreement",
    "legal obligation",
    "contract terms",
    "liability",
    "indemnify",
    "confidentiality agreement",
];

const FINANCE_TERMS: &[&str] = &[
    "invoice",
    "payment",
    "billing",
    "purchase order",
    "bank",
    "refund",
];

const FINANCE_HIGH_RISK: &[&str] = &[
    "wire transfer",
    "bank account",
    "payment details",
    "payment terms",
    "payment due",
    "routing number",
    "credit card",
];

struct TermList {
    kind: FlagKind,
    ordinary: Vec<(&'static str, Regex)>,
    high_risk: Vec<(&'static str, Regex)>,
}

impl TermList {
    fn new(kind: FlagKind, ordinary: &[&'static str], high_risk: &[&'static str]) -> Self {
        let compile = |terms: &[&'static str]| {
            terms
                .iter()
                .map(|t| {
                    let regex = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(t)))
                        .expect("escaped term");
                    (*t, regex)
                })
                .collect()
        };
        Self {
            kind,
            ordinary: compile(ordinary),
            high_risk: compile(high_risk),
        }
    }

    fn hits(&self, text: &str) -> TopicHits {
        let find = |terms: &[(&'static str, Regex)]| {
            terms
                .iter()
                .filter(|(_, regex)| regex.is_match(text))
                .map(|(term, _)| *term)
                .collect::<Vec<_>>()
        };
        TopicHits {
            kind: self.kind,
            ordinary: find(&self.ordinary),
            high_risk: find(&self.high_risk),
        }
    }
}

struct TopicHits {
    kind: FlagKind,
    ordinary: Vec<&'static str>,
    high_risk: Vec<&'static str>,
}

impl TopicHits {
    fn total(&self) -> usize {
        self.ordinary.len() + self.high_risk.len()
    }

    fn severity(&self, external: bool) -> Option<Severity> {
        match (self.high_risk.len(), self.ordinary.len()) {
            (0, 0) => None,
            (0, 1) => Some(Severity::Low),
            (0, _) => Some(Severity::Medium),
            (n, _) if n >= 2 || external => Some(Severity::Critical),
            _ => Some(Severity::High),
        }
    }

    fn category(&self) -> Category {
        match self.kind {
            FlagKind::Finance => Category::Finance,
            _ => Category::Legal,
        }
    }
}

/// Result of the escalation scan for one email.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EscalationScan {
    pub flags: Vec<SecurityFlag>,
    /// Legal or Finance when anything matched.
    pub topic: Option<Category>,
    /// A critical flag was raised: no draft, blocked.
    pub critical: bool,
}

pub struct EscalationScanner {
    legal: TermList,
    finance: TermList,
    team_domains: Vec<String>,
}

impl EscalationScanner {
    pub fn new(config: &TriageConfig) -> Self {
        Self {
            legal: TermList::new(FlagKind::Legal, LEGAL_TERMS, LEGAL_HIGH_RISK),
            finance: TermList::new(FlagKind::Finance, FINANCE_TERMS, FINANCE_HIGH_RISK),
            team_domains: config.team_domains.iter().cloned().collect(),
        }
    }

    /// Whether anyone on the email sits outside the organization.
    fn has_external_participant(&self, email: &EmailRecord) -> bool {
        std::iter::once(&email.from)
            .chain(email.to.iter())
            .chain(email.cc.iter())
            .any(|address| {
                let domain = domain_of(address);
                !self.team_domains.iter().any(|d| *d == domain)
            })
    }

    pub fn scan(&self, email: &EmailRecord) -> EscalationScan {
        let text = email.full_text();
        let external = self.has_external_participant(email);
        let topics = [self.legal.hits(&text), self.finance.hits(&text)];

        let mut scan = EscalationScan::default();
        let mut critical_topic = None;
        for hits in &topics {
            let Some(severity) = hits.severity(external) else {
                continue;
            };
            let mut terms: Vec<&str> = hits.high_risk.clone();
            terms.extend(hits.ordinary.iter());
            let description = format!(
                "{} language ({}): {}",
                hits.kind.label(),
                severity.label(),
                terms.join(", ")
            );
            if severity == Severity::Critical {
                let description = if external {
                    format!("{description}; external participant, escalate to a human")
                } else {
                    format!("{description}; escalate to a human")
                };
                warn!(
                    message_id = %email.message_id,
                    kind = hits.kind.label(),
                    "Critical escalation, auto-reply blocked"
                );
                scan.flags
                    .push(SecurityFlag::blocking(hits.kind, severity, description));
                scan.critical = true;
                critical_topic.get_or_insert(hits.category());
            } else {
                scan.flags
                    .push(SecurityFlag::advisory(hits.kind, severity, description));
            }
        }

        let [legal, finance] = &topics;
        scan.topic = critical_topic.or_else(|| match (legal.total(), finance.total()) {
            (0, 0) => None,
            (l, f) if f > l => Some(Category::Finance),
            _ => Some(Category::Legal),
        });
        scan
    }
}
