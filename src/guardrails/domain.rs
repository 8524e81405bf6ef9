//! Recipient domain allow/deny checks.

use super::{Guardrail, ScanContext};
use crate::config::{TriageConfig, domain_of};
use crate::pipeline::types::{FlagKind, SecurityFlag, Severity};

/// Denied recipient domains block; recipients outside a non-empty allow
/// list are advisory. Team domains always count as allowed.
pub struct DomainChecker {
    allowed: Vec<String>,
    blocked: Vec<String>,
    team: Vec<String>,
}

impl DomainChecker {
    pub fn new(config: &TriageConfig) -> Self {
        Self {
            allowed: config.allowed_domains.iter().cloned().collect(),
            blocked: config.blocked_domains.iter().cloned().collect(),
            team: config.team_domains.iter().cloned().collect(),
        }
    }

    fn is_blocked(&self, domain: &str) -> bool {
        self.blocked.iter().any(|d| d == domain)
    }

    fn is_allowed(&self, domain: &str) -> bool {
        self.allowed.is_empty()
            || self.allowed.iter().any(|d| d == domain)
            || self.team.iter().any(|d| d == domain)
    }
}

impl Guardrail for DomainChecker {
    fn name(&self) -> &'static str {
        "domain"
    }

    fn scan(&self, ctx: &ScanContext<'_>) -> Vec<SecurityFlag> {
        let mut flags = Vec::new();
        let recipients = match ctx.draft {
            Some(draft) => draft.to.iter().chain(draft.cc.iter()).collect::<Vec<_>>(),
            None => ctx.envelope.recipients().collect(),
        };
        for address in recipients {
            let domain = domain_of(address);
            if self.is_blocked(&domain) {
                flags.push(SecurityFlag::blocking(
                    FlagKind::Domain,
                    Severity::High,
                    format!("Recipient {address} is on denied domain {domain}"),
                ));
            } else if !self.is_allowed(&domain) {
                flags.push(SecurityFlag::advisory(
                    FlagKind::Domain,
                    Severity::Medium,
                    format!("Recipient {address} is outside the allowed domains"),
                ));
            }
        }
        flags
    }
}
