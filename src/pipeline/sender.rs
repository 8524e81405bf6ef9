//! Sender profile resolution.
//!
//! Identity alone never makes an email spam; `is_spam_likely` is one input
//! to the spam filter, which weighs it against content signals.

use std::collections::BTreeMap;

use regex::Regex;
use tracing::debug;

use crate::config::{TriageConfig, domain_of};
use crate::pipeline::types::{SenderProfile, SenderRole};

/// Local parts typical of bulk or automated senders.
const BULK_LOCAL_PARTS: &[&str] = &[
    "noreply",
    "no-reply",
    "donotreply",
    "notification",
    "marketing",
    "newsletter",
    "promo",
    "deals",
];

const FREE_MAIL_PROVIDERS: &[&str] = &["gmail.com", "yahoo.com", "hotmail.com", "outlook.com"];

/// Prior message counts per sender address, supplied by the caller.
pub type SenderHistory = BTreeMap<String, u32>;

/// Resolves sender addresses to profiles against read-only configuration.
pub struct SenderResolver {
    vip_addresses: Vec<String>,
    vip_domains: Vec<String>,
    team_domains: Vec<String>,
    vendor_entries: Vec<String>,
    customer_domains: Vec<String>,
    blocked_domains: Vec<String>,
    frequent_sender_min: u32,
    random_local_part: Regex,
}

impl SenderResolver {
    pub fn new(config: &TriageConfig) -> Self {
        Self {
            vip_addresses: config.vip_addresses.iter().cloned().collect(),
            vip_domains: config.vip_domains.iter().cloned().collect(),
            team_domains: config.team_domains.iter().cloned().collect(),
            vendor_entries: config.vendor_addresses.iter().cloned().collect(),
            customer_domains: config.customer_domains.iter().cloned().collect(),
            blocked_domains: config.blocked_domains.iter().cloned().collect(),
            frequent_sender_min: config.frequent_sender_min,
            random_local_part: Regex::new(r"\d{4,}").expect("static regex"),
        }
    }

    /// Resolve one address. Pure: same address, config and history give the same profile.
    pub fn resolve(&self, address: &str, history: &SenderHistory) -> SenderProfile {
        let address = address.trim().to_lowercase();
        let domain = domain_of(&address);
        let blocked = self.blocked_domains.iter().any(|d| *d == domain);

        let vip_rule = if self.vip_addresses.iter().any(|a| *a == address) {
            Some(format!("vip address {address}"))
        } else if self.vip_domains.iter().any(|d| *d == domain) {
            Some(format!("vip domain {domain}"))
        } else {
            None
        };

        if let Some(rule) = vip_rule {
            // A VIP on a blocked domain stays VIP; the note keeps the conflict auditable.
            let matched_domain_rule = if blocked {
                Some(format!("{rule}; overrides blocked domain {domain}"))
            } else {
                Some(rule)
            };
            debug!(sender = %address, "Resolved VIP sender");
            return SenderProfile {
                role: SenderRole::Vip,
                is_spam_likely: false,
                matched_domain_rule,
            };
        }

        let seen = history.get(&address).copied().unwrap_or(0);
        let frequent = self.frequent_sender_min > 0 && seen >= self.frequent_sender_min;

        let (role, rule) = if self.team_domains.iter().any(|d| *d == domain) {
            (SenderRole::Team, Some(format!("team domain {domain}")))
        } else if self
            .vendor_entries
            .iter()
            .any(|v| *v == address || *v == domain)
        {
            (SenderRole::Vendor, Some(format!("vendor {address}")))
        } else if self.customer_domains.iter().any(|d| *d == domain) {
            (SenderRole::Customer, Some(format!("customer domain {domain}")))
        } else if frequent && !FREE_MAIL_PROVIDERS.contains(&domain.as_str()) {
            (
                SenderRole::Customer,
                Some(format!("frequent sender ({seen} prior messages)")),
            )
        } else {
            (SenderRole::Unknown, None)
        };

        let matched_domain_rule = if blocked {
            Some(format!("blocked domain {domain}"))
        } else {
            rule
        };

        let is_spam_likely = blocked
            || (role == SenderRole::Unknown && !frequent && self.looks_like_bulk(&address, &domain));

        SenderProfile {
            role,
            is_spam_likely,
            matched_domain_rule,
        }
    }

    fn looks_like_bulk(&self, address: &str, domain: &str) -> bool {
        let local = address.split('@').next().unwrap_or_default();
        if BULK_LOCAL_PARTS.iter().any(|p| local.contains(p)) {
            return true;
        }
        FREE_MAIL_PROVIDERS.contains(&domain)
            && (local.len() > 15 || self.random_local_part.is_match(local))
    }
}
