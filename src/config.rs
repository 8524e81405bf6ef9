//! Configuration types.
//!
//! A `TriageConfig` is built once before a run (defaults, a JSON file, or
//! `TRIAGE_*` environment variables), validated, and then shared read-only
//! by every stage through an `Arc`. Nothing mutates it mid-run.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Policy and domain configuration for one triage run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TriageConfig {
    /// Score at or above which an email is high priority (and actionable).
    pub priority_threshold: u8,
    /// Sender domains treated as VIP.
    pub vip_domains: BTreeSet<String>,
    /// Individual sender addresses treated as VIP.
    pub vip_addresses: BTreeSet<String>,
    /// The organization's own domains. Anything else is external.
    pub team_domains: BTreeSet<String>,
    /// Known vendor addresses or domains.
    pub vendor_addresses: BTreeSet<String>,
    /// Known customer domains.
    pub customer_domains: BTreeSet<String>,
    /// Outbound allow list. Empty means no allow-list restriction.
    pub allowed_domains: BTreeSet<String>,
    /// Outbound deny list; also a sender reputation signal.
    pub blocked_domains: BTreeSet<String>,
    /// Mailbox owner, excluded from reply-all recipient lists.
    pub owner_address: Option<String>,

    pub require_approval_for_external: bool,
    pub enable_pii_detection: bool,
    pub enable_domain_restrictions: bool,
    pub enable_tone_enforcement: bool,
    /// Whether the pipeline drafts replies at all.
    pub draft_replies: bool,

    pub dnd_enabled: bool,
    pub auto_responder_enabled: bool,
    /// Under DND, emails scoring at least this still get a draft.
    pub dnd_bypass_threshold: u8,

    pub hidden_urgency_boost: u8,
    /// Hidden urgency applies only when explicit urgency keywords are fewer than this.
    pub hidden_urgency_keyword_threshold: usize,
    /// Deadlines within this many days of the email count as near-term.
    pub near_term_deadline_days: i64,
    pub reply_all_max_recipients: usize,
    pub reply_all_max_external: usize,
    pub spam_threshold: u32,
    /// Prior message count at which an otherwise unknown sender counts as a customer.
    pub frequent_sender_min: u32,
    /// Size of the headline list.
    pub max_headline: usize,
    pub generator_timeout_ms: u64,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            priority_threshold: 70,
            vip_domains: BTreeSet::new(),
            vip_addresses: BTreeSet::new(),
            team_domains: BTreeSet::new(),
            vendor_addresses: BTreeSet::new(),
            customer_domains: BTreeSet::new(),
            allowed_domains: BTreeSet::new(),
            blocked_domains: BTreeSet::new(),
            owner_address: None,
            require_approval_for_external: true,
            enable_pii_detection: true,
            enable_domain_restrictions: true,
            enable_tone_enforcement: true,
            draft_replies: true,
            dnd_enabled: false,
            auto_responder_enabled: false,
            dnd_bypass_threshold: 80,
            hidden_urgency_boost: 15,
            hidden_urgency_keyword_threshold: 2,
            near_term_deadline_days: 2,
            reply_all_max_recipients: 5,
            reply_all_max_external: 2,
            spam_threshold: 50,
            frequent_sender_min: 3,
            max_headline: 10,
            generator_timeout_ms: 10_000,
        }
    }
}

impl TriageConfig {
    /// Build config from environment variables, falling back to defaults.
    ///
    /// Lists are comma-separated (`TRIAGE_VIP_DOMAINS=acme.com,board.org`).
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(v) = env_parse("TRIAGE_PRIORITY_THRESHOLD")? {
            config.priority_threshold = v;
        }
        config.vip_domains.extend(env_list("TRIAGE_VIP_DOMAINS"));
        config.vip_addresses.extend(env_list("TRIAGE_VIP_ADDRESSES"));
        config.team_domains.extend(env_list("TRIAGE_TEAM_DOMAINS"));
        config.vendor_addresses.extend(env_list("TRIAGE_VENDOR_ADDRESSES"));
        config.customer_domains.extend(env_list("TRIAGE_CUSTOMER_DOMAINS"));
        config.allowed_domains.extend(env_list("TRIAGE_ALLOWED_DOMAINS"));
        config.blocked_domains.extend(env_list("TRIAGE_BLOCKED_DOMAINS"));
        if let Ok(owner) = std::env::var("TRIAGE_OWNER_ADDRESS")
            && !owner.trim().is_empty()
        {
            config.owner_address = Some(owner.trim().to_lowercase());
        }

        if let Some(v) = env_bool("TRIAGE_REQUIRE_APPROVAL_FOR_EXTERNAL")? {
            config.require_approval_for_external = v;
        }
        if let Some(v) = env_bool("TRIAGE_ENABLE_PII_DETECTION")? {
            config.enable_pii_detection = v;
        }
        if let Some(v) = env_bool("TRIAGE_ENABLE_DOMAIN_RESTRICTIONS")? {
            config.enable_domain_restrictions = v;
        }
        if let Some(v) = env_bool("TRIAGE_ENABLE_TONE_ENFORCEMENT")? {
            config.enable_tone_enforcement = v;
        }
        if let Some(v) = env_bool("TRIAGE_DRAFT_REPLIES")? {
            config.draft_replies = v;
        }
        if let Some(v) = env_bool("TRIAGE_DND_ENABLED")? {
            config.dnd_enabled = v;
        }
        if let Some(v) = env_bool("TRIAGE_AUTO_RESPONDER_ENABLED")? {
            config.auto_responder_enabled = v;
        }
        if let Some(v) = env_parse("TRIAGE_DND_BYPASS_THRESHOLD")? {
            config.dnd_bypass_threshold = v;
        }
        if let Some(v) = env_parse("TRIAGE_HIDDEN_URGENCY_BOOST")? {
            config.hidden_urgency_boost = v;
        }
        if let Some(v) = env_parse("TRIAGE_HIDDEN_URGENCY_KEYWORD_THRESHOLD")? {
            config.hidden_urgency_keyword_threshold = v;
        }
        if let Some(v) = env_parse("TRIAGE_NEAR_TERM_DEADLINE_DAYS")? {
            config.near_term_deadline_days = v;
        }
        if let Some(v) = env_parse("TRIAGE_SPAM_THRESHOLD")? {
            config.spam_threshold = v;
        }
        if let Some(v) = env_parse("TRIAGE_FREQUENT_SENDER_MIN")? {
            config.frequent_sender_min = v;
        }
        if let Some(v) = env_parse("TRIAGE_REPLY_ALL_MAX_RECIPIENTS")? {
            config.reply_all_max_recipients = v;
        }
        if let Some(v) = env_parse("TRIAGE_REPLY_ALL_MAX_EXTERNAL")? {
            config.reply_all_max_external = v;
        }
        if let Some(v) = env_parse("TRIAGE_MAX_HEADLINE")? {
            config.max_headline = v;
        }
        if let Some(v) = env_parse("TRIAGE_GENERATOR_TIMEOUT_MS")? {
            config.generator_timeout_ms = v;
        }

        Ok(config.normalized())
    }

    /// Load config from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self =
            serde_json::from_str(&raw).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        Ok(config.normalized())
    }

    /// Lowercase and trim every domain/address list.
    pub fn normalized(mut self) -> Self {
        for set in [
            &mut self.vip_domains,
            &mut self.vip_addresses,
            &mut self.team_domains,
            &mut self.vendor_addresses,
            &mut self.customer_domains,
            &mut self.allowed_domains,
            &mut self.blocked_domains,
        ] {
            *set = set
                .iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect();
        }
        self.owner_address = self.owner_address.map(|a| a.trim().to_lowercase());
        self
    }

    /// Reject configurations that would make a run meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("priorityThreshold", self.priority_threshold),
            ("dndBypassThreshold", self.dnd_bypass_threshold),
            ("hiddenUrgencyBoost", self.hidden_urgency_boost),
        ] {
            if value > 100 {
                return Err(ConfigError::InvalidValue {
                    key: key.into(),
                    message: format!("{value} is outside the 0-100 score scale"),
                });
            }
        }
        if self.max_headline == 0 {
            return Err(ConfigError::InvalidValue {
                key: "maxHeadline".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.near_term_deadline_days < 0 {
            return Err(ConfigError::InvalidValue {
                key: "nearTermDeadlineDays".into(),
                message: "must not be negative".into(),
            });
        }
        if self.generator_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "generatorTimeoutMs".into(),
                message: "must be greater than zero".into(),
            });
        }
        if let Some(domain) = self.allowed_domains.intersection(&self.blocked_domains).next() {
            return Err(ConfigError::Conflict(format!(
                "domain {domain} is both allowed and blocked"
            )));
        }
        if let Some(domain) = self.team_domains.intersection(&self.blocked_domains).next() {
            return Err(ConfigError::Conflict(format!(
                "team domain {domain} is also blocked"
            )));
        }
        Ok(())
    }

    /// Timeout applied to each external draft generation call.
    pub fn generator_timeout(&self) -> Duration {
        Duration::from_millis(self.generator_timeout_ms)
    }

    /// Whether a domain belongs to the organization.
    pub fn is_internal_domain(&self, domain: &str) -> bool {
        self.team_domains.contains(domain)
    }
}

/// Lowercased domain part of an address, or `""` when there is none.
pub fn domain_of(address: &str) -> String {
    address
        .rsplit_once('@')
        .map(|(_, d)| d.trim().trim_end_matches('>').to_lowercase())
        .unwrap_or_default()
}

fn env_list(key: &str) -> Vec<String> {
    std::env::var(key)
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.into(),
                message: format!("cannot parse '{raw}'"),
            }),
        Err(_) => Ok(None),
    }
}

fn env_bool(key: &str) -> Result<Option<bool>, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            other => Err(ConfigError::InvalidValue {
                key: key.into(),
                message: format!("expected a boolean, got '{other}'"),
            }),
        },
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_policy() {
        let config = TriageConfig::default();
        assert_eq!(config.priority_threshold, 70);
        assert!(config.require_approval_for_external);
        assert!(config.enable_pii_detection);
        assert!(config.enable_domain_restrictions);
        assert!(config.enable_tone_enforcement);
        assert!(!config.dnd_enabled);
        assert!(!config.auto_responder_enabled);
        assert_eq!(config.hidden_urgency_boost, 15);
        assert_eq!(config.reply_all_max_recipients, 5);
        assert_eq!(config.reply_all_max_external, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn json_fields_are_camel_case_with_defaults() {
        let config: TriageConfig = serde_json::from_str(
            r#"{"priorityThreshold": 60, "vipDomains": ["Board.ORG "], "dndEnabled": true}"#,
        )
        .unwrap();
        let config = config.normalized();
        assert_eq!(config.priority_threshold, 60);
        assert!(config.vip_domains.contains("board.org"));
        assert!(config.dnd_enabled);
        assert_eq!(config.dnd_bypass_threshold, 80);
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let config = TriageConfig {
            priority_threshold: 120,
            ..TriageConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn rejects_domain_both_allowed_and_blocked() {
        let mut config = TriageConfig::default();
        config.allowed_domains.insert("x.com".into());
        config.blocked_domains.insert("x.com".into());
        assert!(matches!(config.validate(), Err(ConfigError::Conflict(_))));
    }

    #[test]
    fn domain_of_handles_odd_input() {
        assert_eq!(domain_of("Alice@Example.COM"), "example.com");
        assert_eq!(domain_of("<bob@x.org>"), "x.org");
        assert_eq!(domain_of("no-at-sign"), "");
    }

    #[test]
    fn from_json_file_reads_partial_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("triage.json");
        std::fs::write(&path, r#"{"blockedDomains": ["Spam.biz"]}"#).unwrap();
        let config = TriageConfig::from_json_file(&path).unwrap();
        assert!(config.blocked_domains.contains("spam.biz"));
        assert_eq!(config.priority_threshold, 70);
    }
}
