//! Spam filter and category precedence rules.
//!
//! The spam filter weighs independent signals into a score with its own
//! evidence trail. Category assignment is an ordered rule list evaluated
//! top-to-bottom; the first rule that fires decides:
//! - spam verdict → Spam
//! - legal/finance escalation → Legal or Finance
//! - score at threshold, or an actionable intent → Action
//! - awaiting-reply thread or meeting request → Waiting
//! - everything else → Fyi

use regex::Regex;
use tracing::debug;

use crate::config::{TriageConfig, domain_of};
use crate::pipeline::types::{
    Category, EmailRecord, Intent, IntentResult, PriorityScore, SenderProfile, SenderRole,
    SpamVerdict, ThreadMeta,
};

const SPAM_LIKELY_SENDER_WEIGHT: u32 = 40;
const KEYWORD_WEIGHT: u32 = 10;
const KEYWORD_CAP: u32 = 30;
const SPAM_LABEL_WEIGHT: u32 = 50;
const UNSUBSCRIBE_WEIGHT: u32 = 20;
const BULK_RECIPIENT_WEIGHT: u32 = 15;
const LINK_FLOOD_WEIGHT: u32 = 15;
const BLOCKED_DOMAIN_WEIGHT: u32 = 50;

const BULK_RECIPIENT_LIMIT: usize = 10;
const MAX_LINKS: usize = 5;
const MAX_CLICK_HERE: usize = 2;

/// Which field a rule matches against.
#[derive(Debug, Clone, Copy)]
pub enum RuleField {
    Sender,
    Subject,
    Content,
}

/// One spam keyword rule with a compiled regex.
#[derive(Debug, Clone)]
pub struct SpamRule {
    pub regex: Regex,
    pub field: RuleField,
    /// Evidence label when the rule fires.
    pub reason: String,
}

impl SpamRule {
    fn matches(&self, email: &EmailRecord) -> bool {
        match self.field {
            RuleField::Sender => self.regex.is_match(&email.from),
            RuleField::Subject => self.regex.is_match(&email.subject),
            RuleField::Content => {
                self.regex.is_match(&email.subject) || self.regex.is_match(&email.body)
            }
        }
    }
}

/// Weighted spam scoring.
pub struct SpamFilter {
    keyword_rules: Vec<SpamRule>,
    unsubscribe: Regex,
    link: Regex,
    click_here: Regex,
    blocked_domains: Vec<String>,
    threshold: u32,
}

impl SpamFilter {
    /// Filter with the built-in keyword list.
    pub fn new(config: &TriageConfig) -> Self {
        let keyword = |pattern: &str, reason: &str| SpamRule {
            regex: Regex::new(pattern).expect("static spam pattern"),
            field: RuleField::Content,
            reason: reason.into(),
        };
        let keyword_rules = vec![
            keyword(r"(?i)\bclick here\b", "click here"),
            keyword(r"(?i)\blimited[- ]time offer\b", "limited time offer"),
            keyword(r"(?i)\bact now\b", "act now"),
            keyword(r"(?i)\bfree\b", "free"),
            keyword(r"(?i)\bwinner\b", "winner"),
            keyword(r"(?i)\bcongratulations\b", "congratulations"),
            keyword(r"(?i)\bclaim your\b", "claim your"),
            keyword(r"(?i)\bexclusive deal\b", "exclusive deal"),
        ];

        Self {
            keyword_rules,
            unsubscribe: Regex::new(r"(?i)\bunsubscribe\b").expect("static regex"),
            link: Regex::new(r"(?i)https?://").expect("static regex"),
            click_here: Regex::new(r"(?i)\bclick here\b").expect("static regex"),
            blocked_domains: config.blocked_domains.iter().cloned().collect(),
            threshold: config.spam_threshold,
        }
    }

    /// Add a custom keyword rule. Each firing rule counts toward keyword density.
    pub fn add_keyword_rule(
        &mut self,
        pattern: &str,
        field: RuleField,
        reason: &str,
    ) -> Result<(), regex::Error> {
        self.keyword_rules.push(SpamRule {
            regex: Regex::new(pattern)?,
            field,
            reason: reason.into(),
        });
        Ok(())
    }

    pub fn evaluate(&self, email: &EmailRecord, sender: &SenderProfile) -> SpamVerdict {
        let mut score = 0;
        let mut evidence = Vec::new();

        if sender.is_spam_likely {
            score += SPAM_LIKELY_SENDER_WEIGHT;
            evidence.push(format!("Sender looks like bulk or spam (+{SPAM_LIKELY_SENDER_WEIGHT})"));
        }

        let hits: Vec<&str> = self
            .keyword_rules
            .iter()
            .filter(|rule| rule.matches(email))
            .map(|rule| rule.reason.as_str())
            .collect();
        if !hits.is_empty() {
            let points = (KEYWORD_WEIGHT * hits.len() as u32).min(KEYWORD_CAP);
            score += points;
            evidence.push(format!("Spam keywords: {} (+{points})", hits.join(", ")));
        }

        if email.labels.iter().any(|l| l.eq_ignore_ascii_case("spam")) {
            score += SPAM_LABEL_WEIGHT;
            evidence.push(format!("Mail store labelled SPAM (+{SPAM_LABEL_WEIGHT})"));
        }

        let text = email.full_text();
        if self.unsubscribe.is_match(&text) {
            score += UNSUBSCRIBE_WEIGHT;
            evidence.push(format!("Unsubscribe link (+{UNSUBSCRIBE_WEIGHT})"));
        }

        let recipients = email.to.len() + email.cc.len() + email.bcc.len();
        if email.to.is_empty() || recipients > BULK_RECIPIENT_LIMIT {
            score += BULK_RECIPIENT_WEIGHT;
            evidence.push(format!(
                "Bulk recipient pattern, {recipients} recipient(s) (+{BULK_RECIPIENT_WEIGHT})"
            ));
        }

        if self.link.find_iter(&text).count() > MAX_LINKS
            || self.click_here.find_iter(&text).count() > MAX_CLICK_HERE
        {
            score += LINK_FLOOD_WEIGHT;
            evidence.push(format!("Link flood (+{LINK_FLOOD_WEIGHT})"));
        }

        let domain = domain_of(&email.from);
        if sender.role != SenderRole::Vip && self.blocked_domains.iter().any(|d| *d == domain) {
            score += BLOCKED_DOMAIN_WEIGHT;
            evidence.push(format!("Sender domain {domain} is block-listed (+{BLOCKED_DOMAIN_WEIGHT})"));
        }

        let is_spam = score >= self.threshold;
        debug!(
            message_id = %email.message_id,
            spam_score = score,
            is_spam,
            "Spam check"
        );

        SpamVerdict {
            is_spam,
            score,
            evidence,
        }
    }
}

/// Everything a category rule may look at. All fields are computed upstream.
pub struct CategoryInput<'a> {
    pub spam: &'a SpamVerdict,
    /// Legal or Finance when the escalation scan matched.
    pub regulated_topic: Option<Category>,
    pub score: &'a PriorityScore,
    pub intent: &'a IntentResult,
    pub thread: &'a ThreadMeta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryRule {
    Spam,
    RegulatedTopic,
    Action,
    Waiting,
    Fyi,
}

/// Fixed precedence, highest first.
pub const CATEGORY_PRECEDENCE: [CategoryRule; 5] = [
    CategoryRule::Spam,
    CategoryRule::RegulatedTopic,
    CategoryRule::Action,
    CategoryRule::Waiting,
    CategoryRule::Fyi,
];

impl CategoryRule {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Spam => "spam",
            Self::RegulatedTopic => "regulated_topic",
            Self::Action => "action",
            Self::Waiting => "waiting",
            Self::Fyi => "fyi",
        }
    }

    /// `Some` when this rule fires.
    pub fn evaluate(&self, input: &CategoryInput<'_>, priority_threshold: u8) -> Option<Category> {
        match self {
            Self::Spam => input.spam.is_spam.then_some(Category::Spam),
            Self::RegulatedTopic => input.regulated_topic,
            Self::Action => (input.score.value >= priority_threshold
                || input.intent.has_actionable_intent())
            .then_some(Category::Action),
            Self::Waiting => (input.thread.awaiting_reply
                || input.intent.has(Intent::MeetingRequest))
            .then_some(Category::Waiting),
            Self::Fyi => Some(Category::Fyi),
        }
    }
}

pub struct Categorizer {
    rules: Vec<CategoryRule>,
    priority_threshold: u8,
}

impl Categorizer {
    pub fn new(config: &TriageConfig) -> Self {
        Self {
            rules: CATEGORY_PRECEDENCE.to_vec(),
            priority_threshold: config.priority_threshold,
        }
    }

    /// First firing rule wins. Returns the category and the rule that decided it.
    pub fn categorize(&self, input: &CategoryInput<'_>) -> (Category, CategoryRule) {
        self.rules
            .iter()
            .find_map(|rule| {
                rule.evaluate(input, self.priority_threshold)
                    .map(|category| (category, *rule))
            })
            .unwrap_or((Category::Fyi, CategoryRule::Fyi))
    }
}
