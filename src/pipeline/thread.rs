//! Rule-based thread summaries.
//!
//! Built once per thread, after classification, from every same-thread email
//! in the batch. Messages are ordered by timestamp then id, so the summary
//! does not depend on input order. Quoted lines (`>`) are ignored.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use regex::Regex;

use crate::pipeline::types::{EmailRecord, Sentiment, ThreadSummary};

const MAX_ITEMS: usize = 5;
const MAX_KEY_POINTS: usize = 3;
const MAX_PARTICIPANTS: usize = 10;

const DECISION_PHRASES: &[&str] = &[
    "decided",
    "agreed",
    "approved",
    "confirmed",
    "will proceed",
    "moving forward",
    "have chosen",
    "final decision",
    "settled on",
];

const ACTION_PHRASES: &[&str] = &[
    "please",
    "need to",
    "should",
    "must",
    "will",
    "action item",
    "todo",
    "to do",
    "follow up",
    "next step",
];

const URGENT_WORDS: &[&str] = &["urgent", "asap", "immediately", "critical", "emergency"];
const POSITIVE_WORDS: &[&str] = &["thanks", "great", "excellent", "perfect", "appreciate"];
const NEGATIVE_WORDS: &[&str] = &["issue", "problem", "concern", "disappointed", "frustrated"];

fn any_of(phrases: &[&str]) -> Regex {
    let alternation = phrases
        .iter()
        .map(|p| regex::escape(p))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{alternation})\b")).expect("escaped phrases")
}

fn each_of(words: &[&str]) -> Vec<Regex> {
    words.iter().map(|w| any_of(&[*w])).collect()
}

pub struct ThreadSummarizer {
    sentence: Regex,
    decision: Regex,
    action: Regex,
    urgent: Regex,
    positive: Vec<Regex>,
    negative: Vec<Regex>,
}

impl Default for ThreadSummarizer {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadSummarizer {
    pub fn new() -> Self {
        Self {
            sentence: Regex::new(r"[^.!?]+[.!?]*").expect("static regex"),
            decision: any_of(DECISION_PHRASES),
            action: any_of(ACTION_PHRASES),
            urgent: any_of(URGENT_WORDS),
            positive: each_of(POSITIVE_WORDS),
            negative: each_of(NEGATIVE_WORDS),
        }
    }

    /// Summarize the batch's emails from one thread.
    ///
    /// A sentence is filed once: questions first, then decisions, then
    /// action items.
    pub fn summarize(&self, messages: &[&EmailRecord]) -> ThreadSummary {
        let mut ordered = messages.to_vec();
        ordered.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.message_id.cmp(&b.message_id))
        });
        let Some(latest) = ordered.last() else {
            return ThreadSummary::default();
        };

        let mut participants = BTreeSet::new();
        let mut key_points: Vec<String> = Vec::new();
        let mut decisions = Vec::new();
        let mut open_questions = Vec::new();
        let mut action_items = Vec::new();

        for email in &ordered {
            participants.insert(email.from.to_lowercase());
            participants.extend(email.to.iter().chain(&email.cc).map(|a| a.to_lowercase()));

            let subject = email.subject.trim();
            if !subject.is_empty()
                && key_points.len() < MAX_KEY_POINTS
                && !key_points.iter().any(|k| k == subject)
            {
                key_points.push(subject.to_string());
            }

            for sentence in self.sentences(&email.full_text()) {
                if sentence.ends_with('?') {
                    push_unique(&mut open_questions, &sentence, 10);
                } else if self.decision.is_match(&sentence) {
                    push_unique(&mut decisions, &sentence, 20);
                } else if self.action.is_match(&sentence) {
                    push_unique(&mut action_items, &sentence, 15);
                }
            }
        }

        let text = ordered
            .iter()
            .map(|e| e.full_text())
            .collect::<Vec<_>>()
            .join("\n");

        let mut summary = format!(
            "Thread about '{}' with {} message(s) from {} participant(s).",
            latest.subject.trim(),
            ordered.len(),
            participants.len()
        );
        for (count, label) in [
            (decisions.len(), "decision(s) made"),
            (open_questions.len(), "open question(s)"),
            (action_items.len(), "action item(s)"),
        ] {
            if count > 0 {
                summary.push_str(&format!(" {count} {label}."));
            }
        }

        ThreadSummary {
            summary,
            key_points,
            decisions,
            open_questions,
            action_items,
            participants: participants.into_iter().take(MAX_PARTICIPANTS).collect(),
            sentiment: self.sentiment(&text),
            message_count: ordered.len(),
        }
    }

    fn sentences(&self, text: &str) -> Vec<String> {
        text.lines()
            .filter(|line| !line.trim_start().starts_with('>'))
            .flat_map(|line| self.sentence.find_iter(line))
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    fn sentiment(&self, text: &str) -> Sentiment {
        if self.urgent.is_match(text) {
            return Sentiment::Urgent;
        }
        let hits = |words: &[Regex]| words.iter().filter(|w| w.is_match(text)).count();
        match hits(&self.positive).cmp(&hits(&self.negative)) {
            Ordering::Greater => Sentiment::Positive,
            Ordering::Less => Sentiment::Negative,
            Ordering::Equal => Sentiment::Neutral,
        }
    }
}

/// Sentences shorter than `min_chars` or of 200 chars and more are noise.
fn push_unique(list: &mut Vec<String>, sentence: &str, min_chars: usize) {
    let len = sentence.chars().count();
    if list.len() < MAX_ITEMS
        && len >= min_chars
        && len < 200
        && !list.iter().any(|s| s == sentence)
    {
        list.push(sentence.to_string());
    }
}
