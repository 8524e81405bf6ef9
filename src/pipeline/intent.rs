//! Intent, urgency, politeness and deadline extraction.
//!
//! Deadline matching is phrase-based, not a calendar parser. Phrases it does
//! not recognize yield no deadline. Dates resolve against the email's own
//! timestamp so the same text always gives the same answer.

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc, Weekday};
use regex::{Captures, Regex};

use crate::pipeline::types::{EmailRecord, ExtractedDeadline, Intent, IntentResult};

const URGENCY_KEYWORDS: &[&str] = &[
    "urgent",
    "asap",
    "immediately",
    "emergency",
    "critical",
    "deadline",
    "time-sensitive",
    "eod",
    "today",
];

const POLITENESS_MARKERS: &[&str] = &[
    "please",
    "kindly",
    "when you get a chance",
    "could you",
    "would you",
    "at your convenience",
    "when possible",
    "would you mind",
];

/// How a matched deadline phrase maps to a date.
#[derive(Debug, Clone, Copy)]
enum DeadlineRule {
    SameDay,
    NextDay,
    Weekday,
    EndOfWeek,
    NextWeek,
    IsoDate,
    NumericDate,
    MonthDay,
}

struct DeadlinePattern {
    regex: Regex,
    rule: DeadlineRule,
}

/// Compiled scanners for intent extraction. Build once per run.
pub struct IntentExtractor {
    question: Regex,
    meeting: Regex,
    commitment: Regex,
    fyi: Regex,
    due_word: Regex,
    urgency: Vec<(String, Regex)>,
    politeness: Vec<Regex>,
    deadlines: Vec<DeadlinePattern>,
}

fn word_regex(phrase: &str) -> Regex {
    Regex::new(&format!(r"(?i)\b{}\b", regex::escape(phrase))).expect("escaped phrase")
}

impl IntentExtractor {
    pub fn new() -> Self {
        let deadline = |pattern: &str, rule| DeadlinePattern {
            regex: Regex::new(pattern).expect("static deadline pattern"),
            rule,
        };

        Self {
            question: Regex::new(
                r"(?im)\?|^\s*(who|what|when|where|why|how|can|could|would|will|is|are|do|does|did)\b[^.!\n]*$",
            )
            .expect("static regex"),
            meeting: Regex::new(
                r"(?i)\b(meeting|meet|call|schedule|reschedule|calendar|availability|available|sync|catch up|zoom|invite)\b",
            )
            .expect("static regex"),
            commitment: Regex::new(
                r"(?i)\b(can you|could you|will you|need you to|please (send|review|confirm|approve|sign|provide|share|update|forward)|let me know|confirm|approve|sign off)\b",
            )
            .expect("static regex"),
            fyi: Regex::new(
                r"(?i)\b(fyi|for your information|for your reference|heads up|no action (needed|required)|just letting you know)\b",
            )
            .expect("static regex"),
            due_word: Regex::new(r"(?i)\b(deadline|due)\b").expect("static regex"),
            urgency: URGENCY_KEYWORDS
                .iter()
                .map(|k| (k.to_string(), word_regex(k)))
                .collect(),
            politeness: POLITENESS_MARKERS.iter().map(|m| word_regex(m)).collect(),
            deadlines: vec![
                deadline(
                    r"(?i)\b(today|tonight|eod|end of (the )?day)\b",
                    DeadlineRule::SameDay,
                ),
                deadline(r"(?i)\btomorrow\b", DeadlineRule::NextDay),
                deadline(
                    r"(?i)\b(?:by|on|before|this)\s+(monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b",
                    DeadlineRule::Weekday,
                ),
                deadline(
                    r"(?i)\b(end of (the )?week|eow)\b",
                    DeadlineRule::EndOfWeek,
                ),
                deadline(r"(?i)\bnext week\b", DeadlineRule::NextWeek),
                deadline(
                    r"\b(\d{4})-(\d{2})-(\d{2})\b",
                    DeadlineRule::IsoDate,
                ),
                deadline(
                    r"\b(\d{1,2})/(\d{1,2})(?:/(\d{2}|\d{4}))?\b",
                    DeadlineRule::NumericDate,
                ),
                deadline(
                    r"(?i)\b(jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\.?\s+(\d{1,2})(?:st|nd|rd|th)?\b",
                    DeadlineRule::MonthDay,
                ),
            ],
        }
    }

    /// Extract intents from subject and body.
    pub fn extract(&self, email: &EmailRecord) -> IntentResult {
        let text = email.full_text();
        let mut result = IntentResult::default();

        if self.question.is_match(&text) {
            result.intents.insert(Intent::Question);
        }
        if self.meeting.is_match(&text) {
            result.intents.insert(Intent::MeetingRequest);
        }
        if self.commitment.is_match(&text) {
            result.intents.insert(Intent::CommitmentRequest);
        }

        result.urgency_keywords = self
            .urgency
            .iter()
            .filter(|(_, regex)| regex.is_match(&text))
            .map(|(keyword, _)| keyword.clone())
            .collect();
        result.is_polite = self.politeness.iter().any(|r| r.is_match(&text));
        result.extracted_deadline = self.extract_deadline(&text, email.timestamp);

        if result.extracted_deadline.is_some() || self.due_word.is_match(&text) {
            result.intents.insert(Intent::Deadline);
        }
        if self.fyi.is_match(&text) || result.intents.is_empty() {
            result.intents.insert(Intent::Fyi);
        }

        result
    }

    /// Earliest recognizable deadline phrase in `text`.
    pub fn extract_deadline(&self, text: &str, sent: DateTime<Utc>) -> Option<ExtractedDeadline> {
        let anchor = sent.date_naive();
        let mut best: Option<(usize, ExtractedDeadline)> = None;

        for pattern in &self.deadlines {
            for caps in pattern.regex.captures_iter(text) {
                let Some(whole) = caps.get(0) else { continue };
                if best.as_ref().is_some_and(|(start, _)| *start <= whole.start()) {
                    break;
                }
                if let Some(date) = resolve(pattern.rule, &caps, anchor) {
                    best = Some((
                        whole.start(),
                        ExtractedDeadline {
                            phrase: whole.as_str().to_lowercase(),
                            date,
                        },
                    ));
                    break;
                }
            }
        }

        best.map(|(_, deadline)| deadline)
    }
}

impl Default for IntentExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve(rule: DeadlineRule, caps: &Captures<'_>, anchor: NaiveDate) -> Option<NaiveDate> {
    let number = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
    match rule {
        DeadlineRule::SameDay => Some(anchor),
        DeadlineRule::NextDay => anchor.checked_add_days(Days::new(1)),
        DeadlineRule::Weekday => {
            let target = caps.get(1)?.as_str().to_lowercase().parse::<Weekday>().ok()?;
            let ahead = days_until(anchor.weekday(), target);
            anchor.checked_add_days(Days::new(if ahead == 0 { 7 } else { ahead }))
        }
        DeadlineRule::EndOfWeek => {
            anchor.checked_add_days(Days::new(days_until(anchor.weekday(), Weekday::Fri)))
        }
        DeadlineRule::NextWeek => anchor.checked_add_days(Days::new(7)),
        DeadlineRule::IsoDate => {
            NaiveDate::from_ymd_opt(number(1)? as i32, number(2)?, number(3)?)
        }
        DeadlineRule::NumericDate => {
            let (month, day) = (number(1)?, number(2)?);
            match caps.get(3) {
                Some(year) => {
                    let year: i32 = year.as_str().parse().ok()?;
                    let year = if year < 100 { 2000 + year } else { year };
                    NaiveDate::from_ymd_opt(year, month, day)
                }
                None => next_occurrence(anchor, month, day),
            }
        }
        DeadlineRule::MonthDay => {
            let month = month_number(caps.get(1)?.as_str())?;
            next_occurrence(anchor, month, number(2)?)
        }
    }
}

fn days_until(from: Weekday, to: Weekday) -> u64 {
    let from = from.num_days_from_monday() as i64;
    let to = to.num_days_from_monday() as i64;
    (to - from).rem_euclid(7) as u64
}

/// The first `month`/`day` on or after `anchor`.
fn next_occurrence(anchor: NaiveDate, month: u32, day: u32) -> Option<NaiveDate> {
    let this_year = NaiveDate::from_ymd_opt(anchor.year(), month, day)?;
    if this_year >= anchor {
        Some(this_year)
    } else {
        NaiveDate::from_ymd_opt(anchor.year() + 1, month, day)
    }
}

fn month_number(name: &str) -> Option<u32> {
    let month = match &name.to_lowercase()[..3] {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}
