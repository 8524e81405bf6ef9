//! End-to-end runs of the decision pipeline over in-memory and on-disk batches.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use inbox_triage::config::TriageConfig;
use inbox_triage::connector::{
    EmlDirConnector, FetchScope, JsonFileConnector, MailConnector, MemoryConnector,
};
use inbox_triage::drafting::{DraftContext, DraftGenerator, DraftText, FALLBACK_CONFIDENCE};
use inbox_triage::error::{Error, GenerationError, PipelineError};
use inbox_triage::pipeline::TriagePipeline;
use inbox_triage::pipeline::types::{
    Category, DecisionRecord, Disposition, EmailRecord, FlagKind, RawEmailRecord,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0).unwrap()
}

fn email(id: &str, from: &str, subject: &str, body: &str) -> RawEmailRecord {
    RawEmailRecord {
        message_id: Some(id.into()),
        from: Some(from.into()),
        to: vec!["me@corp.com".into()],
        subject: subject.into(),
        body: body.into(),
        timestamp: Some(at(5, 9)),
        ..Default::default()
    }
}

fn config() -> TriageConfig {
    TriageConfig {
        team_domains: ["corp.com".to_string()].into(),
        vip_domains: ["board.org".to_string()].into(),
        customer_domains: ["client.io".to_string()].into(),
        owner_address: Some("me@corp.com".into()),
        ..TriageConfig::default()
    }
}

async fn run(config: TriageConfig, records: Vec<RawEmailRecord>) -> Vec<DecisionRecord> {
    TriagePipeline::new(config)
        .unwrap()
        .run(records)
        .await
        .unwrap()
        .records
}

fn find<'a>(records: &'a [DecisionRecord], id: &str) -> &'a DecisionRecord {
    records
        .iter()
        .find(|r| r.message_id == id)
        .unwrap_or_else(|| panic!("no record {id}"))
}

fn mixed_batch() -> Vec<RawEmailRecord> {
    let mut vip = email(
        "vip-1",
        "chair@board.org",
        "Board deck",
        "Urgent: can you send the board deck today? ASAP please.",
    );
    vip.timestamp = Some(at(5, 8));
    let mut spam = email(
        "spam-1",
        "deals@promo-blast.biz",
        "Congratulations WINNER",
        "Click here to claim your free prize! Unsubscribe anytime.",
    );
    spam.timestamp = Some(at(5, 7));
    let mut fyi = email(
        "fyi-1",
        "ops@corp.com",
        "Office closed",
        "FYI the office is closed for maintenance over the weekend.",
    );
    fyi.timestamp = Some(at(4, 16));
    let mut legal = email(
        "legal-1",
        "counsel@outside-law.com",
        "Agreement",
        "Please review the binding agreement and confirm the wire transfer details.",
    );
    legal.timestamp = Some(at(5, 10));
    let mut question = email(
        "q-1",
        "bob@corp.com",
        "Launch plan",
        "Could you confirm the launch plan by Friday?",
    );
    question.timestamp = Some(at(5, 11));
    vec![vip, spam, fyi, legal, question]
}

// ── Classification ──────────────────────────────────────────────────

#[tokio::test]
async fn every_email_gets_one_category_and_a_bounded_score() {
    let records = run(config(), mixed_batch()).await;
    assert_eq!(records.len(), 5);
    for record in &records {
        assert!(record.score.value <= 100);
        if record.score.value > 0 {
            assert!(!record.score.evidence.is_empty(), "{}", record.message_id);
        }
        assert!((0.0..=1.0).contains(&record.score.confidence));
        assert!(!record.category_rule.is_empty());
    }
    assert_eq!(find(&records, "spam-1").category, Category::Spam);
    assert_eq!(find(&records, "legal-1").category, Category::Legal);
    assert_eq!(find(&records, "fyi-1").category, Category::Fyi);
    assert_eq!(find(&records, "q-1").category, Category::Action);
}

#[tokio::test]
async fn polite_request_with_deadline_has_hidden_urgency() {
    let records = run(
        config(),
        vec![email(
            "m1",
            "dana@client.io",
            "Paperwork",
            "When you get a chance, could you kindly send the signed contract by tomorrow morning? Thanks!",
        )],
    )
    .await;
    let record = &records[0];
    assert!(record.intent.is_polite);
    assert!(record.intent.urgency_keywords.is_empty());
    assert_eq!(record.intent.extracted_deadline.as_ref().unwrap().phrase, "tomorrow");
    assert!(record.score.hidden_urgency);
    // customer 25 + commitment 10 + question 5 + near deadline 10 + hidden 15
    assert_eq!(record.score.value, 65);
    assert!(record.score.evidence.iter().any(|e| e.starts_with("Hidden urgency")));
}

// ── Blocking ────────────────────────────────────────────────────────

#[tokio::test]
async fn spam_and_critical_escalations_are_never_drafted() {
    let records = run(config(), mixed_batch()).await;

    let spam = find(&records, "spam-1");
    assert!(spam.spam.is_spam);
    assert_eq!(spam.disposition, Disposition::Blocked);
    assert!(spam.draft.is_none());
    assert!(spam.flags.is_empty(), "guardrails must not run on spam");

    let legal = find(&records, "legal-1");
    assert_eq!(legal.disposition, Disposition::Blocked);
    assert!(legal.draft.is_none());
    assert!(legal.blocking_flags().any(|f| f.kind == FlagKind::Legal));
}

#[tokio::test]
async fn luhn_valid_card_number_blocks_the_email() {
    let pipeline = TriagePipeline::new(config()).unwrap();
    let outcome = pipeline
        .run(vec![email(
            "card-1",
            "bob@corp.com",
            "Order",
            "Can you place the order with card 4111 1111 1111 1111 today?",
        )])
        .await
        .unwrap();
    let record = &outcome.records[0];
    assert_eq!(record.disposition, Disposition::Blocked);
    assert!(!record.preview.contains("4111 1111 1111 1111"));
    assert_eq!(outcome.queue.blocked_items.len(), 1);
    assert!(
        outcome.queue.blocked_items[0]
            .reasons
            .iter()
            .any(|r| r.contains("card_number"))
    );
    assert!(outcome.queue.headline_emails.is_empty());
}

struct CardLeakingGenerator;

#[async_trait]
impl DraftGenerator for CardLeakingGenerator {
    fn name(&self) -> &str {
        "card-leaking"
    }

    async fn generate(
        &self,
        email: &EmailRecord,
        _context: &DraftContext,
    ) -> Result<DraftText, GenerationError> {
        Ok(DraftText {
            subject: format!("Re: {}", email.subject),
            body: "Sure, use 4111111111111111 for the order.".into(),
            tone_label: "professional".into(),
            confidence: 0.8,
        })
    }
}

#[tokio::test]
async fn card_number_in_generated_draft_blocks_the_email() {
    let outcome = TriagePipeline::new(config())
        .unwrap()
        .with_generator(Arc::new(CardLeakingGenerator))
        .run(vec![email(
            "card-2",
            "bob@corp.com",
            "Order",
            "Can you place the supplies order?",
        )])
        .await
        .unwrap();

    let record = &outcome.records[0];
    assert_eq!(record.disposition, Disposition::Blocked);
    assert!(record.draft.is_some());
    assert!(
        record
            .blocking_flags()
            .any(|f| f.description == "card_number detected in draft")
    );

    let queue = &outcome.queue;
    assert_eq!(queue.blocked_items.len(), 1);
    assert!(
        queue.blocked_items[0]
            .reasons
            .iter()
            .any(|r| r == "card_number detected in draft")
    );
    assert!(queue.draft_replies.is_empty());
    assert_eq!(queue.summary.drafts_created, queue.draft_replies.len());
}

// ── Conflicts ───────────────────────────────────────────────────────

#[tokio::test]
async fn latest_email_in_a_sender_thread_supersedes_earlier_ones() {
    let batch: Vec<RawEmailRecord> = [("t1", 8), ("t2", 9), ("t3", 10)]
        .into_iter()
        .map(|(id, hour)| {
            let mut r = email(id, "a@x.com", "Status", "Could you check the status?");
            r.thread_id = Some("T".into());
            r.timestamp = Some(at(5, hour));
            r
        })
        .collect();
    let mut other_thread = email("u1", "a@x.com", "Other", "Could you check this too?");
    other_thread.thread_id = Some("U".into());

    let pipeline = TriagePipeline::new(config()).unwrap();
    let mut input = batch;
    input.push(other_thread);
    let outcome = pipeline.run(input).await.unwrap();

    for id in ["t1", "t2"] {
        let record = find(&outcome.records, id);
        assert_eq!(record.disposition, Disposition::Superseded);
        assert_eq!(record.superseded_by.as_deref(), Some("t3"));
        assert!(record.draft.is_none());
    }
    assert_ne!(find(&outcome.records, "t3").disposition, Disposition::Superseded);
    assert_ne!(find(&outcome.records, "u1").disposition, Disposition::Superseded);
    assert!(
        outcome
            .queue
            .headline_emails
            .iter()
            .all(|h| h.message_id != "t1" && h.message_id != "t2")
    );
    assert_eq!(outcome.metrics.superseded_count, 2);
}

// ── Approval ────────────────────────────────────────────────────────

#[tokio::test]
async fn wide_reply_with_one_external_needs_approval() {
    let mut wide = email(
        "wide-1",
        "bob@corp.com",
        "Plan",
        "Can you confirm the plan?",
    );
    wide.to = vec![
        "me@corp.com".into(),
        "c1@corp.com".into(),
        "c2@corp.com".into(),
    ];
    wide.cc = vec![
        "c3@corp.com".into(),
        "c4@corp.com".into(),
        "ext@partner.io".into(),
    ];

    let records = run(config(), vec![wide]).await;
    let record = &records[0];
    assert_eq!(record.envelope.total_recipients(), 6);
    assert_eq!(record.envelope.external_recipient_count, 1);
    assert!(record.envelope.reply_all_risk);
    assert_eq!(record.disposition, Disposition::NeedsApproval);
    let draft = record.draft.as_ref().unwrap();
    assert!(draft.reply_all_risk);
    assert!(draft.requires_approval);
    assert!(!draft.cc.contains(&"me@corp.com".to_string()));
}

#[tokio::test]
async fn clean_internal_reply_is_auto_safe() {
    let records = run(
        config(),
        vec![email("m1", "bob@corp.com", "Deck", "Can you review the deck.")],
    )
    .await;
    let record = &records[0];
    assert_eq!(record.disposition, Disposition::AutoSafe);
    assert!(!record.draft.as_ref().unwrap().requires_approval);
}

// ── Do not disturb ──────────────────────────────────────────────────

#[tokio::test]
async fn dnd_suppresses_low_scores_and_gates_high_ones() {
    let config = TriageConfig {
        dnd_enabled: true,
        auto_responder_enabled: true,
        ..config()
    };
    let low = email("low", "bob@corp.com", "Deck", "Can you review the deck.");
    let mut high = email(
        "high",
        "chair@board.org",
        "Board deck",
        "Urgent: can you send the board deck today? ASAP please.",
    );
    high.thread_id = Some("board".into());

    let records = run(config, vec![low, high]).await;

    let low = find(&records, "low");
    assert_eq!(low.score.value, 40);
    assert!(low.draft.is_none());
    assert!(low.notes.iter().any(|n| n.contains("out-of-office")));

    let high = find(&records, "high");
    assert!(high.score.value >= 80);
    assert!(high.draft.is_some());
    assert_eq!(high.disposition, Disposition::NeedsApproval);
    assert!(high.draft.as_ref().unwrap().requires_approval);
}

// ── Determinism ─────────────────────────────────────────────────────

#[tokio::test]
async fn identical_input_gives_byte_identical_output() {
    let pipeline = TriagePipeline::new(config()).unwrap();
    let first = pipeline.run(mixed_batch()).await.unwrap();
    let second = pipeline.run(mixed_batch()).await.unwrap();
    assert_eq!(
        serde_json::to_string(&first.queue).unwrap(),
        serde_json::to_string(&second.queue).unwrap()
    );
    assert_eq!(
        serde_json::to_string(&first.records).unwrap(),
        serde_json::to_string(&second.records).unwrap()
    );

    let mut reversed = mixed_batch();
    reversed.reverse();
    let third = pipeline.run(reversed).await.unwrap();
    assert_eq!(
        serde_json::to_string(&first.queue).unwrap(),
        serde_json::to_string(&third.queue).unwrap()
    );
}

#[tokio::test]
async fn queue_is_sorted_and_summarized() {
    let outcome = TriagePipeline::new(config())
        .unwrap()
        .run(mixed_batch())
        .await
        .unwrap();
    let queue = &outcome.queue;
    let scores: Vec<u8> = queue.headline_emails.iter().map(|h| h.score).collect();
    let mut sorted = scores.clone();
    sorted.sort_by(|a, b| b.cmp(a));
    assert_eq!(scores, sorted);
    assert_eq!(queue.summary.total_processed, 5);
    assert_eq!(queue.summary.blocked, 2);
    assert_eq!(queue.headline_emails.len(), 3);
    assert_eq!(queue.summary.drafts_created, queue.draft_replies.len());
}

// ── Thread context ──────────────────────────────────────────────────

#[tokio::test]
async fn same_thread_emails_share_one_thread_summary() {
    let mut proposal = email(
        "th-1",
        "ann@corp.com",
        "Launch date",
        "We agreed to launch on the 20th. Can you confirm the venue booking?",
    );
    proposal.thread_id = Some("launch".into());
    proposal.timestamp = Some(at(5, 8));
    let mut reply = email(
        "th-2",
        "bob@corp.com",
        "Re: Launch date",
        "Thanks. Please send the final guest list by Friday.",
    );
    reply.thread_id = Some("launch".into());
    let other = email("solo", "cat@corp.com", "Lunch", "Lunch is on me today.");

    let outcome = TriagePipeline::new(config())
        .unwrap()
        .run(vec![reply, other, proposal])
        .await
        .unwrap();

    let first = find(&outcome.records, "th-1");
    let second = find(&outcome.records, "th-2");
    assert_eq!(first.thread, second.thread);
    assert_eq!(first.thread.message_count, 2);
    assert_eq!(
        first.thread.decisions,
        vec!["We agreed to launch on the 20th."]
    );
    assert_eq!(
        first.thread.open_questions,
        vec!["Can you confirm the venue booking?"]
    );
    assert!(first.thread.summary.starts_with("Thread about 'Re: Launch date'"));
    assert_eq!(find(&outcome.records, "solo").thread.message_count, 1);

    let headline = outcome
        .queue
        .headline_emails
        .iter()
        .find(|h| h.message_id == "th-2")
        .unwrap();
    assert_eq!(headline.thread_summary, second.thread.summary);
}

// ── Failures ────────────────────────────────────────────────────────

#[tokio::test]
async fn connector_failure_fails_the_batch() {
    let pipeline = TriagePipeline::new(config()).unwrap();
    let connector = JsonFileConnector::new("/nonexistent/batch.json");
    let err = pipeline
        .run_from_connector(&connector, &FetchScope::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Pipeline(PipelineError::Ingestion(_))));
}

#[tokio::test]
async fn batch_without_usable_records_is_an_error() {
    let mut a = email("a", "x", "Hi", "");
    a.from = None;
    let mut b = email("b", "y@x.com", "Hi", "");
    b.timestamp = None;
    let err = TriagePipeline::new(config())
        .unwrap()
        .run(vec![a, b])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Pipeline(PipelineError::NoUsableRecords { skipped: 2 })
    ));
}

struct FailingGenerator;

#[async_trait]
impl DraftGenerator for FailingGenerator {
    fn name(&self) -> &str {
        "failing"
    }

    async fn generate(
        &self,
        _email: &EmailRecord,
        _context: &DraftContext,
    ) -> Result<DraftText, GenerationError> {
        Err(GenerationError::Quota {
            provider: "failing".into(),
        })
    }
}

struct SlowGenerator;

#[async_trait]
impl DraftGenerator for SlowGenerator {
    fn name(&self) -> &str {
        "slow"
    }

    async fn generate(
        &self,
        _email: &EmailRecord,
        _context: &DraftContext,
    ) -> Result<DraftText, GenerationError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Err(GenerationError::Unavailable {
            provider: "slow".into(),
            reason: "never".into(),
        })
    }
}

#[tokio::test]
async fn generator_failures_fall_back_to_the_template() {
    let short_timeout = TriageConfig {
        generator_timeout_ms: 50,
        ..config()
    };
    for generator in [
        Arc::new(FailingGenerator) as Arc<dyn DraftGenerator>,
        Arc::new(SlowGenerator) as Arc<dyn DraftGenerator>,
    ] {
        let outcome = TriagePipeline::new(short_timeout.clone())
            .unwrap()
            .with_generator(generator)
            .run(vec![email(
                "m1",
                "bob@corp.com",
                "Deck",
                "Can you review the deck.",
            )])
            .await
            .unwrap();
        let draft = outcome.records[0].draft.as_ref().unwrap();
        assert_eq!(draft.confidence, FALLBACK_CONFIDENCE);
        assert!(draft.used_fallback);
        assert!(draft.evidence.iter().any(|e| e.starts_with("Template fallback")));
        assert_eq!(outcome.metrics.fallback_drafts, 1);
    }
}

// ── Connectors ──────────────────────────────────────────────────────

#[tokio::test]
async fn memory_connector_scope_limits_the_batch() {
    let connector = MemoryConnector::new(mixed_batch());
    let outcome = TriagePipeline::new(config())
        .unwrap()
        .run_from_connector(
            &connector,
            &FetchScope {
                max_results: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome.records.len(), 2);
    assert_eq!(connector.name(), "memory");
}

#[tokio::test]
async fn eml_directory_runs_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("001.eml"),
        "From: Bob <bob@corp.com>\r\n\
To: me@corp.com\r\n\
Subject: Budget\r\n\
Date: Wed, 05 Mar 2025 09:00:00 +0000\r\n\
Message-ID: <b1@corp.com>\r\n\
\r\n\
Could you approve the budget by tomorrow?\r\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("002.eml"), "not a message at all").unwrap();

    let outcome = TriagePipeline::new(config())
        .unwrap()
        .run_from_connector(&EmlDirConnector::new(dir.path()), &FetchScope::default())
        .await
        .unwrap();
    let record = find(&outcome.records, "b1@corp.com");
    assert_eq!(record.category, Category::Action);
    assert!(record.follow_up.is_some());
    assert_eq!(outcome.queue.follow_ups.len(), 1);
}
