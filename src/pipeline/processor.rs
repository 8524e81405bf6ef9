//! Batch processor: turns raw records into decision records and a queue.
//!
//! Flow:
//! 1. Validate records; invalid ones are skipped with a logged reason
//! 2. Classify every email in parallel (sender, intent, score, escalation,
//!    spam, category)
//! 3. Barrier, then summarize each thread and resolve same-sender
//!    same-thread conflicts once
//! 4. Finalize every email in parallel (DND, draft, guardrails, approval gate,
//!    follow-up)
//! 5. Barrier, then assemble the queue
//!
//! The pipeline never sends mail. Nothing reads the wall clock, so the same
//! input always gives the same output.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::config::TriageConfig;
use crate::connector::{FetchScope, MailConnector};
use crate::drafting::{
    DraftContext, DraftGenerator, FallbackDrafter, FollowUpSuggester, RuleFollowUpSuggester,
    reply_envelope,
};
use crate::error::{Error, InputError, PipelineError, Result};
use crate::guardrails::{GuardrailSet, PiiScanner, ScanContext};
use crate::pipeline::conflict::ConflictResolver;
use crate::pipeline::dnd::{DndDecision, DndGate};
use crate::pipeline::escalation::{EscalationScan, EscalationScanner};
use crate::pipeline::gate::ApprovalGate;
use crate::pipeline::intent::IntentExtractor;
use crate::pipeline::rules::{Categorizer, CategoryInput, CategoryRule, SpamFilter};
use crate::pipeline::scorer::PriorityScorer;
use crate::pipeline::sender::{SenderHistory, SenderResolver};
use crate::pipeline::thread::ThreadSummarizer;
use crate::pipeline::types::{
    Category, DecisionRecord, Disposition, DraftReply, EmailRecord, Intent, IntentResult,
    PriorityScore, RawEmailRecord, ReplyEnvelope, SenderProfile, SpamVerdict, ThreadSummary,
};
use crate::queue::{DecisionQueue, MetricsReport, QueueBuilder, batch_id};

/// Characters of (redacted) body kept as a preview.
const PREVIEW_CHARS: usize = 160;

/// Run-scoped owner of the validated emails and the batch settings.
///
/// DND state is captured here once and cannot change mid-run.
#[derive(Debug)]
pub struct ProcessingBatch {
    pub scope: FetchScope,
    pub dnd: DndGate,
    pub emails: Vec<EmailRecord>,
    pub skipped: Vec<InputError>,
}

impl ProcessingBatch {
    /// Validate raw records, keeping batch order.
    pub fn ingest(raw: Vec<RawEmailRecord>, scope: FetchScope, dnd: DndGate) -> Self {
        let mut emails = Vec::with_capacity(raw.len());
        let mut skipped = Vec::new();
        for (position, record) in raw.into_iter().enumerate() {
            match EmailRecord::from_raw(record, position) {
                Ok(email) => emails.push(email),
                Err(e) => {
                    warn!(position, error = %e, "Skipping invalid record");
                    skipped.push(e);
                }
            }
        }
        Self {
            scope,
            dnd,
            emails,
            skipped,
        }
    }
}

/// Everything a run produced.
#[derive(Debug)]
pub struct BatchOutcome {
    pub queue: DecisionQueue,
    pub metrics: MetricsReport,
    pub records: Vec<DecisionRecord>,
    pub skipped: Vec<InputError>,
}

/// Pure per-email stages. Shared read-only across classification tasks.
struct Classifiers {
    sender: SenderResolver,
    intent: IntentExtractor,
    scorer: PriorityScorer,
    escalation: EscalationScanner,
    spam: SpamFilter,
    categorizer: Categorizer,
}

/// Phase-one result for one email.
struct Classified {
    email: EmailRecord,
    sender: SenderProfile,
    intent: IntentResult,
    score: PriorityScore,
    spam: SpamVerdict,
    escalation: EscalationScan,
    category: Category,
    category_rule: CategoryRule,
}

impl Classifiers {
    fn classify(&self, email: EmailRecord, history: &SenderHistory) -> Classified {
        let sender = self.sender.resolve(&email.from, history);
        let intent = self.intent.extract(&email);
        let thread = email.thread_meta();
        let score = self.scorer.score(&sender, &intent, &thread);
        let escalation = self.escalation.scan(&email);
        let spam = self.spam.evaluate(&email, &sender);
        let (category, category_rule) = self.categorizer.categorize(&CategoryInput {
            spam: &spam,
            regulated_topic: escalation.topic,
            score: &score,
            intent: &intent,
            thread: &thread,
        });

        debug!(
            message_id = %email.message_id,
            role = sender.role.label(),
            score = score.value,
            category = category.label(),
            rule = category_rule.name(),
            spam = spam.is_spam,
            "Email classified"
        );

        Classified {
            email,
            sender,
            intent,
            score,
            spam,
            escalation,
            category,
            category_rule,
        }
    }
}

/// The decision pipeline for one mailbox configuration.
pub struct TriagePipeline {
    config: Arc<TriageConfig>,
    classifiers: Arc<Classifiers>,
    history: Arc<SenderHistory>,
    summarizer: ThreadSummarizer,
    guardrails: GuardrailSet,
    drafter: FallbackDrafter,
    follow_ups: Box<dyn FollowUpSuggester>,
    gate: ApprovalGate,
    queue: QueueBuilder,
    redactor: PiiScanner,
}

impl TriagePipeline {
    /// Build a pipeline with template-only drafting. Fails on invalid config.
    pub fn new(config: TriageConfig) -> Result<Self> {
        let config = config.normalized();
        config.validate()?;

        let classifiers = Classifiers {
            sender: SenderResolver::new(&config),
            intent: IntentExtractor::new(),
            scorer: PriorityScorer::new(&config),
            escalation: EscalationScanner::new(&config),
            spam: SpamFilter::new(&config),
            categorizer: Categorizer::new(&config),
        };

        Ok(Self {
            guardrails: GuardrailSet::from_config(&config),
            drafter: FallbackDrafter::template_only(),
            follow_ups: Box::new(RuleFollowUpSuggester),
            gate: ApprovalGate::new(&config),
            queue: QueueBuilder::new(config.max_headline),
            redactor: PiiScanner::new(),
            classifiers: Arc::new(classifiers),
            history: Arc::new(SenderHistory::new()),
            summarizer: ThreadSummarizer::new(),
            config: Arc::new(config),
        })
    }

    /// Use an external generator, falling back to the template on failure.
    pub fn with_generator(mut self, generator: Arc<dyn DraftGenerator>) -> Self {
        self.drafter = FallbackDrafter::new(generator, self.config.generator_timeout());
        self
    }

    pub fn with_follow_up_suggester(mut self, suggester: Box<dyn FollowUpSuggester>) -> Self {
        self.follow_ups = suggester;
        self
    }

    pub fn with_guardrails(mut self, guardrails: GuardrailSet) -> Self {
        self.guardrails = guardrails;
        self
    }

    /// Prior message counts per sender, used to recognize frequent senders.
    pub fn with_sender_history(mut self, history: SenderHistory) -> Self {
        self.history = Arc::new(
            history
                .into_iter()
                .map(|(address, count)| (address.trim().to_lowercase(), count))
                .collect(),
        );
        self
    }

    pub fn config(&self) -> &TriageConfig {
        &self.config
    }

    /// Fetch from a connector and process the result.
    ///
    /// A connector failure fails the whole batch; nothing is retried.
    pub async fn run_from_connector(
        &self,
        connector: &dyn MailConnector,
        scope: &FetchScope,
    ) -> Result<BatchOutcome> {
        let raw = connector.fetch(scope).await.map_err(|e| {
            warn!(connector = connector.name(), error = %e, "Ingestion failed");
            PipelineError::Ingestion(e)
        })?;
        info!(connector = connector.name(), count = raw.len(), "Fetched records");
        self.process(ProcessingBatch::ingest(raw, scope.clone(), DndGate::new(&self.config)))
            .await
    }

    /// Process records that are already in hand.
    pub async fn run(&self, raw: Vec<RawEmailRecord>) -> Result<BatchOutcome> {
        self.process(ProcessingBatch::ingest(
            raw,
            FetchScope::default(),
            DndGate::new(&self.config),
        ))
        .await
    }

    pub async fn process(&self, batch: ProcessingBatch) -> Result<BatchOutcome> {
        let ProcessingBatch {
            scope,
            dnd,
            emails,
            skipped,
        } = batch;

        if emails.is_empty() && !skipped.is_empty() {
            return Err(PipelineError::NoUsableRecords {
                skipped: skipped.len(),
            }
            .into());
        }

        info!(
            emails = emails.len(),
            skipped = skipped.len(),
            dnd = dnd.is_enabled(),
            max_results = ?scope.max_results,
            "Processing batch"
        );

        let classified = self.classify_all(emails).await?;
        let threads = self.summarize_threads(&classified);

        let superseded = ConflictResolver::resolve(
            classified
                .iter()
                .enumerate()
                .filter(|(_, c)| !c.spam.is_spam)
                .map(|(index, c)| (index, &c.email)),
        );
        let winners: Vec<Option<String>> = (0..classified.len())
            .map(|index| {
                superseded
                    .get(&index)
                    .map(|winner| classified[*winner].email.message_id.clone())
            })
            .collect();

        let records: Vec<DecisionRecord> = join_all(
            classified
                .into_iter()
                .zip(winners)
                .map(|(c, superseded_by)| {
                    let thread = threads.get(&c.email.thread_id).cloned().unwrap_or_default();
                    self.finalize(c, thread, superseded_by, &dnd)
                }),
        )
        .await;

        let batch_id = batch_id(records.iter().map(|r| r.message_id.as_str()));
        let queue = self.queue.build(batch_id, &records);
        let metrics = MetricsReport::from_records(&records, skipped.len());

        Ok(BatchOutcome {
            queue,
            metrics,
            records,
            skipped,
        })
    }

    /// One task per email; results come back in batch order.
    async fn classify_all(&self, emails: Vec<EmailRecord>) -> Result<Vec<Classified>> {
        let handles: Vec<_> = emails
            .into_iter()
            .map(|email| {
                let classifiers = Arc::clone(&self.classifiers);
                let history = Arc::clone(&self.history);
                tokio::spawn(async move { classifiers.classify(email, &history) })
            })
            .collect();

        join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.map_err(|e| Error::from(PipelineError::TaskFailed(e.to_string()))))
            .collect()
    }

    /// One summary per thread id, over every email the batch holds for it.
    fn summarize_threads(&self, classified: &[Classified]) -> BTreeMap<String, ThreadSummary> {
        let mut members: BTreeMap<&str, Vec<&EmailRecord>> = BTreeMap::new();
        for c in classified {
            members
                .entry(c.email.thread_id.as_str())
                .or_default()
                .push(&c.email);
        }
        members
            .into_iter()
            .map(|(thread_id, emails)| {
                let summary = self.summarizer.summarize(&emails);
                debug!(
                    thread_id,
                    messages = summary.message_count,
                    sentiment = summary.sentiment.label(),
                    "Thread summarized"
                );
                (thread_id.to_string(), summary)
            })
            .collect()
    }

    async fn finalize(
        &self,
        c: Classified,
        thread: ThreadSummary,
        superseded_by: Option<String>,
        dnd: &DndGate,
    ) -> DecisionRecord {
        let envelope = reply_envelope(&c.email, &self.config);
        let mut flags = c.escalation.flags.clone();
        let mut notes = Vec::new();
        let mut draft = None;
        let mut follow_up = None;

        let disposition = if c.spam.is_spam {
            notes.push(format!(
                "Spam (score {}): drafting and guardrails skipped",
                c.spam.score
            ));
            Disposition::Blocked
        } else if let Some(winner) = &superseded_by {
            info!(message_id = %c.email.message_id, superseded_by = %winner, "Email superseded");
            notes.push(format!("Superseded by later email {winner} in the same thread"));
            Disposition::Superseded
        } else {
            let dnd_decision = dnd.decide(&c.score);
            match &dnd_decision {
                DndDecision::Suppress { auto_responder_note } => {
                    notes.push(format!(
                        "Do not disturb: draft suppressed (score {})",
                        c.score.value
                    ));
                    notes.extend(auto_responder_note.clone());
                }
                DndDecision::ForceApproval => notes.push(format!(
                    "Do not disturb: score {} bypasses suppression, approval required",
                    c.score.value
                )),
                DndDecision::Inactive => {}
            }
            if c.escalation.critical {
                notes.push("Critical escalation: drafting skipped".to_string());
            }

            if self.should_draft(&c, &dnd_decision) {
                draft = Some(self.build_draft(&c, &envelope, &mut notes).await);
            }

            flags.extend(self.guardrails.run(&ScanContext {
                email: &c.email,
                envelope: &envelope,
                draft: draft.as_ref(),
            }));

            let (disposition, reasons) = self.gate.decide(&flags, &envelope, &dnd_decision);
            notes.extend(reasons);
            if let Some(draft) = &mut draft {
                draft.requires_approval = disposition != Disposition::AutoSafe;
            }
            if disposition != Disposition::Blocked {
                follow_up = self.follow_ups.suggest(&c.email, &c.intent, &c.score);
            }
            disposition
        };

        info!(
            message_id = %c.email.message_id,
            score = c.score.value,
            category = c.category.label(),
            disposition = disposition.label(),
            flags = flags.len(),
            drafted = draft.is_some(),
            "Email processed"
        );

        DecisionRecord {
            preview: self.preview(&c.email.body),
            message_id: c.email.message_id,
            thread_id: c.email.thread_id,
            from: c.email.from,
            subject: c.email.subject,
            timestamp: c.email.timestamp,
            sender: c.sender,
            intent: c.intent,
            score: c.score,
            spam: c.spam,
            category: c.category,
            category_rule: c.category_rule.name().to_string(),
            flags,
            envelope,
            thread,
            draft,
            follow_up,
            disposition,
            superseded_by,
            notes,
        }
    }

    fn should_draft(&self, c: &Classified, dnd: &DndDecision) -> bool {
        if !self.config.draft_replies || c.escalation.critical || dnd.suppresses_draft() {
            return false;
        }
        c.category == Category::Action
            || [
                Intent::Question,
                Intent::CommitmentRequest,
                Intent::MeetingRequest,
            ]
            .iter()
            .any(|i| c.intent.has(*i))
    }

    async fn build_draft(
        &self,
        c: &Classified,
        envelope: &ReplyEnvelope,
        notes: &mut Vec<String>,
    ) -> DraftReply {
        let context = DraftContext {
            intent: c.intent.clone(),
            category: c.category,
            sender_role: c.sender.role,
            priority: c.score.value,
        };
        let outcome = self.drafter.draft(&c.email, &context).await;

        let mut evidence = vec![format!("Generated by {}", outcome.generator)];
        if let Some(reason) = &outcome.fallback_reason {
            evidence.push(format!("Template fallback: {reason}"));
            notes.push(format!("Draft generator failed, template used: {reason}"));
        }
        evidence.push(format!(
            "Category {} via {} rule",
            c.category.label(),
            c.category_rule.name()
        ));
        evidence.push(format!(
            "Priority {} ({})",
            c.score.value,
            c.score.level.label()
        ));

        DraftReply {
            to: envelope.to.clone(),
            cc: envelope.cc.clone(),
            subject: outcome.text.subject,
            body: outcome.text.body,
            tone_label: outcome.text.tone_label,
            external_recipient_count: envelope.external_recipient_count,
            reply_all_risk: envelope.reply_all_risk,
            requires_approval: true,
            reasoning: format!(
                "Reply to a {} email from a {} sender",
                c.category.label(),
                c.sender.role.label()
            ),
            confidence: outcome.text.confidence,
            evidence,
            used_fallback: outcome.fallback_reason.is_some(),
        }
    }

    fn preview(&self, body: &str) -> String {
        let redacted = self.redactor.redact(body);
        let flat = redacted.split_whitespace().collect::<Vec<_>>().join(" ");
        flat.chars().take(PREVIEW_CHARS).collect()
    }
}
