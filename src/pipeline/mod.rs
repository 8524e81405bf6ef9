//! The decision pipeline.
//!
//! Every email flows through:
//! 1. `SenderResolver` and `IntentExtractor`: who sent it, what it asks for
//! 2. `PriorityScorer`: 0-100 score with an evidence trail
//! 3. `EscalationScanner`, `SpamFilter`, `Categorizer`: exactly one category
//! 4. `ThreadSummarizer`, `ConflictResolver`: thread context, and the latest
//!    email per sender and thread wins
//! 5. `DndGate`, drafting, guardrails, `ApprovalGate`: one disposition
//!
//! **Nothing here sends mail.** Drafts are proposals gated for a human.

pub mod conflict;
pub mod dnd;
pub mod escalation;
pub mod gate;
pub mod intent;
pub mod processor;
pub mod rules;
pub mod scorer;
pub mod sender;
pub mod thread;
pub mod types;

pub use processor::{BatchOutcome, ProcessingBatch, TriagePipeline};
