//! Do-not-disturb gate.
//!
//! DND state is captured once when the gate is built and never changes for
//! the rest of the run.

use crate::config::TriageConfig;
use crate::pipeline::types::PriorityScore;

/// What DND does to one email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DndDecision {
    /// DND is off.
    Inactive,
    /// Below the bypass threshold: no draft. Carries the auto-responder note
    /// when the auto-responder is enabled.
    Suppress { auto_responder_note: Option<String> },
    /// At or above the bypass threshold: draft, but a human must approve.
    ForceApproval,
}

impl DndDecision {
    pub fn suppresses_draft(&self) -> bool {
        matches!(self, Self::Suppress { .. })
    }

    pub fn forces_approval(&self) -> bool {
        matches!(self, Self::ForceApproval)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DndGate {
    enabled: bool,
    auto_responder: bool,
    bypass_threshold: u8,
}

impl DndGate {
    pub fn new(config: &TriageConfig) -> Self {
        Self {
            enabled: config.dnd_enabled,
            auto_responder: config.auto_responder_enabled,
            bypass_threshold: config.dnd_bypass_threshold,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn decide(&self, score: &PriorityScore) -> DndDecision {
        if !self.enabled {
            return DndDecision::Inactive;
        }
        if score.value >= self.bypass_threshold {
            return DndDecision::ForceApproval;
        }
        let auto_responder_note = self.auto_responder.then(|| {
            format!(
                "Do not disturb: out-of-office acknowledgement due (score {} below {})",
                score.value, self.bypass_threshold
            )
        });
        DndDecision::Suppress { auto_responder_note }
    }
}
