//! Approval gate: the one place a disposition is decided for a live email.

use crate::config::TriageConfig;
use crate::pipeline::dnd::DndDecision;
use crate::pipeline::types::{Disposition, ReplyEnvelope, SecurityFlag};

#[derive(Debug, Clone, Copy)]
pub struct ApprovalGate {
    require_approval_for_external: bool,
}

impl ApprovalGate {
    pub fn new(config: &TriageConfig) -> Self {
        Self {
            require_approval_for_external: config.require_approval_for_external,
        }
    }

    /// Blocked on any blocking flag. Otherwise a human must approve when the
    /// reply leaves the organization, risks a reply-all, falls under DND, or
    /// carries any advisory flag.
    pub fn decide(
        &self,
        flags: &[SecurityFlag],
        envelope: &ReplyEnvelope,
        dnd: &DndDecision,
    ) -> (Disposition, Vec<String>) {
        let blocking: Vec<String> = flags
            .iter()
            .filter(|f| f.blocks_send)
            .map(|f| f.description.clone())
            .collect();
        if !blocking.is_empty() {
            return (Disposition::Blocked, blocking);
        }

        let mut reasons = Vec::new();
        if self.require_approval_for_external && envelope.external_recipient_count > 0 {
            reasons.push(format!(
                "{} external recipient(s)",
                envelope.external_recipient_count
            ));
        }
        if envelope.reply_all_risk {
            reasons.push(format!(
                "Reply-all risk ({} recipients, {} external)",
                envelope.total_recipients(),
                envelope.external_recipient_count
            ));
        }
        if dnd.forces_approval() {
            reasons.push("Do not disturb is on".to_string());
        }
        for flag in flags {
            reasons.push(format!("Advisory {} flag: {}", flag.kind.label(), flag.description));
        }

        if reasons.is_empty() {
            (Disposition::AutoSafe, reasons)
        } else {
            (Disposition::NeedsApproval, reasons)
        }
    }
}
