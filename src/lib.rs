//! Inbox triage: reduces a batch of emails to a gated decision queue.

pub mod config;
pub mod connector;
pub mod drafting;
pub mod error;
pub mod guardrails;
pub mod pipeline;
pub mod queue;
