//! Progress tracking for a single ingestion run.
//!
//! The tracker counts per-message outcomes and remembers the history position
//! of every message that reached a terminal outcome, so a run cut short by its
//! budget can still persist a watermark that skips nothing unprocessed.

use std::collections::HashSet;
use tracing::info;

use super::types::{RunStatus, SyncSummary};
use crate::mailbox::MessageRef;

/// Terminal outcome of one listed message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    Inserted,
    Duplicate,
    ParseFailed,
    /// Fetched but unreadable; counted with parse failures.
    Undecodable,
    /// Deleted between listing and fetching.
    Unavailable,
}

/// Service for tracking ingestion progress
#[derive(Debug, Clone, Default)]
pub struct SyncProgressTracker {
    /// Ids of messages that reached a terminal outcome
    completed: HashSet<String>,
    /// Numeric positions of completed messages
    completed_positions: Vec<u128>,
    new_transactions: usize,
    duplicates_skipped: usize,
    parse_failures: usize,
    unavailable_messages: usize,
    /// Completed count at the last progress log
    last_logged: usize,
}

impl SyncProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a message reached a terminal outcome
    pub fn record(&mut self, message: &MessageRef, outcome: MessageOutcome) {
        if !self.completed.insert(message.id.clone()) {
            return;
        }
        if let Some(position) = message.position.as_deref().and_then(|p| p.parse::<u128>().ok()) {
            self.completed_positions.push(position);
        }
        match outcome {
            MessageOutcome::Inserted => self.new_transactions += 1,
            MessageOutcome::Duplicate => self.duplicates_skipped += 1,
            MessageOutcome::ParseFailed | MessageOutcome::Undecodable => self.parse_failures += 1,
            MessageOutcome::Unavailable => self.unavailable_messages += 1,
        }
    }

    pub fn is_complete(&self, message_id: &str) -> bool {
        self.completed.contains(message_id)
    }

    /// Highest completed position below every unfinished message of `batch`.
    ///
    /// Resuming from it re-lists every unfinished message and nothing below.
    /// `None` when positions are unknown or nothing qualifies.
    pub fn safe_watermark(&self, batch: &[MessageRef]) -> Option<String> {
        let mut lowest_pending: Option<u128> = None;
        for message in batch.iter().filter(|m| !self.is_complete(&m.id)) {
            let position = message.position.as_deref()?.parse::<u128>().ok()?;
            lowest_pending = Some(lowest_pending.map_or(position, |low| low.min(position)));
        }

        self.completed_positions
            .iter()
            .copied()
            .filter(|p| lowest_pending.is_none_or(|low| *p < low))
            .max()
            .map(|p| p.to_string())
    }

    /// Log progress every 50 messages or when forced
    pub fn log_progress(&mut self, user_id: &str, force: bool) {
        let done = self.completed.len();
        if force || done.saturating_sub(self.last_logged) >= 50 {
            info!(
                user_id,
                "Ingestion progress: {} new, {} duplicates, {} parse failures, {} unavailable",
                self.new_transactions,
                self.duplicates_skipped,
                self.parse_failures,
                self.unavailable_messages
            );
            self.last_logged = done;
        }
    }

    pub fn summary(&self, status: RunStatus, budget_exhausted: bool, remapped_transactions: usize) -> SyncSummary {
        SyncSummary {
            new_transactions: self.new_transactions,
            duplicates_skipped: self.duplicates_skipped,
            parse_failures: self.parse_failures,
            remapped_transactions,
            unavailable_messages: self.unavailable_messages,
            budget_exhausted,
            status,
        }
    }
}
