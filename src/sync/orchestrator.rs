//! Ingestion orchestrator.
//!
//! One call to [`IngestionOrchestrator::run`] takes a user from the stored
//! cursor to a committed batch:
//!
//! `Idle -> FetchingIds -> FetchingBodies -> Parsing -> Writing -> AdvancingCursor -> Idle`
//!
//! with `Failed` reachable from every state. The orchestrator is the only
//! component that decides whether an error skips a message or aborts the run.
//! The watermark moves only after every listed message reached a terminal
//! outcome, or, when the run budget ran out, up to the last position below
//! every unfinished message.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::message_processor::{FetchedMessage, MessageProcessor};
use super::progress_tracker::SyncProgressTracker;
use super::strategies::{IncrementalHistorySync, RecentRescanSync, SyncStrategy};
use super::types::{RunState, RunStatus, SyncCursor, SyncError, SyncSummary, compare_watermarks};
use crate::ledger::WalletReconciler;
use crate::mailbox::{MailboxAdapter, MailboxError, MessageBatch, MessageRef, RawMessage};
use crate::store::CursorRepository;

/// Configuration for ingestion runs
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Messages listed by a rescan
    pub rescan_limit: usize,
    /// Wall-clock budget of one run
    pub run_budget: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            rescan_limit: 100,
            run_budget: Duration::from_secs(120),
        }
    }
}

/// Runs ingestion for one user at a time.
///
/// Callers serialize runs per user; the coordinator does this.
pub struct IngestionOrchestrator {
    adapter: Arc<MailboxAdapter>,
    processor: MessageProcessor,
    reconciler: Arc<WalletReconciler>,
    cursors: Arc<dyn CursorRepository>,
    config: OrchestratorConfig,
}

/// Per-run state machine, logging every transition.
struct RunTracker<'a> {
    user_id: &'a str,
    state: RunState,
}

impl<'a> RunTracker<'a> {
    fn new(user_id: &'a str) -> Self {
        Self {
            user_id,
            state: RunState::Idle,
        }
    }

    fn transition(&mut self, next: RunState) {
        if self.state == next {
            return;
        }
        // Parsing and Writing alternate per message.
        if matches!(next, RunState::Parsing | RunState::Writing) {
            debug!(user_id = self.user_id, from = %self.state, to = %next, "Run state changed");
        } else {
            info!(user_id = self.user_id, from = %self.state, to = %next, "Run state changed");
        }
        self.state = next;
    }
}

/// Drop repeated ids, keeping the first listing and the latest position.
fn dedupe(messages: Vec<MessageRef>) -> Vec<MessageRef> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<MessageRef> = Vec::with_capacity(messages.len());
    for message in messages {
        match index.get(&message.id) {
            Some(&at) => {
                let existing = &mut unique[at];
                let later = match (existing.position.as_deref(), message.position.as_deref()) {
                    (Some(a), Some(b)) => {
                        compare_watermarks(a, b) == Some(Ordering::Less)
                    }
                    (None, Some(_)) => true,
                    _ => false,
                };
                if later {
                    existing.position = message.position;
                }
            }
            None => {
                index.insert(message.id.clone(), unique.len());
                unique.push(message);
            }
        }
    }
    unique
}

impl IngestionOrchestrator {
    pub fn new(
        adapter: Arc<MailboxAdapter>,
        processor: MessageProcessor,
        reconciler: Arc<WalletReconciler>,
        cursors: Arc<dyn CursorRepository>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            adapter,
            processor,
            reconciler,
            cursors,
            config,
        }
    }

    /// Ingest everything new for `user_id` and advance the cursor.
    pub async fn run(&self, user_id: &str) -> Result<SyncSummary, SyncError> {
        let deadline = Instant::now() + self.config.run_budget;
        let mut run = RunTracker::new(user_id);

        // Revoked or missing credentials stop the run before any provider call.
        if let Err(e) = self.adapter.credential(user_id).await {
            let err = SyncError::from(e);
            if matches!(err, SyncError::AuthRevoked(_)) {
                let cursor = self.load_cursor(user_id).await?;
                self.record_failure(cursor, &err).await;
            }
            warn!(user_id, "Run short-circuited: {}", err);
            return Err(err);
        }

        let cursor = self.load_cursor(user_id).await?;
        match self.run_batch(&mut run, &cursor, deadline).await {
            Ok(summary) => Ok(summary),
            Err(err) => {
                run.transition(RunState::Failed);
                error!(user_id, "Run failed: {}", err);
                self.record_failure(cursor, &err).await;
                Err(err)
            }
        }
    }

    async fn load_cursor(&self, user_id: &str) -> Result<SyncCursor, SyncError> {
        Ok(self
            .cursors
            .load(user_id)
            .await?
            .unwrap_or_else(|| SyncCursor::new(user_id)))
    }

    async fn run_batch(
        &self,
        run: &mut RunTracker<'_>,
        cursor: &SyncCursor,
        deadline: Instant,
    ) -> Result<SyncSummary, SyncError> {
        let user_id = run.user_id;

        run.transition(RunState::FetchingIds);
        let (batch, rescanned) = self.list_messages(user_id, cursor).await?;

        if batch.messages.is_empty() && !rescanned {
            info!(user_id, "No new messages");
            run.transition(RunState::Idle);
            return Ok(SyncProgressTracker::new().summary(RunStatus::Succeeded, false, 0));
        }

        let messages = dedupe(batch.messages);
        let mut tracker = SyncProgressTracker::new();
        let mut budget_exhausted = false;

        run.transition(RunState::FetchingBodies);
        let mut fetched: Vec<(MessageRef, RawMessage)> = Vec::with_capacity(messages.len());
        for message in &messages {
            if Instant::now() >= deadline {
                warn!(
                    user_id,
                    fetched = fetched.len(),
                    listed = messages.len(),
                    "Run budget exhausted; stopping fetch"
                );
                budget_exhausted = true;
                break;
            }
            match self.processor.fetch(user_id, &message.id).await? {
                FetchedMessage::Body(body) => fetched.push((message.clone(), body)),
                FetchedMessage::Skipped(outcome) => tracker.record(message, outcome),
            }
        }

        // Stable: equal timestamps keep listing order.
        fetched.sort_by_key(|(_, body)| body.received_at);

        for (message, body) in &fetched {
            run.transition(RunState::Parsing);
            debug!(user_id, message_id = %message.id, "Processing message");
            let outcome = self.processor.ingest(user_id, body).await?;
            run.transition(RunState::Writing);
            tracker.record(message, outcome);
            tracker.log_progress(user_id, false);
        }
        tracker.log_progress(user_id, true);

        run.transition(RunState::AdvancingCursor);
        let candidate = if budget_exhausted {
            tracker.safe_watermark(&messages)
        } else {
            batch.new_watermark
        };
        let status = if budget_exhausted {
            RunStatus::Partial
        } else {
            RunStatus::Succeeded
        };

        let mut next = cursor.clone();
        match candidate {
            Some(watermark) if next.can_advance_to(&watermark) => next.watermark = Some(watermark),
            Some(watermark) => {
                warn!(
                    user_id,
                    current = ?next.watermark,
                    candidate = %watermark,
                    "Refusing to move the watermark backwards"
                );
            }
            None => {}
        }
        next.last_run_at = Some(chrono::Utc::now());
        next.last_run_status = status;
        let saved = self.cursors.save(&next).await?;

        // The batch is committed; a failed resweep is retried by the next run.
        let remapped = match self.reconciler.resweep_uncategorized(user_id).await {
            Ok(remapped) => remapped,
            Err(e) => {
                warn!(user_id, "Closing resweep failed: {}", e);
                0
            }
        };
        run.transition(RunState::Idle);

        let summary = tracker.summary(status, budget_exhausted, remapped);
        info!(
            user_id,
            new_transactions = summary.new_transactions,
            duplicates_skipped = summary.duplicates_skipped,
            parse_failures = summary.parse_failures,
            remapped_transactions = summary.remapped_transactions,
            watermark = ?saved.watermark,
            status = ?summary.status,
            "Run complete"
        );
        Ok(summary)
    }

    /// List candidate messages; the flag is set when a rescan produced them.
    async fn list_messages(
        &self,
        user_id: &str,
        cursor: &SyncCursor,
    ) -> Result<(MessageBatch, bool), SyncError> {
        let rescan = RecentRescanSync::new(self.config.rescan_limit);
        let Some(watermark) = cursor.watermark.as_deref() else {
            info!(user_id, strategy = rescan.name(), "No stored watermark");
            return Ok((rescan.list(&self.adapter, user_id).await?, true));
        };

        let incremental = IncrementalHistorySync::new(watermark);
        match incremental.list(&self.adapter, user_id).await {
            Ok(batch) => Ok((batch, false)),
            Err(MailboxError::CursorExpired) => {
                warn!(user_id, watermark, "Stored watermark expired; falling back to rescan");
                Ok((rescan.list(&self.adapter, user_id).await?, true))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Persist the failed status without touching the watermark.
    async fn record_failure(&self, mut cursor: SyncCursor, err: &SyncError) {
        cursor.last_run_at = Some(chrono::Utc::now());
        cursor.last_run_status = err.run_status();
        if let Err(e) = self.cursors.save(&cursor).await {
            error!(user_id = %cursor.user_id, "Failed to record run status: {}", e);
        }
    }
}
