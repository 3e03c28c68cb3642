use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::ledger::LedgerError;
use crate::mailbox::MailboxError;
use crate::store::StoreError;

/// Outcome of the most recent run for a user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
	#[default]
	NeverRun,
	Succeeded,
	/// The run stopped early and committed a prefix of the batch.
	Partial,
	Failed,
	NeedsReauthorization,
}

/// Persisted per-user progress through the mailbox history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
	pub user_id: String,
	/// Opaque provider position; `None` until the first successful run.
	pub watermark: Option<String>,
	/// Incremented by every save.
	pub version: u64,
	pub last_run_at: Option<DateTime<Utc>>,
	pub last_run_status: RunStatus,
}

impl SyncCursor {
	pub fn new(user_id: &str) -> Self {
		Self {
			user_id: user_id.to_string(),
			watermark: None,
			version: 0,
			last_run_at: None,
			last_run_status: RunStatus::NeverRun,
		}
	}

	/// Whether moving to `candidate` keeps the watermark from regressing.
	pub fn can_advance_to(&self, candidate: &str) -> bool {
		match &self.watermark {
			None => true,
			Some(current) => compare_watermarks(current, candidate) != Some(Ordering::Greater),
		}
	}
}

/// Numeric comparison when both positions are numeric.
///
/// Non-numeric positions are opaque and only compare equal to themselves.
pub fn compare_watermarks(a: &str, b: &str) -> Option<Ordering> {
	match (a.parse::<u128>(), b.parse::<u128>()) {
		(Ok(a), Ok(b)) => Some(a.cmp(&b)),
		_ if a == b => Some(Ordering::Equal),
		_ => None,
	}
}

/// Stages of a single run, logged on every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
	Idle,
	FetchingIds,
	FetchingBodies,
	Parsing,
	Writing,
	AdvancingCursor,
	Failed,
}

impl fmt::Display for RunState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			RunState::Idle => "idle",
			RunState::FetchingIds => "fetching_ids",
			RunState::FetchingBodies => "fetching_bodies",
			RunState::Parsing => "parsing",
			RunState::Writing => "writing",
			RunState::AdvancingCursor => "advancing_cursor",
			RunState::Failed => "failed",
		};
		f.write_str(name)
	}
}

/// What started a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
	Webhook,
	Poll,
	Manual,
}

impl fmt::Display for TriggerSource {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			TriggerSource::Webhook => "webhook",
			TriggerSource::Poll => "poll",
			TriggerSource::Manual => "manual",
		})
	}
}

/// Counters reported by a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
	pub new_transactions: usize,
	pub duplicates_skipped: usize,
	pub parse_failures: usize,
	/// Transactions moved out of Uncategorized by the closing resweep.
	pub remapped_transactions: usize,
	/// Messages deleted between listing and fetching.
	pub unavailable_messages: usize,
	pub budget_exhausted: bool,
	pub status: RunStatus,
}

/// Errors that end a run
///
/// Cloneable so one result can be handed to every coalesced caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
	#[error("user {0} has no connected mailbox")]
	NotConnected(String),

	#[error("mailbox authorization revoked for user {0}")]
	AuthRevoked(String),

	#[error("transient failure: {0}")]
	Transient(String),

	#[error("storage error: {0}")]
	Storage(String),

	#[error("provider error: {0}")]
	Provider(String),
}

impl SyncError {
	/// Status recorded on the cursor when a run ends with this error.
	pub fn run_status(&self) -> RunStatus {
		match self {
			SyncError::AuthRevoked(_) => RunStatus::NeedsReauthorization,
			_ => RunStatus::Failed,
		}
	}
}

impl From<MailboxError> for SyncError {
	fn from(err: MailboxError) -> Self {
		match err {
			MailboxError::NotConnected(user) => SyncError::NotConnected(user),
			MailboxError::AuthRevoked(user) => SyncError::AuthRevoked(user),
			MailboxError::TransientFailure { .. } => SyncError::Transient(err.to_string()),
			MailboxError::Store(e) => SyncError::Storage(e.to_string()),
			other => SyncError::Provider(other.to_string()),
		}
	}
}

impl From<StoreError> for SyncError {
	fn from(err: StoreError) -> Self {
		SyncError::Storage(err.to_string())
	}
}

impl From<LedgerError> for SyncError {
	fn from(err: LedgerError) -> Self {
		SyncError::Storage(err.to_string())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_numeric_watermarks_compare_numerically() {
		assert_eq!(compare_watermarks("99", "100"), Some(Ordering::Less));
		assert_eq!(compare_watermarks("100", "100"), Some(Ordering::Equal));
		assert_eq!(compare_watermarks("abc", "abd"), None);
	}

	#[test]
	fn test_cursor_never_regresses() {
		let mut cursor = SyncCursor::new("u1");
		assert!(cursor.can_advance_to("5"));
		cursor.watermark = Some("100".into());
		assert!(cursor.can_advance_to("100"));
		assert!(cursor.can_advance_to("101"));
		assert!(!cursor.can_advance_to("99"));
	}

	#[test]
	fn test_revocation_maps_to_reauthorization() {
		let err: SyncError = MailboxError::AuthRevoked("u1".into()).into();
		assert_eq!(err.run_status(), RunStatus::NeedsReauthorization);
		let err: SyncError = MailboxError::TransientFailure { attempts: 3, last_error: "x".into() }.into();
		assert_eq!(err.run_status(), RunStatus::Failed);
	}
}
