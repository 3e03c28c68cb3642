use crate::mailbox::{MailboxAdapter, MailboxError, MessageBatch};
use tracing::info;

/// Trait for the ways a run lists candidate messages
#[async_trait::async_trait]
pub trait SyncStrategy: Send + Sync {
	/// List the messages to process for `user_id`.
	async fn list(&self, adapter: &MailboxAdapter, user_id: &str) -> Result<MessageBatch, MailboxError>;

	/// Get the name of this strategy
	fn name(&self) -> &'static str;
}

/// Strategy for resuming from a stored watermark
pub struct IncrementalHistorySync {
	watermark: String,
}

impl IncrementalHistorySync {
	pub fn new(watermark: &str) -> Self {
		Self {
			watermark: watermark.to_string(),
		}
	}
}

#[async_trait::async_trait]
impl SyncStrategy for IncrementalHistorySync {
	async fn list(&self, adapter: &MailboxAdapter, user_id: &str) -> Result<MessageBatch, MailboxError> {
		info!(user_id, watermark = %self.watermark, "Listing mailbox history");
		adapter.fetch_new_message_ids(user_id, &self.watermark).await
	}

	fn name(&self) -> &'static str {
		"incremental"
	}
}

/// Strategy for a bounded rescan when no usable watermark exists
pub struct RecentRescanSync {
	limit: usize,
}

impl RecentRescanSync {
	pub fn new(limit: usize) -> Self {
		Self { limit }
	}
}

#[async_trait::async_trait]
impl SyncStrategy for RecentRescanSync {
	async fn list(&self, adapter: &MailboxAdapter, user_id: &str) -> Result<MessageBatch, MailboxError> {
		info!(user_id, limit = self.limit, "Rescanning most recent messages");
		adapter.rescan_recent(user_id, self.limit).await
	}

	fn name(&self) -> &'static str {
		"rescan"
	}
}
