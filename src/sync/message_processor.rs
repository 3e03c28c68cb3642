use std::sync::Arc;
use tracing::{debug, warn};

use super::progress_tracker::MessageOutcome;
use super::types::SyncError;
use crate::ledger::{TransactionWriter, WriteOutcome};
use crate::mailbox::{MailboxAdapter, MailboxError, ProviderError, RawMessage};
use crate::parser::Parser;

/// Result of fetching one listed message
#[derive(Debug)]
pub enum FetchedMessage {
	Body(RawMessage),
	/// Terminal without a body; the message is never retried.
	Skipped(MessageOutcome),
}

/// Fetches, parses and writes single messages
///
/// Per-message failures that do not abort a run come back as a
/// [`MessageOutcome`]; everything else is a [`SyncError`].
pub struct MessageProcessor {
	adapter: Arc<MailboxAdapter>,
	parser: Arc<Parser>,
	writer: Arc<TransactionWriter>,
}

impl MessageProcessor {
	pub fn new(adapter: Arc<MailboxAdapter>, parser: Arc<Parser>, writer: Arc<TransactionWriter>) -> Self {
		Self {
			adapter,
			parser,
			writer,
		}
	}

	/// Fetch one body.
	///
	/// Deleted and undecodable messages are skipped; only failures that would
	/// hit every message of the run come back as errors.
	pub async fn fetch(&self, user_id: &str, message_id: &str) -> Result<FetchedMessage, SyncError> {
		match self.adapter.fetch_message_body(user_id, message_id).await {
			Ok(message) => Ok(FetchedMessage::Body(message)),
			Err(MailboxError::MessageGone(_)) => {
				warn!(user_id, message_id, "Message disappeared before it could be fetched");
				Ok(FetchedMessage::Skipped(MessageOutcome::Unavailable))
			}
			Err(MailboxError::Provider(e @ (ProviderError::Decode(_) | ProviderError::Unexpected(_)))) => {
				warn!(user_id, message_id, "Skipping message that cannot be read: {}", e);
				Ok(FetchedMessage::Skipped(MessageOutcome::Undecodable))
			}
			Err(e) => Err(e.into()),
		}
	}

	/// Parse and write one fetched message.
	pub async fn ingest(&self, user_id: &str, message: &RawMessage) -> Result<MessageOutcome, SyncError> {
		let parsed = match self.parser.parse(&message.envelope()) {
			Ok(parsed) => parsed,
			Err(failure) => {
				warn!(
					user_id,
					message_id = %message.id,
					reason = failure.code(),
					"Skipping message: {}",
					failure
				);
				return Ok(MessageOutcome::ParseFailed);
			}
		};

		match self.writer.write(user_id, &parsed, &message.id).await? {
			WriteOutcome::Inserted(_) => Ok(MessageOutcome::Inserted),
			WriteOutcome::Duplicate(_) => {
				debug!(user_id, message_id = %message.id, "Duplicate message skipped");
				Ok(MessageOutcome::Duplicate)
			}
		}
	}
}
