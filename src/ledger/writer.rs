use std::sync::Arc;
use tracing::{debug, info};

use super::reconciler::WalletReconciler;
use super::types::{LedgerError, WriteOutcome};
use crate::parser::ParsedTransaction;
use crate::store::{LedgerRepository, StoreError};

/// Idempotent writer keyed by `(user_id, message_id)`.
pub struct TransactionWriter {
	repository: Arc<dyn LedgerRepository>,
	reconciler: Arc<WalletReconciler>,
}

impl TransactionWriter {
	pub fn new(repository: Arc<dyn LedgerRepository>, reconciler: Arc<WalletReconciler>) -> Self {
		Self {
			repository,
			reconciler,
		}
	}

	/// Persist `parsed` for the message unless it is already recorded.
	///
	/// The wallet is resolved and the row inserted under the user's
	/// reconciliation lock, so the stored wallet id is already final.
	pub async fn write(
		&self,
		user_id: &str,
		parsed: &ParsedTransaction,
		message_id: &str,
	) -> Result<WriteOutcome, LedgerError> {
		if let Some(existing) = self.repository.find_by_message(user_id, message_id).await? {
			debug!(user_id, message_id, "Message already recorded");
			return Ok(WriteOutcome::Duplicate(existing));
		}

		let _guard = self.reconciler.lock_user(user_id).await;
		let wallet_id = self.reconciler.match_wallet(user_id, parsed).await?;

		match self
			.repository
			.insert_transaction(user_id, message_id, wallet_id, parsed)
			.await
		{
			Ok(tx) => {
				info!(
					user_id,
					message_id,
					transaction_id = tx.id,
					wallet_id,
					amount = %tx.details.total_amount,
					"Recorded transaction"
				);
				Ok(WriteOutcome::Inserted(tx))
			}
			Err(StoreError::DuplicateMessage(_)) => {
				// A concurrent writer won the unique index.
				let existing = self
					.repository
					.find_by_message(user_id, message_id)
					.await?
					.ok_or_else(|| StoreError::Corrupt(format!("message {message_id} conflicted but is missing")))?;
				Ok(WriteOutcome::Duplicate(existing))
			}
			Err(e) => Err(e.into()),
		}
	}
}
