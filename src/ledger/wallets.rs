use std::sync::Arc;
use tracing::info;

use super::reconciler::WalletReconciler;
use super::types::{
	LedgerError, NewWallet, Transaction, TransactionFilter, UNCATEGORIZED_WALLET_NAME, Wallet,
	WalletChange, WalletDeletion, WalletUpdate,
};
use crate::parser::SenderDirectory;
use crate::store::LedgerRepository;

/// Wallet operations exposed to callers.
///
/// Every change is followed by a resweep of the Uncategorized wallet while the
/// user's reconciliation lock is still held.
pub struct WalletService {
	repository: Arc<dyn LedgerRepository>,
	reconciler: Arc<WalletReconciler>,
	banks: SenderDirectory,
}

impl WalletService {
	pub fn new(
		repository: Arc<dyn LedgerRepository>,
		reconciler: Arc<WalletReconciler>,
		banks: SenderDirectory,
	) -> Self {
		Self {
			repository,
			reconciler,
			banks,
		}
	}

	fn clean_name(name: &str) -> Result<String, LedgerError> {
		let name = name.trim();
		if name.is_empty() {
			return Err(LedgerError::InvalidWallet("name must not be empty".into()));
		}
		if name.eq_ignore_ascii_case(UNCATEGORIZED_WALLET_NAME) {
			return Err(LedgerError::InvalidWallet(format!("{UNCATEGORIZED_WALLET_NAME} is reserved")));
		}
		Ok(name.to_string())
	}

	fn clean_bank_code(&self, bank_code: &str) -> Result<String, LedgerError> {
		if bank_code.trim().is_empty() {
			return Err(LedgerError::InvalidWallet("bank code must not be empty".into()));
		}
		Ok(self.banks.normalize_bank(bank_code))
	}

	fn clean_account(account: Option<&str>) -> Option<String> {
		account.map(str::trim).filter(|a| !a.is_empty()).map(str::to_string)
	}

	/// All wallets of the user, Uncategorized included.
	pub async fn list_wallets(&self, user_id: &str) -> Result<Vec<Wallet>, LedgerError> {
		self.repository.ensure_uncategorized(user_id).await?;
		Ok(self.repository.list_wallets(user_id).await?)
	}

	pub async fn list_transactions(
		&self,
		user_id: &str,
		filter: &TransactionFilter,
	) -> Result<Vec<Transaction>, LedgerError> {
		Ok(self.repository.list_transactions(user_id, filter).await?)
	}

	pub async fn create_wallet(&self, user_id: &str, wallet: &NewWallet) -> Result<WalletChange, LedgerError> {
		let wallet = NewWallet {
			name: Self::clean_name(&wallet.name)?,
			bank_code: self.clean_bank_code(&wallet.bank_code)?,
			account_number: Self::clean_account(wallet.account_number.as_deref()),
			currency: wallet.currency.as_deref().map(|c| c.trim().to_uppercase()),
			..wallet.clone()
		};

		let _guard = self.reconciler.lock_user(user_id).await;
		self.repository.ensure_uncategorized(user_id).await?;
		let created = self.repository.insert_wallet(user_id, &wallet).await?;
		let remapped_transactions = self.reconciler.resweep_locked(user_id).await?;

		info!(
			user_id,
			wallet_id = created.id,
			bank_code = %wallet.bank_code,
			remapped_transactions,
			"Created wallet"
		);
		Ok(WalletChange {
			wallet: created,
			remapped_transactions,
		})
	}

	pub async fn update_wallet(
		&self,
		user_id: &str,
		wallet_id: i64,
		update: &WalletUpdate,
	) -> Result<WalletChange, LedgerError> {
		let update = WalletUpdate {
			name: update.name.as_deref().map(Self::clean_name).transpose()?,
			bank_code: update
				.bank_code
				.as_deref()
				.map(|b| self.clean_bank_code(b))
				.transpose()?,
			..update.clone()
		};

		let _guard = self.reconciler.lock_user(user_id).await;
		let existing = self
			.repository
			.get_wallet(user_id, wallet_id)
			.await?
			.ok_or(LedgerError::WalletNotFound(wallet_id))?;
		if existing.is_uncategorized {
			return Err(LedgerError::UncategorizedWallet("edited"));
		}

		let updated = self
			.repository
			.update_wallet(user_id, wallet_id, &update)
			.await?
			.ok_or(LedgerError::WalletNotFound(wallet_id))?;
		let remapped_transactions = self.reconciler.resweep_locked(user_id).await?;

		info!(user_id, wallet_id, remapped_transactions, "Updated wallet");
		Ok(WalletChange {
			wallet: updated,
			remapped_transactions,
		})
	}

	/// Delete a wallet, moving its transactions to Uncategorized first.
	pub async fn delete_wallet(&self, user_id: &str, wallet_id: i64) -> Result<WalletDeletion, LedgerError> {
		let _guard = self.reconciler.lock_user(user_id).await;
		let existing = self
			.repository
			.get_wallet(user_id, wallet_id)
			.await?
			.ok_or(LedgerError::WalletNotFound(wallet_id))?;
		if existing.is_uncategorized {
			return Err(LedgerError::UncategorizedWallet("deleted"));
		}

		let uncategorized = self.repository.ensure_uncategorized(user_id).await?;
		let moved_transactions = self
			.repository
			.delete_wallet(user_id, wallet_id, uncategorized.id)
			.await?;
		let remapped_transactions = self.reconciler.resweep_locked(user_id).await?;

		info!(user_id, wallet_id, moved_transactions, remapped_transactions, "Deleted wallet");
		Ok(WalletDeletion {
			wallet_id,
			moved_transactions,
			remapped_transactions,
		})
	}
}
