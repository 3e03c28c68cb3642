//! Attribution of transactions to wallets.
//!
//! Matching precedence:
//! 1. bank code plus account-number suffix, against the recipient pair of the
//!    transaction, then against its source pair;
//! 2. bank code alone, when exactly one active wallet of that bank exists;
//! 3. the user's Uncategorized wallet.
//!
//! Any tie lands in Uncategorized.

use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use super::types::{LedgerError, TransactionFilter, Wallet};
use crate::parser::ParsedTransaction;
use crate::store::LedgerRepository;

/// Fewest visible trailing digits accepted for an account-suffix match.
pub const MIN_SUFFIX_DIGITS: usize = 4;

/// Trailing digit run of a possibly masked account number (`****5678` gives `5678`).
fn visible_suffix(account: &str) -> Option<String> {
	let trimmed = account.trim_end_matches(|c: char| !c.is_ascii_alphanumeric() && c != '*' && c != '•');
	let suffix: String = trimmed
		.chars()
		.rev()
		.take_while(|c| c.is_ascii_digit())
		.collect::<Vec<_>>()
		.into_iter()
		.rev()
		.collect();
	(suffix.len() >= MIN_SUFFIX_DIGITS).then_some(suffix)
}

fn same_bank(wallet: &Wallet, bank: &str) -> bool {
	wallet
		.bank_code
		.as_deref()
		.is_some_and(|code| code.eq_ignore_ascii_case(bank.trim()))
}

fn account_matches(wallet: &Wallet, bank: Option<&str>, account: Option<&str>) -> bool {
	let (Some(bank), Some(account)) = (bank, account) else {
		return false;
	};
	let Some(suffix) = visible_suffix(account) else {
		return false;
	};
	same_bank(wallet, bank) && wallet.account_digits().is_some_and(|digits| digits.ends_with(&suffix))
}

/// Pick a wallet for `candidate` among `wallets`, or `None` for Uncategorized.
///
/// Only active, user-created wallets take part.
pub fn choose_wallet(wallets: &[Wallet], candidate: &ParsedTransaction) -> Option<i64> {
	let eligible: Vec<&Wallet> = wallets
		.iter()
		.filter(|w| w.is_active && !w.is_uncategorized)
		.collect();

	// The recipient pair decides before the source pair is consulted.
	for (bank, account) in [
		(candidate.recipient_bank.as_deref(), candidate.recipient_bank_account.as_deref()),
		(candidate.bank_code.as_deref(), candidate.source_account.as_deref()),
	] {
		let by_account: BTreeSet<i64> = eligible
			.iter()
			.filter(|w| account_matches(w, bank, account))
			.map(|w| w.id)
			.collect();
		match by_account.len() {
			0 => continue,
			1 => return by_account.first().copied(),
			_ => return None,
		}
	}

	// First bank that has any wallet at all decides; the issuing bank goes first.
	for bank in [candidate.bank_code.as_deref(), candidate.recipient_bank.as_deref()]
		.into_iter()
		.flatten()
	{
		let same: Vec<i64> = eligible.iter().filter(|w| same_bank(w, bank)).map(|w| w.id).collect();
		match same.as_slice() {
			[] => continue,
			[only] => return Some(*only),
			_ => return None,
		}
	}
	None
}

/// Per-user wallet matching and the Uncategorized resweep.
///
/// Holds the per-user reconciliation lock shared by the transaction writer and
/// the wallet service, so a match-and-insert never interleaves with a wallet
/// change and the resweep that follows it.
pub struct WalletReconciler {
	repository: Arc<dyn LedgerRepository>,
	locks: DashMap<String, Arc<Mutex<()>>>,
}

impl WalletReconciler {
	pub fn new(repository: Arc<dyn LedgerRepository>) -> Self {
		Self {
			repository,
			locks: DashMap::new(),
		}
	}

	/// Acquire the user's reconciliation lock.
	pub async fn lock_user(&self, user_id: &str) -> OwnedMutexGuard<()> {
		let lock = self.locks.entry(user_id.to_string()).or_default().clone();
		lock.lock_owned().await
	}

	/// Wallet id for `candidate`; the Uncategorized wallet when nothing matches.
	///
	/// Callers that insert with the result should hold [`Self::lock_user`].
	pub async fn match_wallet(&self, user_id: &str, candidate: &ParsedTransaction) -> Result<i64, LedgerError> {
		let uncategorized = self.repository.ensure_uncategorized(user_id).await?;
		let wallets = self.repository.list_wallets(user_id).await?;
		let wallet_id = choose_wallet(&wallets, candidate).unwrap_or(uncategorized.id);
		debug!(user_id, wallet_id, "Matched transaction to wallet");
		Ok(wallet_id)
	}

	/// Re-run matching over every Uncategorized transaction of the user.
	pub async fn resweep_uncategorized(&self, user_id: &str) -> Result<usize, LedgerError> {
		let _guard = self.lock_user(user_id).await;
		self.resweep_locked(user_id).await
	}

	/// Resweep body; the caller already holds the user's lock.
	pub(crate) async fn resweep_locked(&self, user_id: &str) -> Result<usize, LedgerError> {
		let uncategorized = self.repository.ensure_uncategorized(user_id).await?;
		let wallets = self.repository.list_wallets(user_id).await?;
		let filter = TransactionFilter {
			wallet_id: Some(uncategorized.id),
			..Default::default()
		};
		let pending = self.repository.list_transactions(user_id, &filter).await?;

		let assignments: Vec<(i64, i64)> = pending
			.iter()
			.filter_map(|tx| {
				choose_wallet(&wallets, &tx.details)
					.filter(|wallet_id| *wallet_id != uncategorized.id)
					.map(|wallet_id| (tx.id, wallet_id))
			})
			.collect();

		let remapped = self
			.repository
			.reassign_transactions(user_id, &assignments)
			.await?;
		if remapped > 0 {
			info!(user_id, remapped, pending = pending.len(), "Resweep moved transactions out of Uncategorized");
		}
		Ok(remapped)
	}
}
