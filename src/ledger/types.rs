use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::parser::{Direction, ParsedTransaction};
use crate::store::StoreError;

/// Name of the synthetic wallet holding unmatched transactions.
pub const UNCATEGORIZED_WALLET_NAME: &str = "Uncategorized";

/// A user-defined account that transactions are attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
	pub id: i64,
	pub user_id: String,
	pub name: String,
	/// `None` only for the Uncategorized wallet.
	pub bank_code: Option<String>,
	pub account_number: Option<String>,
	pub balance: Decimal,
	pub currency: String,
	pub is_active: bool,
	pub is_default: bool,
	pub is_uncategorized: bool,
	pub created_at: DateTime<Utc>,
}

impl Wallet {
	/// Digits of the account number, masking and separators removed.
	pub fn account_digits(&self) -> Option<String> {
		self.account_number
			.as_deref()
			.map(|n| n.chars().filter(|c| c.is_ascii_digit()).collect::<String>())
			.filter(|d| !d.is_empty())
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWallet {
	pub name: String,
	pub bank_code: String,
	#[serde(default)]
	pub account_number: Option<String>,
	#[serde(default)]
	pub balance: Decimal,
	#[serde(default)]
	pub currency: Option<String>,
	#[serde(default)]
	pub is_default: bool,
}

/// Partial update; absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletUpdate {
	#[serde(default)]
	pub name: Option<String>,
	#[serde(default)]
	pub bank_code: Option<String>,
	#[serde(default)]
	pub account_number: Option<String>,
	#[serde(default)]
	pub balance: Option<Decimal>,
	#[serde(default)]
	pub is_active: Option<bool>,
	#[serde(default)]
	pub is_default: Option<bool>,
}

/// A persisted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
	pub id: i64,
	pub user_id: String,
	pub wallet_id: i64,
	pub message_id: String,
	#[serde(flatten)]
	pub details: ParsedTransaction,
	pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionFilter {
	#[serde(default)]
	pub wallet_id: Option<i64>,
	#[serde(default)]
	pub direction: Option<Direction>,
	#[serde(default)]
	pub from: Option<DateTime<Utc>>,
	#[serde(default)]
	pub to: Option<DateTime<Utc>>,
	#[serde(default)]
	pub limit: Option<u32>,
}

/// A created or updated wallet and what the follow-up resweep moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletChange {
	pub wallet: Wallet,
	pub remapped_transactions: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletDeletion {
	pub wallet_id: i64,
	/// Transactions moved to Uncategorized with the wallet.
	pub moved_transactions: usize,
	pub remapped_transactions: usize,
}

/// Result of writing one parsed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
	Inserted(Transaction),
	/// The message was already recorded; the stored row is returned untouched.
	Duplicate(Transaction),
}

impl WriteOutcome {
	pub fn transaction(&self) -> &Transaction {
		match self {
			WriteOutcome::Inserted(tx) | WriteOutcome::Duplicate(tx) => tx,
		}
	}
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
	#[error("wallet {0} not found")]
	WalletNotFound(i64),

	#[error("the Uncategorized wallet cannot be {0}")]
	UncategorizedWallet(&'static str),

	#[error("invalid wallet: {0}")]
	InvalidWallet(String),

	#[error("storage error: {0}")]
	Store(#[from] StoreError),
}
