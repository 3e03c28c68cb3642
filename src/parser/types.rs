//! Types produced and consumed by the notification parser.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Which way money moved relative to the mailbox owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
	In,
	Out,
}

impl Direction {
	pub fn as_str(&self) -> &'static str {
		match self {
			Direction::In => "in",
			Direction::Out => "out",
		}
	}

	pub fn from_str_opt(value: &str) -> Option<Self> {
		match value {
			"in" => Some(Direction::In),
			"out" => Some(Direction::Out),
			_ => None,
		}
	}
}

/// Payment rail a notification was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
	Transfer,
	Qris,
	VirtualAccount,
	Card,
}

impl TransactionType {
	pub fn as_str(&self) -> &'static str {
		match self {
			TransactionType::Transfer => "transfer",
			TransactionType::Qris => "qris",
			TransactionType::VirtualAccount => "virtual_account",
			TransactionType::Card => "card",
		}
	}

	pub fn from_str_opt(value: &str) -> Option<Self> {
		match value {
			"transfer" => Some(TransactionType::Transfer),
			"qris" => Some(TransactionType::Qris),
			"virtual_account" => Some(TransactionType::VirtualAccount),
			"card" => Some(TransactionType::Card),
			_ => None,
		}
	}
}

/// The pieces of a message the parser looks at.
#[derive(Debug, Clone, Copy)]
pub struct MessageEnvelope<'a> {
	/// Raw `From` header, display name included.
	pub sender: &'a str,
	pub subject: &'a str,
	/// Plain-text body (HTML already stripped).
	pub body: &'a str,
	pub received_at: DateTime<Utc>,
}

/// Canonical transaction extracted from one bank notification.
///
/// Optional fields the message did not carry stay `None`; they are never
/// filled with empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedTransaction {
	pub direction: Direction,
	pub amount: Decimal,
	pub fee: Option<Decimal>,
	pub total_amount: Decimal,
	pub currency: String,
	pub transaction_date: DateTime<Utc>,
	pub transaction_type: TransactionType,
	pub transaction_ref_no: Option<String>,
	pub payment_ref_no: Option<String>,
	pub acquirer: Option<String>,
	pub source_account: Option<String>,
	pub recipient_name: Option<String>,
	pub recipient_bank: Option<String>,
	pub recipient_bank_account: Option<String>,
	pub purpose: Option<String>,
	/// Bank that issued the notification, resolved from the sender.
	pub bank_code: Option<String>,
}

/// Why a message did not yield a transaction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseFailure {
	#[error("sender is not a configured bank")]
	NotABankSender,

	#[error("no notification format matched")]
	NoMatchingFormat,

	#[error("could not extract field `{0}`")]
	FieldExtractionFailed(&'static str),

	#[error("message body is empty")]
	EmptyBody,
}

impl ParseFailure {
	/// Stable reason code used in logs and run reports.
	pub fn code(&self) -> &'static str {
		match self {
			ParseFailure::NotABankSender => "NOT_A_BANK_SENDER",
			ParseFailure::NoMatchingFormat => "NO_MATCHING_FORMAT",
			ParseFailure::FieldExtractionFailed(_) => "FIELD_EXTRACTION_FAILED",
			ParseFailure::EmptyBody => "EMPTY_BODY",
		}
	}
}
