//! Notification formats.
//!
//! Each bank notification family implements [`NotificationFormat`]. The
//! [`FormatCatalog`] tries them in a fixed order and the first whose
//! `matches` returns true extracts the transaction. A format that matches
//! but cannot find a required field fails; no other format is tried.

use chrono::{DateTime, FixedOffset, Utc};
use rust_decimal::Decimal;

use super::amount::{MoneyMatch, NumberLocale, find_money, find_money_in_value, parse_amount};
use super::fields::{NotificationText, account_value, inline_reference, masked_card_suffix, parse_local_datetime};
use super::senders::{BankSender, SenderDirectory};
use super::types::{Direction, ParseFailure, ParsedTransaction, TransactionType};

/// Inputs shared by every format during extraction.
pub struct ExtractionContext<'a> {
	pub bank: &'a BankSender,
	pub directory: &'a SenderDirectory,
	pub home_currency: &'a str,
	pub local_offset: FixedOffset,
	pub received_at: DateTime<Utc>,
}

/// One family of bank notifications.
pub trait NotificationFormat: Send + Sync {
	fn name(&self) -> &'static str;

	/// Whether this format recognizes the message.
	fn matches(&self, text: &NotificationText) -> bool;

	fn extract(
		&self,
		text: &NotificationText,
		ctx: &ExtractionContext<'_>,
	) -> Result<ParsedTransaction, ParseFailure>;
}

/// Ordered list of formats; order decides which format wins.
pub struct FormatCatalog {
	formats: Vec<Box<dyn NotificationFormat>>,
}

impl FormatCatalog {
	pub fn with_formats(formats: Vec<Box<dyn NotificationFormat>>) -> Self {
		Self { formats }
	}

	/// Append a format after the built-in ones.
	pub fn push(&mut self, format: Box<dyn NotificationFormat>) {
		self.formats.push(format);
	}

	pub fn detect(&self, text: &NotificationText) -> Option<&dyn NotificationFormat> {
		self.formats
			.iter()
			.find(|format| format.matches(text))
			.map(|format| format.as_ref())
	}

	pub fn names(&self) -> Vec<&'static str> {
		self.formats.iter().map(|f| f.name()).collect()
	}
}

impl Default for FormatCatalog {
	fn default() -> Self {
		Self::with_formats(vec![
			Box::new(BiFastFormat),
			Box::new(QrisFormat),
			Box::new(VirtualAccountFormat),
			Box::new(CardFormat),
			Box::new(GenericTransferFormat),
		])
	}
}

const INCOMING: &[&str] = &[
	"dana masuk",
	"transfer masuk",
	"uang masuk",
	"menerima transfer",
	"anda menerima",
	"telah diterima",
	"incoming transfer",
	"you have received",
	"you received",
	"credited",
	"kredit",
];

const OUTGOING: &[&str] = &[
	"dana keluar",
	"transfer keluar",
	"uang keluar",
	"transfer ke",
	"transfer to",
	"outgoing transfer",
	"debited",
	"debit",
	"pembayaran",
	"payment",
	"tarik tunai",
	"withdrawal",
];

const REFUND: &[&str] = &["refund", "pengembalian dana", "reversal"];

const AMOUNT_LABELS: &[&str] = &[
	"Jumlah Transfer",
	"Nominal Transfer",
	"Nominal Transaksi",
	"Jumlah Transaksi",
	"Transfer Amount",
	"Transaction Amount",
	"Nominal",
	"Jumlah",
	"Amount",
];
const FEE_LABELS: &[&str] = &["Biaya Transfer", "Biaya Admin", "Biaya Layanan", "Admin Fee", "Biaya", "Fee"];
const TOTAL_LABELS: &[&str] = &[
	"Total Transaksi",
	"Total Pembayaran",
	"Total Bayar",
	"Total Amount",
	"Total",
];
const DATE_LABELS: &[&str] = &[
	"Tanggal Transaksi",
	"Waktu Transaksi",
	"Transaction Date",
	"Tanggal",
	"Waktu",
	"Date",
];
const REF_LABELS: &[&str] = &[
	"Nomor Referensi",
	"No. Referensi",
	"No Referensi",
	"Reference Number",
	"Reference No",
	"No. Ref",
	"Ref No",
	"Ref",
];
const RECIPIENT_NAME_LABELS: &[&str] = &[
	"Nama Penerima",
	"Recipient Name",
	"Beneficiary Name",
	"Penerima",
	"Recipient",
];
const RECIPIENT_BANK_LABELS: &[&str] = &[
	"Bank Penerima",
	"Bank Tujuan",
	"Recipient Bank",
	"Beneficiary Bank",
	"Destination Bank",
];
const RECIPIENT_ACCOUNT_LABELS: &[&str] = &[
	"No. Rekening Tujuan",
	"Rekening Penerima",
	"Rekening Tujuan",
	"Recipient Account",
	"Beneficiary Account",
	"Destination Account",
];
const SOURCE_ACCOUNT_LABELS: &[&str] = &[
	"Rekening Sumber",
	"Dari Rekening",
	"Source Account",
	"From Account",
	"Source of Fund",
	"Sumber Dana",
];
const PURPOSE_LABELS: &[&str] = &["Berita", "Keterangan", "Catatan", "Remark", "Purpose", "Description"];

/// Direction from keyword order; the earliest keyword wins.
fn keyword_direction(text: &NotificationText) -> Option<Direction> {
	match (text.first_position(INCOMING), text.first_position(OUTGOING)) {
		(Some(i), Some(o)) => Some(if i < o { Direction::In } else { Direction::Out }),
		(Some(_), None) => Some(Direction::In),
		(None, Some(_)) => Some(Direction::Out),
		(None, None) => None,
	}
}

struct Money {
	amount: Decimal,
	fee: Option<Decimal>,
	total_amount: Decimal,
	currency: String,
}

fn decode_money(
	found: &MoneyMatch,
	ctx: &ExtractionContext<'_>,
	field: &'static str,
) -> Result<Decimal, ParseFailure> {
	let locale = match (ctx.bank.number_locale, found.currency) {
		(NumberLocale::Auto, Some("IDR")) => NumberLocale::Indonesian,
		(locale, _) => locale,
	};
	parse_amount(&found.raw, locale).map_err(|_| ParseFailure::FieldExtractionFailed(field))
}

fn labeled_money(
	text: &NotificationText,
	labels: &[&str],
	ctx: &ExtractionContext<'_>,
	field: &'static str,
) -> Result<Option<(Decimal, Option<&'static str>)>, ParseFailure> {
	let Some(value) = text.labeled(labels) else {
		return Ok(None);
	};
	let found = find_money_in_value(&value).ok_or(ParseFailure::FieldExtractionFailed(field))?;
	let amount = decode_money(&found, ctx, field)?;
	Ok(Some((amount, found.currency)))
}

/// Amount, fee and total. Total falls back to amount plus fee.
fn extract_money(text: &NotificationText, ctx: &ExtractionContext<'_>) -> Result<Money, ParseFailure> {
	let (amount, currency) = match labeled_money(text, AMOUNT_LABELS, ctx, "amount")? {
		Some(found) => found,
		None => {
			let found = find_money(&text.body)
				.or_else(|| find_money(&text.subject))
				.ok_or(ParseFailure::FieldExtractionFailed("amount"))?;
			(decode_money(&found, ctx, "amount")?, found.currency)
		}
	};
	let fee = labeled_money(text, FEE_LABELS, ctx, "fee")?.map(|(fee, _)| fee);
	let total_amount = match labeled_money(text, TOTAL_LABELS, ctx, "total_amount")? {
		Some((total, _)) => total,
		None => amount + fee.unwrap_or(Decimal::ZERO),
	};

	Ok(Money {
		amount,
		fee,
		total_amount,
		currency: currency
			.map(str::to_string)
			.unwrap_or_else(|| ctx.home_currency.to_string()),
	})
}

fn extract_date(text: &NotificationText, ctx: &ExtractionContext<'_>) -> DateTime<Utc> {
	text.labeled(DATE_LABELS)
		.and_then(|value| parse_local_datetime(&value, ctx.local_offset))
		.unwrap_or(ctx.received_at)
}

fn extract_reference(text: &NotificationText) -> Option<String> {
	text.labeled(REF_LABELS)
		.and_then(|value| value.split_whitespace().next().map(str::to_string))
		.filter(|value| value.chars().any(|c| c.is_ascii_digit()))
		.or_else(|| inline_reference(&text.body))
		.or_else(|| inline_reference(&text.subject))
}

fn non_empty(value: Option<String>) -> Option<String> {
	value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Fields every format fills the same way; formats override what they know better.
fn base_transaction(
	text: &NotificationText,
	ctx: &ExtractionContext<'_>,
	direction: Direction,
	transaction_type: TransactionType,
) -> Result<ParsedTransaction, ParseFailure> {
	let money = extract_money(text, ctx)?;
	Ok(ParsedTransaction {
		direction,
		amount: money.amount,
		fee: money.fee,
		total_amount: money.total_amount,
		currency: money.currency,
		transaction_date: extract_date(text, ctx),
		transaction_type,
		transaction_ref_no: extract_reference(text),
		payment_ref_no: None,
		acquirer: None,
		source_account: text.labeled(SOURCE_ACCOUNT_LABELS).and_then(|v| account_value(&v)),
		recipient_name: non_empty(text.labeled(RECIPIENT_NAME_LABELS)),
		recipient_bank: non_empty(text.labeled(RECIPIENT_BANK_LABELS))
			.map(|bank| ctx.directory.normalize_bank(&bank)),
		recipient_bank_account: text.labeled(RECIPIENT_ACCOUNT_LABELS).and_then(|v| account_value(&v)),
		purpose: non_empty(text.labeled(PURPOSE_LABELS)),
		bank_code: Some(ctx.bank.bank_code.clone()),
	})
}

/// Interbank real-time transfers over BI-FAST.
pub struct BiFastFormat;

impl NotificationFormat for BiFastFormat {
	fn name(&self) -> &'static str {
		"bi_fast"
	}

	fn matches(&self, text: &NotificationText) -> bool {
		text.contains_any(&["bi-fast", "bifast", "bi fast"])
	}

	fn extract(
		&self,
		text: &NotificationText,
		ctx: &ExtractionContext<'_>,
	) -> Result<ParsedTransaction, ParseFailure> {
		let direction = keyword_direction(text).unwrap_or(Direction::Out);
		let mut tx = base_transaction(text, ctx, direction, TransactionType::Transfer)?;
		tx.payment_ref_no = non_empty(text.labeled(&["End to End ID", "E2E ID", "BI-FAST Ref", "ID Transaksi"]));
		Ok(tx)
	}
}

/// QR payments through the national QRIS standard.
pub struct QrisFormat;

impl NotificationFormat for QrisFormat {
	fn name(&self) -> &'static str {
		"qris"
	}

	fn matches(&self, text: &NotificationText) -> bool {
		text.contains_any(&["qris"])
	}

	fn extract(
		&self,
		text: &NotificationText,
		ctx: &ExtractionContext<'_>,
	) -> Result<ParsedTransaction, ParseFailure> {
		let direction = if text.contains_any(REFUND) { Direction::In } else { Direction::Out };
		let mut tx = base_transaction(text, ctx, direction, TransactionType::Qris)?;
		tx.recipient_name = non_empty(text.labeled(&["Nama Merchant", "Merchant Name", "Nama Toko", "Merchant"]))
			.or(tx.recipient_name);
		tx.acquirer = non_empty(text.labeled(&["Nama Acquirer", "Acquirer", "Penyelenggara"]));
		tx.payment_ref_no = non_empty(text.labeled(&["Retrieval Reference Number", "No. RRN", "RRN"]));
		Ok(tx)
	}
}

/// Payments into a virtual account number.
pub struct VirtualAccountFormat;

const VA_NUMBER_LABELS: &[&str] = &[
	"Nomor Virtual Account",
	"No. Virtual Account",
	"Virtual Account Number",
	"Nomor VA",
	"No. VA",
	"VA Number",
	"Virtual Account",
];

impl NotificationFormat for VirtualAccountFormat {
	fn name(&self) -> &'static str {
		"virtual_account"
	}

	fn matches(&self, text: &NotificationText) -> bool {
		text.contains_any(&["virtual account", "nomor va", "no. va", "va number"])
	}

	fn extract(
		&self,
		text: &NotificationText,
		ctx: &ExtractionContext<'_>,
	) -> Result<ParsedTransaction, ParseFailure> {
		let direction = match keyword_direction(text) {
			Some(Direction::In) if !text.contains_any(&["pembayaran", "payment"]) => Direction::In,
			_ => Direction::Out,
		};
		let mut tx = base_transaction(text, ctx, direction, TransactionType::VirtualAccount)?;
		if let Some(va) = text.labeled(VA_NUMBER_LABELS).and_then(|v| account_value(&v)) {
			tx.recipient_bank_account = Some(va);
		}
		tx.recipient_name = tx
			.recipient_name
			.or_else(|| non_empty(text.labeled(&["Nama Pelanggan", "Customer Name", "Biller", "Nama"])));
		if tx.recipient_bank.is_none() {
			tx.recipient_bank = non_empty(text.labeled(&["Bank"])).map(|bank| ctx.directory.normalize_bank(&bank));
		}
		Ok(tx)
	}
}

/// Debit and credit card purchases.
pub struct CardFormat;

impl NotificationFormat for CardFormat {
	fn name(&self) -> &'static str {
		"card"
	}

	fn matches(&self, text: &NotificationText) -> bool {
		text.contains_any(&[
			"kartu kredit",
			"kartu debit",
			"credit card",
			"debit card",
			"card ending",
			"nomor kartu",
			"card number",
		])
	}

	fn extract(
		&self,
		text: &NotificationText,
		ctx: &ExtractionContext<'_>,
	) -> Result<ParsedTransaction, ParseFailure> {
		let direction = if text.contains_any(REFUND) { Direction::In } else { Direction::Out };
		let mut tx = base_transaction(text, ctx, direction, TransactionType::Card)?;
		let card = masked_card_suffix(&text.body).or_else(|| {
			text.labeled(&["Nomor Kartu", "Card Number", "Kartu"])
				.and_then(|v| account_value(&v))
		});
		if let Some(card) = card {
			tx.source_account = Some(card);
		}
		tx.recipient_name = non_empty(text.labeled(&["Nama Merchant", "Merchant Name", "Merchant", "Lokasi"]))
			.or(tx.recipient_name);
		Ok(tx)
	}
}

/// Plain transfers recognized only by direction keywords.
pub struct GenericTransferFormat;

impl NotificationFormat for GenericTransferFormat {
	fn name(&self) -> &'static str {
		"generic_transfer"
	}

	fn matches(&self, text: &NotificationText) -> bool {
		keyword_direction(text).is_some()
	}

	fn extract(
		&self,
		text: &NotificationText,
		ctx: &ExtractionContext<'_>,
	) -> Result<ParsedTransaction, ParseFailure> {
		let direction = keyword_direction(text).ok_or(ParseFailure::FieldExtractionFailed("direction"))?;
		base_transaction(text, ctx, direction, TransactionType::Transfer)
	}
}
