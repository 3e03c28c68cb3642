//! Golden-body tests for the notification parser.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;

use super::fields::NotificationText;
use super::*;

fn received() -> DateTime<Utc> {
	Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap()
}

fn dec(value: &str) -> Decimal {
	value.parse().unwrap()
}

fn parse(sender: &str, subject: &str, body: &str) -> Result<ParsedTransaction, ParseFailure> {
	let parser = Parser::with_defaults(ParserConfig::default());
	parser.parse(&MessageEnvelope {
		sender,
		subject,
		body,
		received_at: received(),
	})
}

const MANDIRI: &str = "Livin' by Mandiri <noreply@bankmandiri.co.id>";

#[test]
fn test_bi_fast_outgoing_transfer() {
	let body = "Transfer BI-FAST berhasil\n\
		Penerima: JOHN DOE\n\
		Bank Tujuan: BANK CENTRAL ASIA\n\
		Rekening Tujuan: ******1234\n\
		Nominal: Rp150.000,00\n\
		Ref: BMRI12345\n\
		Tanggal: 19 Okt 2026 14:30:00 WIB\n";

	let tx = parse(MANDIRI, "BI-FAST Transfer Notification", body).unwrap();

	assert_eq!(tx.direction, Direction::Out);
	assert_eq!(tx.amount, dec("150000.00"));
	assert_eq!(tx.total_amount, dec("150000.00"));
	assert_eq!(tx.fee, None);
	assert_eq!(tx.currency, "IDR");
	assert_eq!(tx.transaction_type, TransactionType::Transfer);
	assert_eq!(tx.transaction_ref_no.as_deref(), Some("BMRI12345"));
	assert_eq!(tx.recipient_name.as_deref(), Some("JOHN DOE"));
	assert_eq!(tx.recipient_bank.as_deref(), Some("bca"));
	assert_eq!(tx.recipient_bank_account.as_deref(), Some("******1234"));
	assert_eq!(tx.bank_code.as_deref(), Some("mandiri"));
	assert_eq!(tx.transaction_date.to_rfc3339(), "2026-10-19T07:30:00+00:00");
}

#[test]
fn test_bi_fast_inline_fields() {
	let tx = parse(
		MANDIRI,
		"BI-FAST Transfer Notification",
		"Transfer sebesar Rp150.000,00 telah diproses. Ref: BMRI12345",
	)
	.unwrap();

	assert_eq!(tx.direction, Direction::Out);
	assert_eq!(tx.amount, dec("150000.00"));
	assert_eq!(tx.currency, "IDR");
	assert_eq!(tx.transaction_ref_no.as_deref(), Some("BMRI12345"));
	assert_eq!(tx.transaction_date, received());
	assert_eq!(tx.purpose, None);
}

#[test]
fn test_bi_fast_direction_follows_earliest_keyword() {
	let outgoing = parse(
		MANDIRI,
		"BI-FAST Transfer Notification",
		"Transfer ke BANK CENTRAL ASIA sebesar Rp150.000,00 berhasil dan telah diterima oleh bank tujuan. Ref: BMRI777",
	)
	.unwrap();
	assert_eq!(outgoing.direction, Direction::Out);
	assert_eq!(outgoing.amount, dec("150000.00"));

	let incoming = parse(
		MANDIRI,
		"BI-FAST Transfer Notification",
		"Dana masuk BI-FAST sebesar Rp75.000,00. Ref: BMRI888",
	)
	.unwrap();
	assert_eq!(incoming.direction, Direction::In);
}

#[test]
fn test_unknown_sender_is_rejected() {
	let err = parse(
		"Someone <someone@example.com>",
		"BI-FAST Transfer Notification",
		"Ref: BMRI12345 Rp150.000,00",
	)
	.unwrap_err();
	assert_eq!(err, ParseFailure::NotABankSender);
	assert_eq!(err.code(), "NOT_A_BANK_SENDER");
}

#[test]
fn test_empty_body() {
	let err = parse(MANDIRI, "BI-FAST Transfer Notification", "  \n  ").unwrap_err();
	assert_eq!(err, ParseFailure::EmptyBody);
}

#[test]
fn test_marketing_mail_matches_no_format() {
	let err = parse(MANDIRI, "Promo akhir tahun", "Nikmati cashback hingga 50% di merchant pilihan").unwrap_err();
	assert_eq!(err, ParseFailure::NoMatchingFormat);
}

#[test]
fn test_qris_purchase() {
	let body = "Pembayaran QRIS berhasil\n\
		Merchant: KOPI KENANGAN\n\
		Acquirer: GOPAY\n\
		Nominal: IDR 45,000.00\n\
		RRN: 629200123456\n\
		Tanggal: 19/10/2026 08:00\n";

	let tx = parse("BCA <noreply@bca.co.id>", "Transaksi QRIS Berhasil", body).unwrap();

	assert_eq!(tx.transaction_type, TransactionType::Qris);
	assert_eq!(tx.direction, Direction::Out);
	assert_eq!(tx.amount, dec("45000.00"));
	assert_eq!(tx.recipient_name.as_deref(), Some("KOPI KENANGAN"));
	assert_eq!(tx.acquirer.as_deref(), Some("GOPAY"));
	assert_eq!(tx.payment_ref_no.as_deref(), Some("629200123456"));
	assert_eq!(tx.transaction_ref_no, None);
	assert_eq!(tx.bank_code.as_deref(), Some("bca"));
	assert_eq!(tx.transaction_date.to_rfc3339(), "2026-10-19T01:00:00+00:00");
}

#[test]
fn test_virtual_account_with_fee_and_total() {
	let body = "Nomor Virtual Account: 8808 1234 5678 9012\n\
		Nama: PLN PASCABAYAR\n\
		Nominal: Rp250.000\n\
		Biaya Admin: Rp2.500\n\
		Total Pembayaran: Rp252.500\n";

	let tx = parse(MANDIRI, "Pembayaran Virtual Account Berhasil", body).unwrap();

	assert_eq!(tx.transaction_type, TransactionType::VirtualAccount);
	assert_eq!(tx.direction, Direction::Out);
	assert_eq!(tx.amount, dec("250000"));
	assert_eq!(tx.fee, Some(dec("2500")));
	assert_eq!(tx.total_amount, dec("252500"));
	assert_eq!(tx.recipient_bank_account.as_deref(), Some("8808123456789012"));
	assert_eq!(tx.recipient_name.as_deref(), Some("PLN PASCABAYAR"));
}

#[test]
fn test_card_purchase_uses_card_suffix() {
	let body = "Kartu kredit **** **** **** 4321 telah digunakan\n\
		Merchant: TOKOPEDIA\n\
		Jumlah: Rp1.250.000,00\n";

	let tx = parse("BNI <alert@bni.co.id>", "Transaksi Kartu Kredit", body).unwrap();

	assert_eq!(tx.transaction_type, TransactionType::Card);
	assert_eq!(tx.direction, Direction::Out);
	assert_eq!(tx.source_account.as_deref(), Some("4321"));
	assert_eq!(tx.recipient_name.as_deref(), Some("TOKOPEDIA"));
	assert_eq!(tx.amount, dec("1250000.00"));
}

#[test]
fn test_generic_incoming_transfer() {
	let tx = parse(
		"Bank Jago <notifikasi@jago.com>",
		"Dana Masuk",
		"Anda menerima transfer sebesar Rp 1.000.000 dari BUDI\nBerita: gaji",
	)
	.unwrap();

	assert_eq!(tx.direction, Direction::In);
	assert_eq!(tx.transaction_type, TransactionType::Transfer);
	assert_eq!(tx.amount, dec("1000000"));
	assert_eq!(tx.purpose.as_deref(), Some("gaji"));
	assert_eq!(tx.bank_code.as_deref(), Some("jago"));
}

#[test]
fn test_total_defaults_to_amount_plus_fee() {
	let tx = parse(
		"BRImo <info@bri.co.id>",
		"Transfer Keluar",
		"Transfer ke rekening lain\nJumlah: Rp100.000\nBiaya: Rp6.500",
	)
	.unwrap();

	assert_eq!(tx.direction, Direction::Out);
	assert_eq!(tx.amount, dec("100000"));
	assert_eq!(tx.fee, Some(dec("6500")));
	assert_eq!(tx.total_amount, dec("106500"));
}

#[test]
fn test_ambiguous_amount_is_a_field_failure() {
	let bank = BankSender {
		bank_code: "bankx".to_string(),
		display_name: "Bank X".to_string(),
		domains: vec!["bankx.example".to_string()],
		names: vec![],
		aliases: vec![],
		number_locale: NumberLocale::Auto,
	};
	let parser = Parser::new(
		SenderDirectory::new(vec![bank]),
		FormatCatalog::default(),
		ParserConfig::default(),
	);

	let err = parser
		.parse(&MessageEnvelope {
			sender: "alerts@bankx.example",
			subject: "Dana keluar",
			body: "Dana keluar USD 150,000",
			received_at: received(),
		})
		.unwrap_err();

	assert_eq!(err, ParseFailure::FieldExtractionFailed("amount"));
}

#[test]
fn test_parse_is_deterministic() {
	let body = "Transfer BI-FAST\nNominal: Rp150.000,00\nRef: BMRI12345";
	let first = parse(MANDIRI, "BI-FAST Transfer Notification", body).unwrap();
	let second = parse(MANDIRI, "BI-FAST Transfer Notification", body).unwrap();
	assert_eq!(first, second);
}

struct PayrollFormat;

impl NotificationFormat for PayrollFormat {
	fn name(&self) -> &'static str {
		"payroll"
	}

	fn matches(&self, text: &NotificationText) -> bool {
		text.contains_any(&["slip gaji"])
	}

	fn extract(
		&self,
		_text: &NotificationText,
		ctx: &ExtractionContext<'_>,
	) -> Result<ParsedTransaction, ParseFailure> {
		Ok(ParsedTransaction {
			direction: Direction::In,
			amount: Decimal::ONE,
			fee: None,
			total_amount: Decimal::ONE,
			currency: ctx.home_currency.to_string(),
			transaction_date: ctx.received_at,
			transaction_type: TransactionType::Transfer,
			transaction_ref_no: None,
			payment_ref_no: None,
			acquirer: None,
			source_account: None,
			recipient_name: None,
			recipient_bank: None,
			recipient_bank_account: None,
			purpose: Some("payroll".to_string()),
			bank_code: Some(ctx.bank.bank_code.clone()),
		})
	}
}

#[test]
fn test_appended_format_is_tried_last() {
	let mut catalog = FormatCatalog::default();
	catalog.push(Box::new(PayrollFormat));
	assert_eq!(catalog.names().last(), Some(&"payroll"));

	let parser = Parser::new(
		SenderDirectory::new(default_bank_senders()),
		catalog,
		ParserConfig::default(),
	);
	let tx = parser
		.parse(&MessageEnvelope {
			sender: MANDIRI,
			subject: "Slip gaji",
			body: "Slip gaji Oktober tersedia",
			received_at: received(),
		})
		.unwrap();
	assert_eq!(tx.purpose.as_deref(), Some("payroll"));
}
