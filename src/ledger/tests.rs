use std::sync::Arc;

use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;

use super::*;
use crate::parser::{Direction, ParsedTransaction, SenderDirectory, TransactionType, default_bank_senders};
use crate::store::{LedgerRepository, SqliteLedgerRepository};

struct Ledger {
	_dir: tempfile::TempDir,
	repository: Arc<dyn LedgerRepository>,
	reconciler: Arc<WalletReconciler>,
	writer: TransactionWriter,
	wallets: WalletService,
}

fn ledger() -> Ledger {
	let dir = tempfile::tempdir().unwrap();
	let repository: Arc<dyn LedgerRepository> =
		Arc::new(SqliteLedgerRepository::open(&dir.path().join("ledger.db"), "IDR").unwrap());
	let reconciler = Arc::new(WalletReconciler::new(repository.clone()));
	Ledger {
		writer: TransactionWriter::new(repository.clone(), reconciler.clone()),
		wallets: WalletService::new(
			repository.clone(),
			reconciler.clone(),
			SenderDirectory::new(default_bank_senders()),
		),
		repository,
		reconciler,
		_dir: dir,
	}
}

fn transfer_to(bank: &str, account: &str) -> ParsedTransaction {
	ParsedTransaction {
		direction: Direction::Out,
		amount: Decimal::new(150_000, 0),
		fee: None,
		total_amount: Decimal::new(150_000, 0),
		currency: "IDR".into(),
		transaction_date: Utc.with_ymd_and_hms(2026, 10, 1, 3, 0, 0).unwrap(),
		transaction_type: TransactionType::Transfer,
		transaction_ref_no: Some("BMRI12345".into()),
		payment_ref_no: None,
		acquirer: None,
		source_account: None,
		recipient_name: Some("SITI".into()),
		recipient_bank: Some(bank.into()),
		recipient_bank_account: Some(account.into()),
		purpose: None,
		bank_code: Some("mandiri".into()),
	}
}

fn new_wallet(name: &str, bank: &str, account: Option<&str>) -> NewWallet {
	NewWallet {
		name: name.into(),
		bank_code: bank.into(),
		account_number: account.map(str::to_string),
		balance: Decimal::ZERO,
		currency: None,
		is_default: false,
	}
}

#[tokio::test]
async fn test_same_message_written_once() {
	let ledger = ledger();
	let parsed = transfer_to("bca", "****1234");

	let first = ledger.writer.write("u1", &parsed, "m1").await.unwrap();
	assert!(matches!(first, WriteOutcome::Inserted(_)));
	let second = ledger.writer.write("u1", &parsed, "m1").await.unwrap();
	assert!(matches!(second, WriteOutcome::Duplicate(_)));
	assert_eq!(first.transaction(), second.transaction());

	let all = ledger
		.repository
		.list_transactions("u1", &TransactionFilter::default())
		.await
		.unwrap();
	assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn test_concurrent_writes_of_one_message() {
	let ledger = ledger();
	let parsed = transfer_to("bca", "****1234");
	let (a, b) = tokio::join!(
		ledger.writer.write("u1", &parsed, "m1"),
		ledger.writer.write("u1", &parsed, "m1")
	);
	let inserted = [a.unwrap(), b.unwrap()]
		.iter()
		.filter(|o| matches!(o, WriteOutcome::Inserted(_)))
		.count();
	assert_eq!(inserted, 1);
}

#[tokio::test]
async fn test_writer_attributes_to_existing_wallet() {
	let ledger = ledger();
	let wallet = ledger
		.wallets
		.create_wallet("u1", &new_wallet("Savings", "BCA", Some("0987651234")))
		.await
		.unwrap()
		.wallet;
	assert_eq!(wallet.bank_code.as_deref(), Some("bca"));

	let outcome = ledger.writer.write("u1", &transfer_to("bca", "****1234"), "m1").await.unwrap();
	assert_eq!(outcome.transaction().wallet_id, wallet.id);
}

#[tokio::test]
async fn test_wallet_creation_remaps_uncategorized() {
	let ledger = ledger();
	let outcome = ledger.writer.write("u1", &transfer_to("bankx", "****1234"), "m1").await.unwrap();
	let uncategorized = ledger.repository.ensure_uncategorized("u1").await.unwrap();
	assert_eq!(outcome.transaction().wallet_id, uncategorized.id);

	let change = ledger
		.wallets
		.create_wallet("u1", &new_wallet("X", "bankx", Some("55501234")))
		.await
		.unwrap();
	assert_eq!(change.remapped_transactions, 1);

	let stored = ledger.repository.find_by_message("u1", "m1").await.unwrap().unwrap();
	assert_eq!(stored.wallet_id, change.wallet.id);

	assert_eq!(ledger.reconciler.resweep_uncategorized("u1").await.unwrap(), 0);
}

#[tokio::test]
async fn test_resweep_converges() {
	let ledger = ledger();
	for (i, account) in ["****1111", "****2222", "****3333"].iter().enumerate() {
		ledger
			.writer
			.write("u1", &transfer_to("bni", account), &format!("m{i}"))
			.await
			.unwrap();
	}

	let repository = &ledger.repository;
	repository.insert_wallet("u1", &new_wallet("A", "bni", Some("90001111"))).await.unwrap();
	repository.insert_wallet("u1", &new_wallet("B", "bni", Some("90002222"))).await.unwrap();

	assert_eq!(ledger.reconciler.resweep_uncategorized("u1").await.unwrap(), 2);
	assert_eq!(ledger.reconciler.resweep_uncategorized("u1").await.unwrap(), 0);
}

#[tokio::test]
async fn test_delete_moves_to_uncategorized() {
	let ledger = ledger();
	let wallet = ledger
		.wallets
		.create_wallet("u1", &new_wallet("BRI", "bri", Some("1234")))
		.await
		.unwrap()
		.wallet;
	ledger.writer.write("u1", &transfer_to("bri", "1234"), "m1").await.unwrap();

	let deletion = ledger.wallets.delete_wallet("u1", wallet.id).await.unwrap();
	assert_eq!(deletion.moved_transactions, 1);
	assert_eq!(deletion.remapped_transactions, 0);

	let uncategorized = ledger.repository.ensure_uncategorized("u1").await.unwrap();
	let stored = ledger.repository.find_by_message("u1", "m1").await.unwrap().unwrap();
	assert_eq!(stored.wallet_id, uncategorized.id);
}

#[tokio::test]
async fn test_uncategorized_is_protected() {
	let ledger = ledger();
	let wallets = ledger.wallets.list_wallets("u1").await.unwrap();
	let uncategorized = wallets.iter().find(|w| w.is_uncategorized).unwrap();

	let err = ledger.wallets.delete_wallet("u1", uncategorized.id).await.unwrap_err();
	assert!(matches!(err, LedgerError::UncategorizedWallet("deleted")));

	let update = WalletUpdate {
		name: Some("Mine".into()),
		..Default::default()
	};
	let err = ledger
		.wallets
		.update_wallet("u1", uncategorized.id, &update)
		.await
		.unwrap_err();
	assert!(matches!(err, LedgerError::UncategorizedWallet("edited")));
}

#[tokio::test]
async fn test_wallet_validation() {
	let ledger = ledger();
	let err = ledger
		.wallets
		.create_wallet("u1", &new_wallet("  ", "bca", None))
		.await
		.unwrap_err();
	assert!(matches!(err, LedgerError::InvalidWallet(_)));

	let err = ledger
		.wallets
		.create_wallet("u1", &new_wallet("uncategorized", "bca", None))
		.await
		.unwrap_err();
	assert!(matches!(err, LedgerError::InvalidWallet(_)));

	let err = ledger
		.wallets
		.update_wallet("u1", 999, &WalletUpdate::default())
		.await
		.unwrap_err();
	assert!(matches!(err, LedgerError::WalletNotFound(999)));
}
