use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, ToSql};
use rust_decimal::Decimal;
use tracing::{debug, info};

use super::repositories::LedgerRepository;
use super::StoreError;
use crate::ledger::{
	NewWallet, Transaction, TransactionFilter, UNCATEGORIZED_WALLET_NAME, Wallet, WalletUpdate,
};
use crate::parser::{Direction, ParsedTransaction, TransactionType};

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS wallets (
    id INTEGER PRIMARY KEY,
    user_id TEXT NOT NULL,
    name TEXT NOT NULL,
    bank_code TEXT,
    account_number TEXT,
    balance TEXT NOT NULL DEFAULT '0',
    currency TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    is_default INTEGER NOT NULL DEFAULT 0,
    is_uncategorized INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_wallets_uncategorized
    ON wallets(user_id) WHERE is_uncategorized = 1;

CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY,
    user_id TEXT NOT NULL,
    wallet_id INTEGER NOT NULL,
    message_id TEXT NOT NULL,
    direction TEXT NOT NULL,
    amount TEXT NOT NULL,
    fee TEXT,
    total_amount TEXT NOT NULL,
    currency TEXT NOT NULL,
    transaction_date TEXT NOT NULL,
    transaction_type TEXT NOT NULL,
    transaction_ref_no TEXT,
    payment_ref_no TEXT,
    acquirer TEXT,
    source_account TEXT,
    recipient_name TEXT,
    recipient_bank TEXT,
    recipient_bank_account TEXT,
    purpose TEXT,
    bank_code TEXT,
    created_at TEXT NOT NULL,
    UNIQUE (user_id, message_id),
    FOREIGN KEY (wallet_id) REFERENCES wallets(id)
);

CREATE INDEX IF NOT EXISTS idx_transactions_wallet ON transactions(user_id, wallet_id);
";

const WALLET_COLUMNS: &str = "id, user_id, name, bank_code, account_number, balance, currency, \
	is_active, is_default, is_uncategorized, created_at";

const TRANSACTION_COLUMNS: &str = "id, user_id, wallet_id, message_id, direction, amount, fee, \
	total_amount, currency, transaction_date, transaction_type, transaction_ref_no, payment_ref_no, \
	acquirer, source_account, recipient_name, recipient_bank, recipient_bank_account, purpose, \
	bank_code, created_at";

pub fn get_connection(db_path: &Path) -> Result<Connection, StoreError> {
	if let Some(parent) = db_path.parent() {
		std::fs::create_dir_all(parent)?;
	}
	let conn = Connection::open(db_path)?;
	conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
	Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<(), StoreError> {
	conn.execute_batch(SCHEMA)?;
	Ok(())
}

fn text_error(idx: usize, err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> rusqlite::Error {
	rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn decimal_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
	let raw: String = row.get(idx)?;
	Decimal::from_str(&raw).map_err(|e| text_error(idx, e))
}

fn optional_decimal_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Decimal>> {
	let raw: Option<String> = row.get(idx)?;
	raw.map(|r| Decimal::from_str(&r).map_err(|e| text_error(idx, e)))
		.transpose()
}

fn wallet_from_row(row: &Row<'_>) -> rusqlite::Result<Wallet> {
	Ok(Wallet {
		id: row.get(0)?,
		user_id: row.get(1)?,
		name: row.get(2)?,
		bank_code: row.get(3)?,
		account_number: row.get(4)?,
		balance: decimal_at(row, 5)?,
		currency: row.get(6)?,
		is_active: row.get(7)?,
		is_default: row.get(8)?,
		is_uncategorized: row.get(9)?,
		created_at: row.get(10)?,
	})
}

fn transaction_from_row(row: &Row<'_>) -> rusqlite::Result<Transaction> {
	let direction: String = row.get(4)?;
	let direction = Direction::from_str_opt(&direction)
		.ok_or_else(|| text_error(4, format!("unknown direction {direction}")))?;
	let transaction_type: String = row.get(10)?;
	let transaction_type = TransactionType::from_str_opt(&transaction_type)
		.ok_or_else(|| text_error(10, format!("unknown transaction type {transaction_type}")))?;

	Ok(Transaction {
		id: row.get(0)?,
		user_id: row.get(1)?,
		wallet_id: row.get(2)?,
		message_id: row.get(3)?,
		details: ParsedTransaction {
			direction,
			amount: decimal_at(row, 5)?,
			fee: optional_decimal_at(row, 6)?,
			total_amount: decimal_at(row, 7)?,
			currency: row.get(8)?,
			transaction_date: row.get(9)?,
			transaction_type,
			transaction_ref_no: row.get(11)?,
			payment_ref_no: row.get(12)?,
			acquirer: row.get(13)?,
			source_account: row.get(14)?,
			recipient_name: row.get(15)?,
			recipient_bank: row.get(16)?,
			recipient_bank_account: row.get(17)?,
			purpose: row.get(18)?,
			bank_code: row.get(19)?,
		},
		created_at: row.get(20)?,
	})
}

fn select_wallet(conn: &Connection, user_id: &str, wallet_id: i64) -> Result<Option<Wallet>, StoreError> {
	let sql = format!("SELECT {WALLET_COLUMNS} FROM wallets WHERE id = ?1 AND user_id = ?2");
	Ok(conn
		.query_row(&sql, rusqlite::params![wallet_id, user_id], wallet_from_row)
		.optional()?)
}

fn select_transaction_by_message(
	conn: &Connection,
	user_id: &str,
	message_id: &str,
) -> Result<Option<Transaction>, StoreError> {
	let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE user_id = ?1 AND message_id = ?2");
	Ok(conn
		.query_row(&sql, rusqlite::params![user_id, message_id], transaction_from_row)
		.optional()?)
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
	matches!(
		err,
		rusqlite::Error::SqliteFailure(e, _) if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
	)
}

/// SQLite-backed ledger of wallets and transactions
///
/// The connection is shared behind a mutex; every call runs on the blocking
/// pool so storage work never stalls the async runtime.
#[derive(Clone)]
pub struct SqliteLedgerRepository {
	conn: Arc<Mutex<Connection>>,
	home_currency: String,
}

impl SqliteLedgerRepository {
	pub fn open(db_path: &Path, home_currency: &str) -> Result<Self, StoreError> {
		let conn = get_connection(db_path)?;
		init_db(&conn)?;
		info!("Opened ledger database at {:?}", db_path);
		Ok(Self {
			conn: Arc::new(Mutex::new(conn)),
			home_currency: home_currency.to_string(),
		})
	}

	async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
	where
		T: Send + 'static,
		F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
	{
		let conn = Arc::clone(&self.conn);
		tokio::task::spawn_blocking(move || {
			let mut guard = conn
				.lock()
				.map_err(|_| StoreError::Task("ledger connection lock poisoned".to_string()))?;
			f(&mut guard)
		})
		.await?
	}
}

#[async_trait::async_trait]
impl LedgerRepository for SqliteLedgerRepository {
	async fn ensure_uncategorized(&self, user_id: &str) -> Result<Wallet, StoreError> {
		let user_id = user_id.to_string();
		let currency = self.home_currency.clone();
		self.with_conn(move |conn| {
			let tx = conn.transaction()?;
			let sql = format!("SELECT {WALLET_COLUMNS} FROM wallets WHERE user_id = ?1 AND is_uncategorized = 1");
			let existing = tx.query_row(&sql, [&user_id], wallet_from_row).optional()?;
			let wallet = match existing {
				Some(wallet) => wallet,
				None => {
					tx.execute(
						"INSERT INTO wallets (user_id, name, balance, currency, is_active, is_default, is_uncategorized, created_at)
						 VALUES (?1, ?2, '0', ?3, 1, 0, 1, ?4)",
						rusqlite::params![user_id, UNCATEGORIZED_WALLET_NAME, currency, Utc::now()],
					)?;
					let id = tx.last_insert_rowid();
					debug!(user_id = %user_id, wallet_id = id, "Created Uncategorized wallet");
					select_wallet(&tx, &user_id, id)?
						.ok_or_else(|| StoreError::Corrupt(format!("wallet {id} vanished after insert")))?
				}
			};
			tx.commit()?;
			Ok(wallet)
		})
		.await
	}

	async fn list_wallets(&self, user_id: &str) -> Result<Vec<Wallet>, StoreError> {
		let user_id = user_id.to_string();
		self.with_conn(move |conn| {
			let sql = format!("SELECT {WALLET_COLUMNS} FROM wallets WHERE user_id = ?1 ORDER BY id");
			let mut stmt = conn.prepare(&sql)?;
			let wallets = stmt
				.query_map([&user_id], wallet_from_row)?
				.collect::<Result<Vec<_>, _>>()?;
			Ok(wallets)
		})
		.await
	}

	async fn get_wallet(&self, user_id: &str, wallet_id: i64) -> Result<Option<Wallet>, StoreError> {
		let user_id = user_id.to_string();
		self.with_conn(move |conn| select_wallet(conn, &user_id, wallet_id)).await
	}

	async fn insert_wallet(&self, user_id: &str, wallet: &NewWallet) -> Result<Wallet, StoreError> {
		let user_id = user_id.to_string();
		let wallet = wallet.clone();
		let currency = wallet.currency.clone().unwrap_or_else(|| self.home_currency.clone());
		self.with_conn(move |conn| {
			let tx = conn.transaction()?;
			if wallet.is_default {
				tx.execute("UPDATE wallets SET is_default = 0 WHERE user_id = ?1", [&user_id])?;
			}
			tx.execute(
				"INSERT INTO wallets (user_id, name, bank_code, account_number, balance, currency, is_active, is_default, is_uncategorized, created_at)
				 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, 0, ?8)",
				rusqlite::params![
					user_id,
					wallet.name,
					wallet.bank_code,
					wallet.account_number,
					wallet.balance.to_string(),
					currency,
					wallet.is_default,
					Utc::now(),
				],
			)?;
			let id = tx.last_insert_rowid();
			let created = select_wallet(&tx, &user_id, id)?
				.ok_or_else(|| StoreError::Corrupt(format!("wallet {id} vanished after insert")))?;
			tx.commit()?;
			Ok(created)
		})
		.await
	}

	async fn update_wallet(
		&self,
		user_id: &str,
		wallet_id: i64,
		update: &WalletUpdate,
	) -> Result<Option<Wallet>, StoreError> {
		let user_id = user_id.to_string();
		let update = update.clone();
		self.with_conn(move |conn| {
			let tx = conn.transaction()?;
			let Some(mut wallet) = select_wallet(&tx, &user_id, wallet_id)? else {
				return Ok(None);
			};

			if let Some(name) = update.name {
				wallet.name = name;
			}
			if let Some(bank_code) = update.bank_code {
				wallet.bank_code = Some(bank_code);
			}
			if let Some(account_number) = update.account_number {
				wallet.account_number = Some(account_number).filter(|n| !n.trim().is_empty());
			}
			if let Some(balance) = update.balance {
				wallet.balance = balance;
			}
			if let Some(is_active) = update.is_active {
				wallet.is_active = is_active;
			}
			if let Some(is_default) = update.is_default {
				if is_default {
					tx.execute(
						"UPDATE wallets SET is_default = 0 WHERE user_id = ?1 AND id != ?2",
						rusqlite::params![user_id, wallet_id],
					)?;
				}
				wallet.is_default = is_default;
			}

			tx.execute(
				"UPDATE wallets SET name = ?1, bank_code = ?2, account_number = ?3, balance = ?4,
				 is_active = ?5, is_default = ?6 WHERE id = ?7 AND user_id = ?8",
				rusqlite::params![
					wallet.name,
					wallet.bank_code,
					wallet.account_number,
					wallet.balance.to_string(),
					wallet.is_active,
					wallet.is_default,
					wallet_id,
					user_id,
				],
			)?;
			tx.commit()?;
			Ok(Some(wallet))
		})
		.await
	}

	async fn delete_wallet(
		&self,
		user_id: &str,
		wallet_id: i64,
		fallback_wallet_id: i64,
	) -> Result<usize, StoreError> {
		let user_id = user_id.to_string();
		self.with_conn(move |conn| {
			let tx = conn.transaction()?;
			let moved = tx.execute(
				"UPDATE transactions SET wallet_id = ?1 WHERE user_id = ?2 AND wallet_id = ?3",
				rusqlite::params![fallback_wallet_id, user_id, wallet_id],
			)?;
			tx.execute(
				"DELETE FROM wallets WHERE id = ?1 AND user_id = ?2",
				rusqlite::params![wallet_id, user_id],
			)?;
			tx.commit()?;
			Ok(moved)
		})
		.await
	}

	async fn find_by_message(
		&self,
		user_id: &str,
		message_id: &str,
	) -> Result<Option<Transaction>, StoreError> {
		let user_id = user_id.to_string();
		let message_id = message_id.to_string();
		self.with_conn(move |conn| select_transaction_by_message(conn, &user_id, &message_id))
			.await
	}

	async fn insert_transaction(
		&self,
		user_id: &str,
		message_id: &str,
		wallet_id: i64,
		parsed: &ParsedTransaction,
	) -> Result<Transaction, StoreError> {
		let user_id = user_id.to_string();
		let message_id = message_id.to_string();
		let parsed = parsed.clone();
		self.with_conn(move |conn| {
			let inserted = conn.execute(
				"INSERT INTO transactions (user_id, wallet_id, message_id, direction, amount, fee, total_amount,
				 currency, transaction_date, transaction_type, transaction_ref_no, payment_ref_no, acquirer,
				 source_account, recipient_name, recipient_bank, recipient_bank_account, purpose, bank_code, created_at)
				 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
				rusqlite::params![
					user_id,
					wallet_id,
					message_id,
					parsed.direction.as_str(),
					parsed.amount.to_string(),
					parsed.fee.map(|f| f.to_string()),
					parsed.total_amount.to_string(),
					parsed.currency,
					parsed.transaction_date,
					parsed.transaction_type.as_str(),
					parsed.transaction_ref_no,
					parsed.payment_ref_no,
					parsed.acquirer,
					parsed.source_account,
					parsed.recipient_name,
					parsed.recipient_bank,
					parsed.recipient_bank_account,
					parsed.purpose,
					parsed.bank_code,
					Utc::now(),
				],
			);
			match inserted {
				Ok(_) => {}
				Err(e) if is_unique_violation(&e) => return Err(StoreError::DuplicateMessage(message_id)),
				Err(e) => return Err(e.into()),
			}

			let id = conn.last_insert_rowid();
			let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?1");
			Ok(conn.query_row(&sql, [id], transaction_from_row)?)
		})
		.await
	}

	async fn list_transactions(
		&self,
		user_id: &str,
		filter: &TransactionFilter,
	) -> Result<Vec<Transaction>, StoreError> {
		let user_id = user_id.to_string();
		let filter = filter.clone();
		self.with_conn(move |conn| {
			let mut sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE user_id = ?");
			let mut params: Vec<Box<dyn ToSql>> = vec![Box::new(user_id)];

			if let Some(wallet_id) = filter.wallet_id {
				sql.push_str(" AND wallet_id = ?");
				params.push(Box::new(wallet_id));
			}
			if let Some(direction) = filter.direction {
				sql.push_str(" AND direction = ?");
				params.push(Box::new(direction.as_str()));
			}
			if let Some(from) = filter.from {
				sql.push_str(" AND transaction_date >= ?");
				params.push(Box::new(from));
			}
			if let Some(to) = filter.to {
				sql.push_str(" AND transaction_date <= ?");
				params.push(Box::new(to));
			}
			sql.push_str(" ORDER BY transaction_date DESC, id DESC");
			if let Some(limit) = filter.limit {
				sql.push_str(" LIMIT ?");
				params.push(Box::new(limit));
			}

			let mut stmt = conn.prepare(&sql)?;
			let rows = stmt
				.query_map(rusqlite::params_from_iter(params.iter()), transaction_from_row)?
				.collect::<Result<Vec<_>, _>>()?;
			Ok(rows)
		})
		.await
	}

	async fn reassign_transactions(
		&self,
		user_id: &str,
		assignments: &[(i64, i64)],
	) -> Result<usize, StoreError> {
		if assignments.is_empty() {
			return Ok(0);
		}
		let user_id = user_id.to_string();
		let assignments = assignments.to_vec();
		self.with_conn(move |conn| {
			let tx = conn.transaction()?;
			let mut changed = 0;
			{
				let mut stmt = tx.prepare("UPDATE transactions SET wallet_id = ?1 WHERE id = ?2 AND user_id = ?3")?;
				for (transaction_id, wallet_id) in &assignments {
					changed += stmt.execute(rusqlite::params![wallet_id, transaction_id, user_id])?;
				}
			}
			tx.commit()?;
			Ok(changed)
		})
		.await
	}
}
