use crate::ledger::{NewWallet, Transaction, TransactionFilter, Wallet, WalletUpdate};
use crate::mailbox::Credential;
use crate::parser::ParsedTransaction;
use crate::sync::SyncCursor;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::StoreError;

/// Repository for wallets and transactions
#[async_trait::async_trait]
pub trait LedgerRepository: Send + Sync {
	/// The user's Uncategorized wallet, created on first use.
	async fn ensure_uncategorized(&self, user_id: &str) -> Result<Wallet, StoreError>;
	async fn list_wallets(&self, user_id: &str) -> Result<Vec<Wallet>, StoreError>;
	async fn get_wallet(&self, user_id: &str, wallet_id: i64) -> Result<Option<Wallet>, StoreError>;
	/// Insert a wallet; a new default clears the previous one in the same transaction.
	async fn insert_wallet(&self, user_id: &str, wallet: &NewWallet) -> Result<Wallet, StoreError>;
	async fn update_wallet(
		&self,
		user_id: &str,
		wallet_id: i64,
		update: &WalletUpdate,
	) -> Result<Option<Wallet>, StoreError>;
	/// Move the wallet's transactions to `fallback_wallet_id`, then delete it.
	/// Returns how many transactions moved.
	async fn delete_wallet(
		&self,
		user_id: &str,
		wallet_id: i64,
		fallback_wallet_id: i64,
	) -> Result<usize, StoreError>;
	async fn find_by_message(
		&self,
		user_id: &str,
		message_id: &str,
	) -> Result<Option<Transaction>, StoreError>;
	/// Fails with [`StoreError::DuplicateMessage`] when the message is already recorded.
	async fn insert_transaction(
		&self,
		user_id: &str,
		message_id: &str,
		wallet_id: i64,
		parsed: &ParsedTransaction,
	) -> Result<Transaction, StoreError>;
	async fn list_transactions(
		&self,
		user_id: &str,
		filter: &TransactionFilter,
	) -> Result<Vec<Transaction>, StoreError>;
	/// Apply `(transaction_id, wallet_id)` pairs atomically.
	async fn reassign_transactions(
		&self,
		user_id: &str,
		assignments: &[(i64, i64)],
	) -> Result<usize, StoreError>;
}

/// Repository for per-user sync cursors
#[async_trait::async_trait]
pub trait CursorRepository: Send + Sync {
	async fn load(&self, user_id: &str) -> Result<Option<SyncCursor>, StoreError>;
	/// Save `cursor` if the stored version still equals `cursor.version`.
	/// Returns the cursor as stored, version incremented.
	async fn save(&self, cursor: &SyncCursor) -> Result<SyncCursor, StoreError>;
}

/// Repository for mailbox credentials
#[async_trait::async_trait]
pub trait CredentialRepository: Send + Sync {
	async fn load(&self, user_id: &str) -> Result<Option<Credential>, StoreError>;
	async fn save(&self, user_id: &str, credential: &Credential) -> Result<(), StoreError>;
	/// User owning the given mailbox address.
	async fn find_by_mailbox(&self, mailbox_address: &str) -> Result<Option<String>, StoreError>;
	/// Every user with a stored credential.
	async fn list_users(&self) -> Result<Vec<String>, StoreError>;
}

const CURSOR_PREFIX: &str = "cursor_";
const CREDENTIAL_PREFIX: &str = "credential_";

fn user_filename(data_dir: &Path, prefix: &str, user_id: &str) -> PathBuf {
	data_dir.join(format!("{}{}.json", prefix, hex::encode(user_id.as_bytes())))
}

/// User id encoded in a repository filename, if it has the given prefix.
fn user_from_filename(filename: &str, prefix: &str) -> Option<String> {
	let encoded = filename.strip_prefix(prefix)?.strip_suffix(".json")?;
	let bytes = hex::decode(encoded).ok()?;
	String::from_utf8(bytes).ok()
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
	match tokio::fs::read_to_string(path).await {
		Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(e.into()),
	}
}

/// Write through a temporary file and rename, so readers never see a torn file.
async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
	if let Some(parent) = path.parent() {
		tokio::fs::create_dir_all(parent).await?;
	}
	let tmp = path.with_extension("json.tmp");
	tokio::fs::write(&tmp, serde_json::to_string_pretty(value)?).await?;
	tokio::fs::rename(&tmp, path).await?;
	Ok(())
}

async fn list_user_files(data_dir: &Path, prefix: &str) -> Result<Vec<(PathBuf, String)>, StoreError> {
	let mut entries = match tokio::fs::read_dir(data_dir).await {
		Ok(entries) => entries,
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
		Err(e) => return Err(e.into()),
	};

	let mut found = Vec::new();
	while let Some(entry) = entries.next_entry().await? {
		let path = entry.path();
		if let Some(user_id) = path
			.file_name()
			.and_then(|f| f.to_str())
			.and_then(|f| user_from_filename(f, prefix))
		{
			found.push((path, user_id));
		}
	}
	found.sort_by(|a, b| a.1.cmp(&b.1));
	Ok(found)
}

/// File-based implementation of CursorRepository
pub struct FileCursorRepository {
	data_dir: PathBuf,
	/// Serializes the version check with the write.
	write_lock: tokio::sync::Mutex<()>,
}

impl FileCursorRepository {
	pub fn new(data_dir: PathBuf) -> Self {
		Self {
			data_dir,
			write_lock: tokio::sync::Mutex::new(()),
		}
	}

	fn get_cursor_filename(&self, user_id: &str) -> PathBuf {
		user_filename(&self.data_dir, CURSOR_PREFIX, user_id)
	}
}

#[async_trait::async_trait]
impl CursorRepository for FileCursorRepository {
	async fn load(&self, user_id: &str) -> Result<Option<SyncCursor>, StoreError> {
		read_json(&self.get_cursor_filename(user_id)).await
	}

	async fn save(&self, cursor: &SyncCursor) -> Result<SyncCursor, StoreError> {
		let _guard = self.write_lock.lock().await;
		let filename = self.get_cursor_filename(&cursor.user_id);

		let stored_version = read_json::<SyncCursor>(&filename)
			.await?
			.map(|c| c.version)
			.unwrap_or(0);
		if stored_version != cursor.version {
			return Err(StoreError::VersionConflict {
				expected: cursor.version,
				found: stored_version,
			});
		}

		let mut saved = cursor.clone();
		saved.version = cursor.version + 1;
		write_json(&filename, &saved).await?;

		debug!(
			user_id = %saved.user_id,
			version = saved.version,
			watermark = ?saved.watermark,
			"Saved sync cursor"
		);
		Ok(saved)
	}
}

/// File-based implementation of CredentialRepository
pub struct FileCredentialRepository {
	data_dir: PathBuf,
}

impl FileCredentialRepository {
	pub fn new(data_dir: PathBuf) -> Self {
		Self { data_dir }
	}

	fn get_credential_filename(&self, user_id: &str) -> PathBuf {
		user_filename(&self.data_dir, CREDENTIAL_PREFIX, user_id)
	}
}

#[async_trait::async_trait]
impl CredentialRepository for FileCredentialRepository {
	async fn load(&self, user_id: &str) -> Result<Option<Credential>, StoreError> {
		read_json(&self.get_credential_filename(user_id)).await
	}

	async fn save(&self, user_id: &str, credential: &Credential) -> Result<(), StoreError> {
		let filename = self.get_credential_filename(user_id);
		write_json(&filename, credential).await?;
		info!(user_id, revoked = credential.revoked, "Saved mailbox credential");
		Ok(())
	}

	async fn find_by_mailbox(&self, mailbox_address: &str) -> Result<Option<String>, StoreError> {
		for (path, user_id) in list_user_files(&self.data_dir, CREDENTIAL_PREFIX).await? {
			match read_json::<Credential>(&path).await {
				Ok(Some(credential)) if credential.mailbox_address.eq_ignore_ascii_case(mailbox_address) => {
					return Ok(Some(user_id));
				}
				Ok(_) => {}
				Err(e) => warn!("Skipping unreadable credential {:?}: {}", path, e),
			}
		}
		Ok(None)
	}

	async fn list_users(&self) -> Result<Vec<String>, StoreError> {
		Ok(list_user_files(&self.data_dir, CREDENTIAL_PREFIX)
			.await?
			.into_iter()
			.map(|(_, user_id)| user_id)
			.collect())
	}
}
