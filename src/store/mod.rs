//! Persistence module
//!
//! Repository traits for the ledger, sync cursors and mailbox credentials,
//! with a SQLite ledger and JSON-file cursor and credential stores.

/// Repository traits and file-backed implementations
pub mod repositories;
/// SQLite ledger of wallets and transactions
pub mod sqlite;
/// Storage error types
pub mod types;

pub use repositories::{
	CredentialRepository, CursorRepository, FileCredentialRepository, FileCursorRepository,
	LedgerRepository,
};
pub use sqlite::SqliteLedgerRepository;
pub use types::StoreError;
