#[derive(Debug, thiserror::Error)]
pub enum StoreError {
	#[error("database error: {0}")]
	Database(#[from] rusqlite::Error),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error("storage task failed: {0}")]
	Task(String),

	#[error("message {0} is already recorded")]
	DuplicateMessage(String),

	#[error("version conflict: expected {expected}, found {found}")]
	VersionConflict { expected: u64, found: u64 },

	#[error("corrupt record: {0}")]
	Corrupt(String),
}

impl From<tokio::task::JoinError> for StoreError {
	fn from(err: tokio::task::JoinError) -> Self {
		StoreError::Task(err.to_string())
	}
}
