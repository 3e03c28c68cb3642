use axum::{
	Json,
	http::StatusCode,
	response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::ledger::LedgerError;
use crate::store::StoreError;
use crate::sync::SyncError;

/// Mailbox push notification
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushNotification {
	pub mailbox_address: String,
	/// Provider position at push time; numeric or string depending on the sender.
	#[serde(default)]
	pub watermark: Option<serde_json::Value>,
}

/// Subscription verification query
#[derive(Debug, Clone, Deserialize)]
pub struct VerificationQuery {
	pub challenge: Option<String>,
	pub verify_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	status: &'static str,
	error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
	#[error(transparent)]
	Sync(#[from] SyncError),

	#[error(transparent)]
	Ledger(#[from] LedgerError),

	#[error("bad request: {0}")]
	BadRequest(String),

	#[error("forbidden: {0}")]
	Forbidden(String),
}

fn store_status(err: &StoreError) -> (StatusCode, &'static str) {
	match err {
		StoreError::VersionConflict { .. } | StoreError::DuplicateMessage(_) => (StatusCode::CONFLICT, "conflict"),
		_ => (StatusCode::SERVICE_UNAVAILABLE, "will_retry"),
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let (status, label) = match &self {
			ApiError::Sync(SyncError::AuthRevoked(_)) => (StatusCode::FORBIDDEN, "needs_reauthorization"),
			ApiError::Sync(SyncError::NotConnected(_)) => (StatusCode::NOT_FOUND, "not_connected"),
			ApiError::Sync(SyncError::Transient(_) | SyncError::Storage(_)) => {
				(StatusCode::SERVICE_UNAVAILABLE, "will_retry")
			}
			ApiError::Sync(SyncError::Provider(_)) => (StatusCode::BAD_GATEWAY, "failed"),
			ApiError::Ledger(LedgerError::WalletNotFound(_)) => (StatusCode::NOT_FOUND, "not_found"),
			ApiError::Ledger(LedgerError::InvalidWallet(_)) => (StatusCode::BAD_REQUEST, "invalid"),
			ApiError::Ledger(LedgerError::UncategorizedWallet(_)) => (StatusCode::CONFLICT, "conflict"),
			ApiError::Ledger(LedgerError::Store(e)) => store_status(e),
			ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "invalid"),
			ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
		};

		let mut response = (
			status,
			Json(ErrorBody {
				status: label,
				error: self.to_string(),
			}),
		)
			.into_response();

		if status == StatusCode::SERVICE_UNAVAILABLE {
			response
				.headers_mut()
				.insert(axum::http::header::RETRY_AFTER, axum::http::HeaderValue::from_static("60"));
		}
		response
	}
}
