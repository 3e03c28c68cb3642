use axum::{
	Json,
	extract::{Path, Query, State},
	http::StatusCode,
	response::IntoResponse,
};
use serde_json::json;
use tracing::{info, warn};

use super::AppState;
use super::types::{ApiError, PushNotification, VerificationQuery};
use crate::ledger::{
	NewWallet, Transaction, TransactionFilter, Wallet, WalletChange, WalletDeletion, WalletUpdate,
};
use crate::sync::{SyncSummary, TriggerSource};

pub async fn health_check() -> impl IntoResponse {
	(
		StatusCode::OK,
		Json(json!({ "status": "ok", "service": env!("CARGO_PKG_NAME") })),
	)
}

/// Acknowledge a push at once; the sync runs on its own task.
pub async fn receive_push(
	State(state): State<AppState>,
	Json(push): Json<PushNotification>,
) -> impl IntoResponse {
	info!(mailbox = %push.mailbox_address, "Mailbox push accepted");
	let watermark = push.watermark.map(|w| match w {
		serde_json::Value::String(s) => s,
		other => other.to_string(),
	});
	// Detached: the handle is dropped, the run continues.
	let _ = state.coordinator.hint_mailbox(&push.mailbox_address, watermark);
	(StatusCode::ACCEPTED, Json(json!({ "status": "accepted" })))
}

/// Echo the challenge of a subscription verification request.
pub async fn verify_subscription(
	State(state): State<AppState>,
	Query(query): Query<VerificationQuery>,
) -> Result<String, ApiError> {
	if let Some(expected) = state.webhook_verify_token.as_deref() {
		if query.verify_token.as_deref() != Some(expected) {
			warn!("Rejected webhook verification with a wrong token");
			return Err(ApiError::Forbidden("verify token mismatch".into()));
		}
	}
	query
		.challenge
		.ok_or_else(|| ApiError::BadRequest("missing challenge".into()))
}

pub async fn trigger_sync(
	State(state): State<AppState>,
	Path(user_id): Path<String>,
) -> Result<Json<SyncSummary>, ApiError> {
	let summary = state.coordinator.trigger(&user_id, TriggerSource::Manual).await?;
	Ok(Json(summary))
}

pub async fn list_transactions(
	State(state): State<AppState>,
	Path(user_id): Path<String>,
	Query(filter): Query<TransactionFilter>,
) -> Result<Json<Vec<Transaction>>, ApiError> {
	Ok(Json(state.wallets.list_transactions(&user_id, &filter).await?))
}

pub async fn list_wallets(
	State(state): State<AppState>,
	Path(user_id): Path<String>,
) -> Result<Json<Vec<Wallet>>, ApiError> {
	Ok(Json(state.wallets.list_wallets(&user_id).await?))
}

pub async fn create_wallet(
	State(state): State<AppState>,
	Path(user_id): Path<String>,
	Json(wallet): Json<NewWallet>,
) -> Result<(StatusCode, Json<WalletChange>), ApiError> {
	let change = state.wallets.create_wallet(&user_id, &wallet).await?;
	Ok((StatusCode::CREATED, Json(change)))
}

pub async fn update_wallet(
	State(state): State<AppState>,
	Path((user_id, wallet_id)): Path<(String, i64)>,
	Json(update): Json<WalletUpdate>,
) -> Result<Json<WalletChange>, ApiError> {
	Ok(Json(state.wallets.update_wallet(&user_id, wallet_id, &update).await?))
}

pub async fn delete_wallet(
	State(state): State<AppState>,
	Path((user_id, wallet_id)): Path<(String, i64)>,
) -> Result<Json<WalletDeletion>, ApiError> {
	Ok(Json(state.wallets.delete_wallet(&user_id, wallet_id).await?))
}
