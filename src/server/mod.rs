//! HTTP surface
//!
//! Mailbox push webhook, its verification challenge, and JSON routes for the
//! sync trigger, transactions and wallets.

/// Route handlers
pub mod handlers;
/// Request bodies and the HTTP error mapping
pub mod types;


use axum::{
	Router,
	routing::{get, post, put},
};
use std::sync::Arc;

use crate::ledger::WalletService;
use crate::sync::SyncCoordinator;

pub use types::ApiError;

#[derive(Clone)]
pub struct AppState {
	pub coordinator: Arc<SyncCoordinator>,
	pub wallets: Arc<WalletService>,
	/// Token a verification request must present, when set.
	pub webhook_verify_token: Option<String>,
}

pub fn build_router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(handlers::health_check))
		.route(
			"/webhooks/mailbox",
			post(handlers::receive_push).get(handlers::verify_subscription),
		)
		.route("/users/:user_id/sync", post(handlers::trigger_sync))
		.route("/users/:user_id/transactions", get(handlers::list_transactions))
		.route(
			"/users/:user_id/wallets",
			get(handlers::list_wallets).post(handlers::create_wallet),
		)
		.route(
			"/users/:user_id/wallets/:wallet_id",
			put(handlers::update_wallet).delete(handlers::delete_wallet),
		)
		.with_state(state)
}
