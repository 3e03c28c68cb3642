use anyhow::Context;
use std::sync::Arc;
use tracing::info;

use mail_ledger_sync::config::AppConfig;
use mail_ledger_sync::ledger::{TransactionWriter, WalletReconciler, WalletService};
use mail_ledger_sync::mailbox::{GmailClient, MailboxAdapter};
use mail_ledger_sync::parser::{FormatCatalog, Parser, SenderDirectory, default_bank_senders};
use mail_ledger_sync::server::{AppState, build_router};
use mail_ledger_sync::store::{
	FileCredentialRepository, FileCursorRepository, LedgerRepository, SqliteLedgerRepository,
};
use mail_ledger_sync::sync::{IngestionOrchestrator, MessageProcessor, SyncCoordinator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::from_default_env()
				.add_directive("mail_ledger_sync=debug".parse()?)
				.add_directive("hyper=warn".parse()?)
				.add_directive(tracing::Level::INFO.into()),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	info!("Starting mail ledger sync service");
	let config = AppConfig::from_env().context("invalid configuration")?;

	let senders = match &config.bank_senders {
		Some(path) => SenderDirectory::from_json_file(path)
			.with_context(|| format!("failed to load bank senders from {}", path.display()))?,
		None => SenderDirectory::new(default_bank_senders()),
	};
	info!(banks = senders.banks().len(), "Loaded bank sender allow-list");

	let credentials = Arc::new(FileCredentialRepository::new(config.data_dir.join("credentials")));
	let cursors = Arc::new(FileCursorRepository::new(config.data_dir.join("cursors")));
	let ledger: Arc<dyn LedgerRepository> = Arc::new(
		SqliteLedgerRepository::open(&config.data_dir.join("ledger.db"), &config.home_currency)
			.context("failed to open ledger database")?,
	);
	info!(data_dir = %config.data_dir.display(), "Opened storage");

	let provider = Arc::new(GmailClient::new(config.gmail()).context("failed to build Gmail client")?);
	let adapter = Arc::new(MailboxAdapter::new(provider, credentials.clone(), config.adapter()));

	let parser = Arc::new(Parser::new(senders.clone(), FormatCatalog::default(), config.parser()));
	let reconciler = Arc::new(WalletReconciler::new(ledger.clone()));
	let writer = Arc::new(TransactionWriter::new(ledger.clone(), reconciler.clone()));
	let processor = MessageProcessor::new(adapter.clone(), parser, writer);
	let orchestrator = Arc::new(IngestionOrchestrator::new(
		adapter,
		processor,
		reconciler.clone(),
		cursors,
		config.orchestrator(),
	));
	let coordinator = Arc::new(SyncCoordinator::new(orchestrator, credentials));

	let poller = coordinator.clone().spawn_poller(config.poll_interval);
	info!(interval_secs = config.poll_interval.as_secs(), "Started mailbox poller");

	let state = AppState {
		coordinator,
		wallets: Arc::new(WalletService::new(ledger, reconciler, senders)),
		webhook_verify_token: config.webhook_verify_token.clone(),
	};

	let listener = tokio::net::TcpListener::bind(config.http_addr)
		.await
		.with_context(|| format!("failed to bind {}", config.http_addr))?;
	info!(addr = %config.http_addr, "Listening");

	let served = axum::serve(listener, build_router(state)).await;
	poller.abort();
	served.context("HTTP server stopped")
}
