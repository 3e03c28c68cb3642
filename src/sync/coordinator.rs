use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::orchestrator::IngestionOrchestrator;
use super::types::{SyncError, SyncSummary, TriggerSource};
use crate::store::CredentialRepository;

type RunResult = Result<SyncSummary, SyncError>;

#[derive(Default)]
struct RunSlot {
	/// Generation of the most recent request
	requested: AtomicU64,
	state: Mutex<SlotState>,
}

#[derive(Default)]
struct SlotState {
	/// Highest request generation covered by a finished run
	completed: u64,
	last_result: Option<RunResult>,
}

/// Single entry point for "check user X"
///
/// Runs for one user never overlap. A trigger that arrives while a run is in
/// flight waits for it and then starts one more run that covers every request
/// queued meanwhile; requests already covered by a finished run share its
/// result.
pub struct SyncCoordinator {
	orchestrator: Arc<IngestionOrchestrator>,
	credentials: Arc<dyn CredentialRepository>,
	slots: DashMap<String, Arc<RunSlot>>,
}

impl SyncCoordinator {
	pub fn new(orchestrator: Arc<IngestionOrchestrator>, credentials: Arc<dyn CredentialRepository>) -> Self {
		Self {
			orchestrator,
			credentials,
			slots: DashMap::new(),
		}
	}

	pub async fn trigger(&self, user_id: &str, source: TriggerSource) -> RunResult {
		let slot = self.slots.entry(user_id.to_string()).or_default().clone();
		let generation = slot.requested.fetch_add(1, Ordering::SeqCst) + 1;

		let mut state = slot.state.lock().await;
		if state.completed >= generation {
			if let Some(result) = &state.last_result {
				debug!(user_id, %source, generation, "Coalesced into a finished run");
				return result.clone();
			}
		}

		let covered = slot.requested.load(Ordering::SeqCst);
		info!(user_id, %source, generation, covered, "Starting sync run");
		let result = self.orchestrator.run(user_id).await;

		state.completed = covered;
		state.last_result = Some(result.clone());
		result
	}

	/// Treat a push notification for `mailbox_address` as a hint to sync.
	///
	/// The pushed watermark is only logged; the run lists history itself.
	pub fn hint_mailbox(self: &Arc<Self>, mailbox_address: &str, watermark: Option<String>) -> JoinHandle<()> {
		let coordinator = Arc::clone(self);
		let mailbox_address = mailbox_address.to_string();
		tokio::spawn(async move {
			debug!(mailbox = %mailbox_address, watermark = ?watermark, "Mailbox push received");
			let user_id = match coordinator.credentials.find_by_mailbox(&mailbox_address).await {
				Ok(Some(user_id)) => user_id,
				Ok(None) => {
					warn!(mailbox = %mailbox_address, "Push for an unknown mailbox");
					return;
				}
				Err(e) => {
					warn!(mailbox = %mailbox_address, "Could not resolve mailbox owner: {}", e);
					return;
				}
			};
			if let Err(e) = coordinator.trigger(&user_id, TriggerSource::Webhook).await {
				warn!(user_id = %user_id, "Push-triggered run failed: {}", e);
			}
		})
	}

	/// Run every connected user once, concurrently.
	///
	/// Returns how many runs succeeded.
	pub async fn poll_all(&self) -> usize {
		let users = match self.credentials.list_users().await {
			Ok(users) => users,
			Err(e) => {
				warn!("Could not list connected users: {}", e);
				return 0;
			}
		};

		let results = join_all(users.iter().map(|user_id| self.trigger(user_id, TriggerSource::Poll))).await;
		let succeeded = results.iter().filter(|r| r.is_ok()).count();
		info!(users = users.len(), succeeded, "Poll pass finished");
		succeeded
	}

	/// Poll all users every `interval` until the task is aborted.
	pub fn spawn_poller(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
		tokio::spawn(async move {
			let mut ticker = tokio::time::interval(interval);
			ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
			loop {
				ticker.tick().await;
				self.poll_all().await;
			}
		})
	}
}
