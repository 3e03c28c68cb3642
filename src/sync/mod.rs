//! Mailbox Synchronization Module
//!
//! This module turns mailbox history into ledger entries. It is composed of
//! several submodules:
//!
//! - `coordinator`: the single trigger for a user's sync, run coalescing, push hints and polling.
//! - `orchestrator`: one run, from the stored cursor to a committed batch.
//! - `strategies`: incremental history listing and the bounded recent rescan.
//! - `message_processor`: fetch, parse and write of single messages.
//! - `progress_tracker`: per-run outcome counts and the partial-progress watermark.

/// Per-user trigger, coalescing and polling
pub mod coordinator;
/// Single-message fetch, parse and write
pub mod message_processor;
/// Main state machine of one ingestion run
pub mod orchestrator;
/// Tracks run progress and outcome counts
pub mod progress_tracker;
/// Message listing strategies
pub mod strategies;
/// Type definitions for cursors, run summaries and sync errors
pub mod types;


pub use coordinator::SyncCoordinator;
pub use message_processor::MessageProcessor;
pub use orchestrator::{IngestionOrchestrator, OrchestratorConfig};
pub use types::*;
