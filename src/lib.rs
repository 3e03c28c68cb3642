//! Mail ledger sync
//!
//! Ingests bank notification e-mails from a connected mailbox, parses them into
//! transactions and attributes each one to the user's wallets.
//!
//! - `mailbox`: provider client, credential refresh and retries.
//! - `parser`: sender allow-list and per-format extraction.
//! - `ledger`: idempotent writes, wallet matching and wallet operations.
//! - `store`: SQLite ledger and JSON-file cursor and credential stores.
//! - `sync`: per-user runs, coalescing, push hints and polling.
//! - `server`: HTTP routes.

pub mod config;
pub mod ledger;
pub mod mailbox;
pub mod parser;
pub mod server;
pub mod store;
pub mod sync;
