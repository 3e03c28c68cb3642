//! Ledger module
//!
//! Writing parsed transactions, attributing them to wallets and the wallet
//! operations that trigger re-attribution.

/// Wallet matching and the Uncategorized resweep
pub mod reconciler;
/// Type definitions for wallets, transactions and ledger errors
pub mod types;
/// Wallet create, update and delete
pub mod wallets;
/// Idempotent transaction writer
pub mod writer;

#[cfg(test)]
mod tests;

pub use reconciler::{WalletReconciler, choose_wallet};
pub use types::*;
pub use wallets::WalletService;
pub use writer::TransactionWriter;
