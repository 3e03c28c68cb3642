//! Mailbox integration module
//!
//! This module provides the provider client and the adapter the sync pipeline
//! talks to. The client speaks the Gmail REST API; the adapter adds credential
//! refresh, revocation handling, bounded retries and a shared concurrency cap.

/// Credential-aware wrapper around the provider
pub mod adapter;
/// Gmail REST client and the provider trait
pub mod client;
/// RFC 822 decoding of fetched messages
pub mod message;
/// Bounded retry with exponential backoff
pub mod retry;
/// Type definitions for mailbox data and errors
pub mod types;

pub use adapter::{AdapterConfig, MailboxAdapter};
pub use client::{GmailClient, GmailClientConfig, MailboxProvider};
pub use retry::RetryPolicy;
pub use types::*;
