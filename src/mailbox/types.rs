//! Types for mailbox provider integration and credential handling

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::parser::MessageEnvelope;
use crate::store::StoreError;

/// OAuth credential for one connected mailbox.
///
/// Written by the external connect flow and by the adapter's refresh step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Address of the connected mailbox, used to route webhook hints.
    pub mailbox_address: String,
    /// Short-lived bearer token for provider calls.
    pub access_token: String,
    /// Long-lived token exchanged for new access tokens.
    pub refresh_token: String,
    /// When `access_token` stops being accepted.
    pub expires_at: DateTime<Utc>,
    /// Set when the provider rejected the refresh token; cleared by reconnecting.
    #[serde(default)]
    pub revoked: bool,
    pub updated_at: DateTime<Utc>,
}

impl Credential {
    /// Whether the access token expires within `skew` of `now`.
    pub fn expires_within(&self, skew: chrono::Duration, now: DateTime<Utc>) -> bool {
        self.expires_at - now < skew
    }
}

/// Token endpoint response after a successful refresh.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    /// Lifetime of the new access token in seconds.
    pub expires_in: i64,
    /// Present only when the provider rotates refresh tokens.
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// A message listed by the provider, not yet fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    /// Provider message id, stable across deliveries.
    pub id: String,
    /// History position at which the message was added, when known.
    pub position: Option<String>,
}

/// Result of one listing call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageBatch {
    /// Listed messages in provider order.
    pub messages: Vec<MessageRef>,
    /// Watermark to persist once every message reached a terminal outcome.
    pub new_watermark: Option<String>,
}

/// A fetched message, decoded to plain text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub id: String,
    /// Raw `From` header.
    pub sender: String,
    pub subject: String,
    /// Best plain-text rendering of the body.
    pub body: String,
    pub received_at: DateTime<Utc>,
}

impl RawMessage {
    /// Borrow the parts the parser reads.
    pub fn envelope(&self) -> MessageEnvelope<'_> {
        MessageEnvelope {
            sender: &self.sender,
            subject: &self.subject,
            body: &self.body,
            received_at: self.received_at,
        }
    }
}

/// Errors returned by a single provider call
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("access token rejected")]
    Unauthorized,

    #[error("refresh token rejected: {0}")]
    InvalidGrant(String),

    #[error("history start position is too old")]
    CursorTooOld,

    #[error("message {0} not found")]
    NotFound(String),

    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    #[error("server error: HTTP {status}")]
    Server {
        status: u16,
        retry_after: Option<Duration>,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    Unexpected(String),

    #[error("message decode error: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Rate limits, server errors and transport failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited { .. }
                | ProviderError::Server { .. }
                | ProviderError::Transport(_)
        )
    }

    /// Minimum delay requested by the provider.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimited { retry_after } => *retry_after,
            ProviderError::Server { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::Unexpected(err.to_string())
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}

/// Errors surfaced by the mailbox adapter to the orchestrator
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("user {0} has no connected mailbox")]
    NotConnected(String),

    #[error("mailbox authorization revoked for user {0}")]
    AuthRevoked(String),

    #[error("history cursor expired")]
    CursorExpired,

    #[error("message {0} no longer exists")]
    MessageGone(String),

    #[error("transient provider failure after {attempts} attempts: {last_error}")]
    TransientFailure { attempts: u32, last_error: String },

    #[error("provider error: {0}")]
    Provider(ProviderError),

    #[error("credential store error: {0}")]
    Store(#[from] StoreError),
}
