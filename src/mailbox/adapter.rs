//! Mailbox adapter
//!
//! Wraps a [`MailboxProvider`] with everything a sync run needs around a raw
//! provider call: credential loading, proactive and forced token refresh,
//! revocation handling, bounded retry and a process-wide concurrency cap.

use chrono::Utc;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};

use super::client::MailboxProvider;
use super::retry::{RetryError, RetryPolicy};
use super::types::*;
use crate::store::CredentialRepository;

/// Adapter settings
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub retry: RetryPolicy,
    /// Concurrent provider calls allowed across all users.
    pub max_concurrent_calls: usize,
    /// Refresh when the access token expires within this window.
    pub refresh_skew: chrono::Duration,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            max_concurrent_calls: 8,
            refresh_skew: chrono::Duration::seconds(120),
        }
    }
}

pub struct MailboxAdapter {
    provider: Arc<dyn MailboxProvider>,
    credentials: Arc<dyn CredentialRepository>,
    config: AdapterConfig,
    permits: Arc<Semaphore>,
    refresh_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl MailboxAdapter {
    pub fn new(
        provider: Arc<dyn MailboxProvider>,
        credentials: Arc<dyn CredentialRepository>,
        config: AdapterConfig,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_calls.max(1)));
        Self {
            provider,
            credentials,
            config,
            permits,
            refresh_locks: DashMap::new(),
        }
    }

    /// Load the user's credential, failing fast when it is missing or revoked.
    pub async fn credential(&self, user_id: &str) -> Result<Credential, MailboxError> {
        let credential = self
            .credentials
            .load(user_id)
            .await?
            .ok_or_else(|| MailboxError::NotConnected(user_id.to_string()))?;
        if credential.revoked {
            return Err(MailboxError::AuthRevoked(user_id.to_string()));
        }
        Ok(credential)
    }

    /// Message ids added since `since_cursor`.
    pub async fn fetch_new_message_ids(
        &self,
        user_id: &str,
        since_cursor: &str,
    ) -> Result<MessageBatch, MailboxError> {
        let provider = self.provider.clone();
        let since = since_cursor.to_string();
        self.call(user_id, move |token| {
            let provider = provider.clone();
            let since = since.clone();
            async move { provider.list_history(&token, &since).await }
        })
        .await
    }

    /// The most recent `limit` messages plus a fresh watermark.
    ///
    /// The watermark is read before listing so messages arriving during the
    /// rescan are picked up again by the next incremental run.
    pub async fn rescan_recent(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<MessageBatch, MailboxError> {
        let provider = self.provider.clone();
        let watermark = self
            .call(user_id, move |token| {
                let provider = provider.clone();
                async move { provider.current_position(&token).await }
            })
            .await?;

        let provider = self.provider.clone();
        let messages = self
            .call(user_id, move |token| {
                let provider = provider.clone();
                async move { provider.list_recent(&token, limit).await }
            })
            .await?;

        info!(user_id, count = messages.len(), watermark = %watermark, "Rescanned recent messages");
        Ok(MessageBatch {
            messages,
            new_watermark: Some(watermark),
        })
    }

    pub async fn fetch_message_body(
        &self,
        user_id: &str,
        message_id: &str,
    ) -> Result<RawMessage, MailboxError> {
        let provider = self.provider.clone();
        let id = message_id.to_string();
        self.call(user_id, move |token| {
            let provider = provider.clone();
            let id = id.clone();
            async move { provider.get_message(&token, &id).await }
        })
        .await
    }

    /// Run one provider operation with a valid token.
    ///
    /// A 401 forces one refresh and one more attempt; a second 401 is
    /// returned as a provider error.
    async fn call<T, F, Fut>(&self, user_id: &str, op: F) -> Result<T, MailboxError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut token = self.access_token(user_id).await?;
        let mut refreshed = false;

        loop {
            let result = self
                .config
                .retry
                .run(|| {
                    let permits = self.permits.clone();
                    let attempt = op(token.clone());
                    async move {
                        // Held only for the call itself; retry sleeps happen without it.
                        let _permit = permits
                            .acquire_owned()
                            .await
                            .map_err(|e| ProviderError::Transport(e.to_string()))?;
                        attempt.await
                    }
                })
                .await;

            match result {
                Ok(value) => return Ok(value),
                Err(RetryError::Permanent(ProviderError::Unauthorized)) if !refreshed => {
                    debug!(user_id, "Access token rejected, forcing refresh");
                    refreshed = true;
                    token = self.refresh(user_id, &token).await?;
                }
                Err(err) => return Err(self.classify(err)),
            }
        }
    }

    fn classify(&self, err: RetryError) -> MailboxError {
        match err {
            RetryError::Exhausted { attempts, last } => MailboxError::TransientFailure {
                attempts,
                last_error: last.to_string(),
            },
            RetryError::Permanent(ProviderError::CursorTooOld) => MailboxError::CursorExpired,
            RetryError::Permanent(ProviderError::NotFound(id)) => MailboxError::MessageGone(id),
            RetryError::Permanent(other) => MailboxError::Provider(other),
        }
    }

    /// Current access token, refreshed first when it is about to expire.
    async fn access_token(&self, user_id: &str) -> Result<String, MailboxError> {
        let credential = self.credential(user_id).await?;
        if credential.expires_within(self.config.refresh_skew, Utc::now()) {
            return self.refresh(user_id, &credential.access_token).await;
        }
        Ok(credential.access_token)
    }

    /// Replace `stale_token`, serialized per user.
    ///
    /// After taking the lock the credential is read again: when another task
    /// already replaced the stale token its result is reused.
    async fn refresh(&self, user_id: &str, stale_token: &str) -> Result<String, MailboxError> {
        let lock = self
            .refresh_locks
            .entry(user_id.to_string())
            .or_default()
            .clone();
        let _guard = lock.lock().await;

        let mut credential = self.credential(user_id).await?;
        let now = Utc::now();
        if credential.access_token != stale_token
            && !credential.expires_within(self.config.refresh_skew, now)
        {
            debug!(user_id, "Credential already refreshed by another task");
            return Ok(credential.access_token);
        }

        let provider = self.provider.clone();
        let refresh_token = credential.refresh_token.clone();
        let result = self
            .config
            .retry
            .run(|| {
                let provider = provider.clone();
                let refresh_token = refresh_token.clone();
                async move { provider.refresh_token(&refresh_token).await }
            })
            .await;

        match result {
            Ok(grant) => {
                let now = Utc::now();
                credential.access_token = grant.access_token;
                credential.expires_at = now + chrono::Duration::seconds(grant.expires_in);
                if let Some(rotated) = grant.refresh_token {
                    credential.refresh_token = rotated;
                }
                credential.updated_at = now;
                self.credentials.save(user_id, &credential).await?;
                info!(user_id, expires_at = %credential.expires_at, "Refreshed mailbox credential");
                Ok(credential.access_token)
            }
            Err(RetryError::Permanent(ProviderError::InvalidGrant(reason))) => {
                credential.revoked = true;
                credential.updated_at = Utc::now();
                self.credentials.save(user_id, &credential).await?;
                warn!(user_id, reason = %reason, "Mailbox authorization revoked");
                Err(MailboxError::AuthRevoked(user_id.to_string()))
            }
            Err(err) => Err(self.classify(err)),
        }
    }
}
