//! REST client for the Gmail API and the OAuth token endpoint.
//!
//! Every method performs a single logical call and maps HTTP outcomes onto
//! [`ProviderError`]; retries, token refresh and concurrency limits live in
//! the adapter.

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::message::decode_raw_message;
use super::types::*;

/// Calls a mailbox provider makes on behalf of one user
#[async_trait]
pub trait MailboxProvider: Send + Sync {
	/// Messages added since `start_position`, all pages collected.
	async fn list_history(
		&self,
		access_token: &str,
		start_position: &str,
	) -> Result<MessageBatch, ProviderError>;

	/// The `limit` most recent messages, newest first.
	async fn list_recent(
		&self,
		access_token: &str,
		limit: usize,
	) -> Result<Vec<MessageRef>, ProviderError>;

	/// The mailbox's current history position.
	async fn current_position(&self, access_token: &str) -> Result<String, ProviderError>;

	async fn get_message(
		&self,
		access_token: &str,
		message_id: &str,
	) -> Result<RawMessage, ProviderError>;

	/// Exchange a refresh token for a new access token.
	async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, ProviderError>;
}

/// Gmail client settings
#[derive(Clone)]
pub struct GmailClientConfig {
	/// Base URL, `https://gmail.googleapis.com` in production.
	pub api_base: String,
	pub token_url: String,
	pub client_id: String,
	pub client_secret: SecretString,
	pub request_timeout: Duration,
}

#[derive(Clone)]
pub struct GmailClient {
	http_client: Client,
	config: GmailClientConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryResponse {
	#[serde(default)]
	history: Vec<HistoryRecord>,
	next_page_token: Option<String>,
	history_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryRecord {
	id: String,
	#[serde(default)]
	messages_added: Vec<MessageAdded>,
}

#[derive(Debug, Deserialize)]
struct MessageAdded {
	message: MessageId,
}

#[derive(Debug, Deserialize)]
struct MessageId {
	id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageListResponse {
	#[serde(default)]
	messages: Vec<MessageId>,
	next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileResponse {
	history_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessageResponse {
	id: String,
	raw: String,
	internal_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
	error: String,
	error_description: Option<String>,
}

const LIST_PAGE_SIZE: usize = 500;

impl GmailClient {
	pub fn new(config: GmailClientConfig) -> Result<Self, ProviderError> {
		let http_client = Client::builder()
			.timeout(config.request_timeout)
			.build()
			.map_err(|e| ProviderError::Transport(e.to_string()))?;
		Ok(Self {
			http_client,
			config,
		})
	}

	fn url(&self, path: &str) -> String {
		format!(
			"{}/gmail/v1/users/me/{}",
			self.config.api_base.trim_end_matches('/'),
			path
		)
	}

	/// Map non-success statuses shared by all data calls.
	async fn check(response: Response, not_found: impl FnOnce() -> ProviderError) -> Result<Response, ProviderError> {
		let status = response.status();
		if status.is_success() {
			return Ok(response);
		}

		let retry_after = response
			.headers()
			.get(RETRY_AFTER)
			.and_then(|v| v.to_str().ok())
			.and_then(|v| v.trim().parse::<u64>().ok())
			.map(Duration::from_secs);
		let body = response.text().await.unwrap_or_default();

		Err(match status {
			StatusCode::UNAUTHORIZED => ProviderError::Unauthorized,
			StatusCode::NOT_FOUND => not_found(),
			StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited { retry_after },
			StatusCode::FORBIDDEN if body.contains("rateLimitExceeded") || body.contains("userRateLimitExceeded") => {
				ProviderError::RateLimited { retry_after }
			}
			s if s.is_server_error() => ProviderError::Server {
				status: s.as_u16(),
				retry_after,
			},
			s => ProviderError::Unexpected(format!("HTTP {}: {}", s.as_u16(), body)),
		})
	}
}

#[async_trait]
impl MailboxProvider for GmailClient {
	async fn list_history(
		&self,
		access_token: &str,
		start_position: &str,
	) -> Result<MessageBatch, ProviderError> {
		let mut batch = MessageBatch::default();
		let mut page_token: Option<String> = None;

		loop {
			let mut query = vec![
				("startHistoryId", start_position.to_string()),
				("historyTypes", "messageAdded".to_string()),
			];
			if let Some(token) = &page_token {
				query.push(("pageToken", token.clone()));
			}

			let response = self
				.http_client
				.get(self.url("history"))
				.bearer_auth(access_token)
				.query(&query)
				.send()
				.await?;
			let response = Self::check(response, || ProviderError::CursorTooOld).await?;
			let page: HistoryResponse = response.json().await?;

			for record in page.history {
				for added in record.messages_added {
					batch.messages.push(MessageRef {
						id: added.message.id,
						position: Some(record.id.clone()),
					});
				}
			}
			if page.history_id.is_some() {
				batch.new_watermark = page.history_id;
			}

			match page.next_page_token {
				Some(token) => page_token = Some(token),
				None => break,
			}
		}

		debug!(count = batch.messages.len(), "Listed history");
		Ok(batch)
	}

	async fn list_recent(
		&self,
		access_token: &str,
		limit: usize,
	) -> Result<Vec<MessageRef>, ProviderError> {
		let mut refs = Vec::new();
		let mut page_token: Option<String> = None;

		while refs.len() < limit {
			let page_size = (limit - refs.len()).min(LIST_PAGE_SIZE);
			let mut query = vec![("maxResults", page_size.to_string())];
			if let Some(token) = &page_token {
				query.push(("pageToken", token.clone()));
			}

			let response = self
				.http_client
				.get(self.url("messages"))
				.bearer_auth(access_token)
				.query(&query)
				.send()
				.await?;
			let response = Self::check(response, || ProviderError::Unexpected("messages listing not found".into())).await?;
			let page: MessageListResponse = response.json().await?;

			refs.extend(page.messages.into_iter().map(|m| MessageRef {
				id: m.id,
				position: None,
			}));
			match page.next_page_token {
				Some(token) => page_token = Some(token),
				None => break,
			}
		}

		refs.truncate(limit);
		Ok(refs)
	}

	async fn current_position(&self, access_token: &str) -> Result<String, ProviderError> {
		let response = self
			.http_client
			.get(self.url("profile"))
			.bearer_auth(access_token)
			.send()
			.await?;
		let response = Self::check(response, || ProviderError::Unexpected("profile not found".into())).await?;
		let profile: ProfileResponse = response.json().await?;
		Ok(profile.history_id)
	}

	async fn get_message(
		&self,
		access_token: &str,
		message_id: &str,
	) -> Result<RawMessage, ProviderError> {
		let response = self
			.http_client
			.get(self.url(&format!("messages/{message_id}")))
			.bearer_auth(access_token)
			.query(&[("format", "raw")])
			.send()
			.await?;
		let response = Self::check(response, || ProviderError::NotFound(message_id.to_string())).await?;
		let message: RawMessageResponse = response.json().await?;

		let internal_date = message.internal_date.as_deref().and_then(|d| d.parse::<i64>().ok());
		decode_raw_message(&message.id, &message.raw, internal_date)
	}

	async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, ProviderError> {
		let params = [
			("grant_type", "refresh_token"),
			("refresh_token", refresh_token),
			("client_id", self.config.client_id.as_str()),
			("client_secret", self.config.client_secret.expose_secret().as_str()),
		];
		let response = self
			.http_client
			.post(&self.config.token_url)
			.form(&params)
			.send()
			.await?;

		let status = response.status();
		if status.is_success() {
			return Ok(response.json().await?);
		}
		if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
			return Err(ProviderError::Server {
				status: status.as_u16(),
				retry_after: None,
			});
		}

		let body = response.text().await.unwrap_or_default();
		match serde_json::from_str::<TokenErrorResponse>(&body) {
			Ok(err) if err.error == "invalid_grant" => Err(ProviderError::InvalidGrant(
				err.error_description.unwrap_or(err.error),
			)),
			_ => Err(ProviderError::Unexpected(format!(
				"token endpoint returned HTTP {}: {}",
				status.as_u16(),
				body
			))),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use base64::Engine;
	use base64::engine::general_purpose::URL_SAFE;
	use secrecy::Secret;
	use serde_json::json;
	use wiremock::matchers::{body_string_contains, header, method, path, query_param};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	fn client(server: &MockServer) -> GmailClient {
		GmailClient::new(GmailClientConfig {
			api_base: server.uri(),
			token_url: format!("{}/token", server.uri()),
			client_id: "client".to_string(),
			client_secret: Secret::new("secret".to_string()),
			request_timeout: Duration::from_secs(5),
		})
		.unwrap()
	}

	#[tokio::test]
	async fn test_list_history_follows_pages() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/gmail/v1/users/me/history"))
			.and(query_param("startHistoryId", "100"))
			.and(query_param("pageToken", "p2"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"history": [{"id": "105", "messagesAdded": [{"message": {"id": "m2", "threadId": "t"}}]}],
				"historyId": "110"
			})))
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path("/gmail/v1/users/me/history"))
			.and(query_param("startHistoryId", "100"))
			.and(header("authorization", "Bearer tok"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"history": [
					{"id": "101", "messagesAdded": [{"message": {"id": "m1", "threadId": "t"}}]},
					{"id": "102"}
				],
				"nextPageToken": "p2",
				"historyId": "110"
			})))
			.mount(&server)
			.await;

		let batch = client(&server).list_history("tok", "100").await.unwrap();

		assert_eq!(
			batch.messages,
			vec![
				MessageRef { id: "m1".into(), position: Some("101".into()) },
				MessageRef { id: "m2".into(), position: Some("105".into()) },
			]
		);
		assert_eq!(batch.new_watermark.as_deref(), Some("110"));
	}

	#[tokio::test]
	async fn test_history_not_found_means_cursor_too_old() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/gmail/v1/users/me/history"))
			.respond_with(ResponseTemplate::new(404))
			.mount(&server)
			.await;

		let err = client(&server).list_history("tok", "1").await.unwrap_err();
		assert!(matches!(err, ProviderError::CursorTooOld));
	}

	#[tokio::test]
	async fn test_status_mapping() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/gmail/v1/users/me/profile"))
			.respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path("/gmail/v1/users/me/messages"))
			.respond_with(ResponseTemplate::new(401))
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path("/gmail/v1/users/me/messages/gone"))
			.respond_with(ResponseTemplate::new(404))
			.mount(&server)
			.await;

		let c = client(&server);
		match c.current_position("tok").await.unwrap_err() {
			ProviderError::RateLimited { retry_after } => {
				assert_eq!(retry_after, Some(Duration::from_secs(7)))
			}
			other => panic!("unexpected error: {other:?}"),
		}
		assert!(matches!(c.list_recent("tok", 10).await.unwrap_err(), ProviderError::Unauthorized));
		assert!(matches!(
			c.get_message("tok", "gone").await.unwrap_err(),
			ProviderError::NotFound(id) if id == "gone"
		));
	}

	#[tokio::test]
	async fn test_get_message_decodes_raw() {
		let server = MockServer::start().await;
		let raw = URL_SAFE.encode(
			"From: noreply@bankmandiri.co.id\r\nSubject: BI-FAST\r\n\r\nRef: BMRI12345\r\n",
		);
		Mock::given(method("GET"))
			.and(path("/gmail/v1/users/me/messages/m1"))
			.and(query_param("format", "raw"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"id": "m1",
				"raw": raw,
				"internalDate": "1760859000000"
			})))
			.mount(&server)
			.await;

		let msg = client(&server).get_message("tok", "m1").await.unwrap();
		assert_eq!(msg.subject, "BI-FAST");
		assert_eq!(msg.received_at.timestamp_millis(), 1_760_859_000_000);
		assert!(msg.body.contains("BMRI12345"));
	}

	#[tokio::test]
	async fn test_refresh_token_invalid_grant() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/token"))
			.and(body_string_contains("grant_type=refresh_token"))
			.respond_with(ResponseTemplate::new(400).set_body_json(json!({
				"error": "invalid_grant",
				"error_description": "Token has been expired or revoked."
			})))
			.mount(&server)
			.await;

		let err = client(&server).refresh_token("r").await.unwrap_err();
		assert!(matches!(err, ProviderError::InvalidGrant(_)));
	}

	#[tokio::test]
	async fn test_refresh_token_success() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/token"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"access_token": "new-token",
				"expires_in": 3599,
				"token_type": "Bearer"
			})))
			.mount(&server)
			.await;

		let grant = client(&server).refresh_token("r").await.unwrap();
		assert_eq!(grant.access_token, "new-token");
		assert_eq!(grant.expires_in, 3599);
		assert_eq!(grant.refresh_token, None);
	}
}
