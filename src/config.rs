//! Process configuration read from `FINTRACK_*` environment variables.

use chrono::FixedOffset;
use secrecy::SecretString;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::mailbox::{AdapterConfig, GmailClientConfig, RetryPolicy};
use crate::parser::ParserConfig;
use crate::sync::OrchestratorConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("{0} is required but not set")]
	Missing(&'static str),

	#[error("{key} has an invalid value {value:?}")]
	Invalid { key: &'static str, value: String },
}

#[derive(Clone)]
pub struct AppConfig {
	pub http_addr: SocketAddr,
	/// Holds `ledger.db` and the cursor and credential directories.
	pub data_dir: PathBuf,
	pub gmail_api_base: String,
	pub oauth_token_url: String,
	pub oauth_client_id: String,
	pub oauth_client_secret: SecretString,
	pub request_timeout: Duration,
	pub poll_interval: Duration,
	pub run_budget: Duration,
	pub rescan_limit: usize,
	pub retry_max_attempts: u32,
	pub retry_initial: Duration,
	pub retry_max: Duration,
	pub provider_concurrency: usize,
	pub token_refresh_skew: chrono::Duration,
	pub home_currency: String,
	pub local_offset: FixedOffset,
	pub webhook_verify_token: Option<String>,
	/// JSON allow-list replacing the built-in bank catalog.
	pub bank_senders: Option<PathBuf>,
}

impl AppConfig {
	/// Load `.env` if present, then read the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		// A missing .env file is normal outside development.
		let _ = dotenvy::dotenv();
		Self::from_lookup(|key| std::env::var(key).ok())
	}

	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let env = Env { lookup };
		let offset_hours: i32 = env.parse("FINTRACK_LOCAL_OFFSET_HOURS", 7)?;
		let local_offset = offset_hours
			.checked_mul(3600)
			.and_then(FixedOffset::east_opt)
			.ok_or(ConfigError::Invalid {
				key: "FINTRACK_LOCAL_OFFSET_HOURS",
				value: offset_hours.to_string(),
			})?;

		Ok(Self {
			http_addr: env.parse("FINTRACK_HTTP_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?,
			data_dir: PathBuf::from(env.or("FINTRACK_DATA_DIR", "./data")),
			gmail_api_base: env.or("FINTRACK_GMAIL_API_BASE", "https://gmail.googleapis.com"),
			oauth_token_url: env.or("FINTRACK_OAUTH_TOKEN_URL", "https://oauth2.googleapis.com/token"),
			oauth_client_id: env.required("FINTRACK_OAUTH_CLIENT_ID")?,
			oauth_client_secret: SecretString::new(env.required("FINTRACK_OAUTH_CLIENT_SECRET")?),
			request_timeout: Duration::from_secs(env.parse("FINTRACK_REQUEST_TIMEOUT_SECS", 30)?),
			poll_interval: Duration::from_secs(env.parse("FINTRACK_POLL_INTERVAL_SECS", 300)?),
			run_budget: Duration::from_secs(env.parse("FINTRACK_RUN_BUDGET_SECS", 120)?),
			rescan_limit: env.parse("FINTRACK_RESCAN_LIMIT", 100)?,
			retry_max_attempts: env.parse("FINTRACK_RETRY_MAX_ATTEMPTS", 5)?,
			retry_initial: Duration::from_millis(env.parse("FINTRACK_RETRY_INITIAL_MS", 500)?),
			retry_max: Duration::from_millis(env.parse("FINTRACK_RETRY_MAX_MS", 30_000)?),
			provider_concurrency: env.parse("FINTRACK_PROVIDER_CONCURRENCY", 8)?,
			token_refresh_skew: chrono::Duration::seconds(env.parse("FINTRACK_TOKEN_REFRESH_SKEW_SECS", 120)?),
			home_currency: env.or("FINTRACK_HOME_CURRENCY", "IDR").to_uppercase(),
			local_offset,
			webhook_verify_token: env.optional("FINTRACK_WEBHOOK_VERIFY_TOKEN"),
			bank_senders: env.optional("FINTRACK_BANK_SENDERS").map(PathBuf::from),
		})
	}

	pub fn gmail(&self) -> GmailClientConfig {
		GmailClientConfig {
			api_base: self.gmail_api_base.clone(),
			token_url: self.oauth_token_url.clone(),
			client_id: self.oauth_client_id.clone(),
			client_secret: self.oauth_client_secret.clone(),
			request_timeout: self.request_timeout,
		}
	}

	pub fn adapter(&self) -> AdapterConfig {
		AdapterConfig {
			retry: RetryPolicy {
				max_attempts: self.retry_max_attempts.max(1),
				initial_interval: self.retry_initial,
				max_interval: self.retry_max,
				..RetryPolicy::default()
			},
			max_concurrent_calls: self.provider_concurrency,
			refresh_skew: self.token_refresh_skew,
		}
	}

	pub fn parser(&self) -> ParserConfig {
		ParserConfig {
			home_currency: self.home_currency.clone(),
			local_offset: self.local_offset,
		}
	}

	pub fn orchestrator(&self) -> OrchestratorConfig {
		OrchestratorConfig {
			rescan_limit: self.rescan_limit,
			run_budget: self.run_budget,
		}
	}
}

struct Env<F> {
	lookup: F,
}

impl<F> Env<F>
where
	F: Fn(&str) -> Option<String>,
{
	/// Set and non-blank.
	fn optional(&self, key: &str) -> Option<String> {
		(self.lookup)(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
	}

	fn or(&self, key: &str, default: &str) -> String {
		self.optional(key).unwrap_or_else(|| default.to_string())
	}

	fn required(&self, key: &'static str) -> Result<String, ConfigError> {
		self.optional(key).ok_or(ConfigError::Missing(key))
	}

	fn parse<T: FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
		match self.optional(key) {
			None => Ok(default),
			Some(value) => value.parse().map_err(|_| ConfigError::Invalid { key, value }),
		}
	}
}
