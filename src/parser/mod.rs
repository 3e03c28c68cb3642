//! Bank notification parser
//!
//! Turns one e-mail (sender, subject, plain-text body) into a canonical
//! [`ParsedTransaction`] or a typed [`ParseFailure`]. Parsing is pure: the same
//! message always yields the same result and no I/O happens here.
//!
//! - `senders`: allow-list of bank senders and bank-name normalization.
//! - `formats`: notification families tried in order (BI-FAST, QRIS, virtual account, card, generic transfer).
//! - `fields`: labelled-value, reference and date extraction.
//! - `amount`: locale-aware money parsing.

/// Locale-aware amount parsing
pub mod amount;
/// Labelled field and date extraction
pub mod fields;
/// Pluggable notification formats
pub mod formats;
/// Bank sender allow-list
pub mod senders;
/// Parser input and output types
pub mod types;

#[cfg(test)]
mod tests;

use chrono::FixedOffset;
use tracing::debug;

pub use amount::NumberLocale;
pub use formats::{ExtractionContext, FormatCatalog, NotificationFormat};
pub use senders::{BankSender, SenderDirectory, default_bank_senders};
pub use types::*;

use fields::NotificationText;

/// Parser settings that do not depend on the message.
#[derive(Debug, Clone)]
pub struct ParserConfig {
	pub home_currency: String,
	/// Offset used for timestamps printed in message bodies.
	pub local_offset: FixedOffset,
}

impl Default for ParserConfig {
	fn default() -> Self {
		Self {
			home_currency: "IDR".to_string(),
			local_offset: FixedOffset::east_opt(7 * 3600).expect("+07:00 is a valid offset"),
		}
	}
}

/// Stateless notification parser.
pub struct Parser {
	senders: SenderDirectory,
	catalog: FormatCatalog,
	config: ParserConfig,
}

impl Parser {
	pub fn new(senders: SenderDirectory, catalog: FormatCatalog, config: ParserConfig) -> Self {
		Self {
			senders,
			catalog,
			config,
		}
	}

	/// Parser with the built-in bank list and formats.
	pub fn with_defaults(config: ParserConfig) -> Self {
		Self::new(
			SenderDirectory::new(default_bank_senders()),
			FormatCatalog::default(),
			config,
		)
	}

	/// Parse one message.
	///
	/// The sender is checked first, then the body, then formats in catalog
	/// order. The first matching format decides the outcome.
	pub fn parse(&self, message: &MessageEnvelope<'_>) -> Result<ParsedTransaction, ParseFailure> {
		let bank = self
			.senders
			.identify(message.sender)
			.ok_or(ParseFailure::NotABankSender)?;

		if message.body.trim().is_empty() {
			return Err(ParseFailure::EmptyBody);
		}

		let text = NotificationText::new(message.subject, message.body);
		let format = self.catalog.detect(&text).ok_or(ParseFailure::NoMatchingFormat)?;
		debug!(bank = %bank.bank_code, format = format.name(), "Notification format detected");

		let ctx = ExtractionContext {
			bank,
			directory: &self.senders,
			home_currency: &self.config.home_currency,
			local_offset: self.config.local_offset,
			received_at: message.received_at,
		};
		format.extract(&text, &ctx)
	}
}
