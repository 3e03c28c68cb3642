//! RFC 822 decoding of fetched messages.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use mailparse::{MailHeaderMap, ParsedMail, parse_mail};
use scraper::{Html, Selector};
use std::sync::OnceLock;

use super::types::{ProviderError, RawMessage};

fn body_selector() -> &'static Selector {
	static SELECTOR: OnceLock<Selector> = OnceLock::new();
	SELECTOR.get_or_init(|| Selector::parse("body").expect("invalid body selector"))
}

/// Decode a base64url `raw` payload into a [`RawMessage`].
///
/// `internal_date_ms` is the provider's receipt time; the `Date` header is
/// used when it is missing.
pub fn decode_raw_message(
	id: &str,
	raw: &str,
	internal_date_ms: Option<i64>,
) -> Result<RawMessage, ProviderError> {
	let bytes = URL_SAFE_NO_PAD
		.decode(raw.trim().trim_end_matches('='))
		.map_err(|e| ProviderError::Decode(format!("base64: {e}")))?;
	let mail = parse_mail(&bytes).map_err(|e| ProviderError::Decode(e.to_string()))?;

	let sender = mail.headers.get_first_value("From").unwrap_or_default();
	let subject = mail.headers.get_first_value("Subject").unwrap_or_default();

	let received_at = internal_date_ms
		.and_then(DateTime::<Utc>::from_timestamp_millis)
		.or_else(|| {
			mail.headers
				.get_first_value("Date")
				.and_then(|date| mailparse::dateparse(&date).ok())
				.and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
		})
		.ok_or_else(|| ProviderError::Decode(format!("message {id} has no receipt time")))?;

	Ok(RawMessage {
		id: id.to_string(),
		sender,
		subject,
		body: extract_best_body(&mail).unwrap_or_default(),
		received_at,
	})
}

/// Prefer `text/plain`; fall back to `text/html` rendered as text.
fn extract_best_body(mail: &ParsedMail) -> Option<String> {
	fn walk(mail: &ParsedMail, mimetype: &str) -> Option<String> {
		if mail.ctype.mimetype.eq_ignore_ascii_case(mimetype) {
			if let Ok(body) = mail.get_body() {
				if !body.trim().is_empty() {
					return Some(body);
				}
			}
		}
		mail.subparts.iter().find_map(|part| walk(part, mimetype))
	}

	walk(mail, "text/plain").or_else(|| walk(mail, "text/html").map(|html| html_to_text(&html)))
}

/// Render HTML as one line per text node, skipping scripts and styles.
///
/// Table cells land on separate lines, so a label cell is followed by its
/// value cell.
pub fn html_to_text(html: &str) -> String {
	let doc = Html::parse_document(html);
	let Some(body) = doc.select(body_selector()).next() else {
		return String::new();
	};

	body.descendants()
		.filter_map(|node| {
			let text = node.value().as_text()?;
			let parent = node.parent().and_then(|p| p.value().as_element().map(|e| e.name().to_string()));
			if matches!(parent.as_deref(), Some("script") | Some("style")) {
				return None;
			}
			let line = text.split_whitespace().collect::<Vec<_>>().join(" ");
			if line.is_empty() { None } else { Some(line) }
		})
		.collect::<Vec<_>>()
		.join("\n")
}

#[cfg(test)]
mod tests {
	use super::*;
	use base64::engine::general_purpose::URL_SAFE;

	const PLAIN: &str = "From: Livin' by Mandiri <noreply@bankmandiri.co.id>\r\n\
		Subject: BI-FAST Transfer Notification\r\n\
		Date: Mon, 19 Oct 2026 14:30:00 +0700\r\n\
		Content-Type: text/plain; charset=utf-8\r\n\
		\r\n\
		Nominal: Rp150.000,00\r\nRef: BMRI12345\r\n";

	#[test]
	fn test_decode_plain_message() {
		let raw = URL_SAFE.encode(PLAIN);
		let msg = decode_raw_message("m1", &raw, None).unwrap();
		assert_eq!(msg.id, "m1");
		assert_eq!(msg.subject, "BI-FAST Transfer Notification");
		assert!(msg.sender.contains("bankmandiri.co.id"));
		assert!(msg.body.contains("Ref: BMRI12345"));
		assert_eq!(msg.received_at.to_rfc3339(), "2026-10-19T07:30:00+00:00");
	}

	#[test]
	fn test_internal_date_wins_over_header() {
		let raw = URL_SAFE_NO_PAD.encode(PLAIN);
		let msg = decode_raw_message("m1", &raw, Some(1_700_000_000_000)).unwrap();
		assert_eq!(msg.received_at.timestamp(), 1_700_000_000);
	}

	#[test]
	fn test_html_fallback() {
		let mail = "From: bank@bca.co.id\r\n\
			Subject: QRIS\r\n\
			Content-Type: text/html; charset=utf-8\r\n\
			\r\n\
			<html><head><style>td{color:red}</style></head><body>\
			<table><tr><td>Nominal</td><td>IDR 45,000.00</td></tr></table>\
			<script>var x = 1;</script></body></html>";
		let raw = URL_SAFE.encode(mail);
		let msg = decode_raw_message("m2", &raw, Some(0)).unwrap();
		assert_eq!(msg.body, "Nominal\nIDR 45,000.00");
	}

	#[test]
	fn test_invalid_base64_is_decode_error() {
		let err = decode_raw_message("m3", "!!!not-base64!!!", Some(0)).unwrap_err();
		assert!(matches!(err, ProviderError::Decode(_)));
	}
}
