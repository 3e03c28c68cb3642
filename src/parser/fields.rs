//! Labelled-value and date extraction over notification text.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use std::sync::OnceLock;

/// Subject and body of a notification, normalized once for all formats.
#[derive(Debug, Clone)]
pub struct NotificationText {
	pub subject: String,
	pub body: String,
	lines: Vec<String>,
	haystack: String,
}

impl NotificationText {
	pub fn new(subject: &str, body: &str) -> Self {
		let body = body.replace("\r\n", "\n").replace('\u{a0}', " ");
		let lines = body
			.lines()
			.map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
			.filter(|line| !line.is_empty())
			.collect();
		let haystack = format!("{}\n{}", subject, body).to_lowercase();
		Self {
			subject: subject.trim().to_string(),
			body,
			lines,
			haystack,
		}
	}

	pub fn contains_any(&self, needles: &[&str]) -> bool {
		needles.iter().any(|n| self.haystack.contains(n))
	}

	/// Position of the earliest occurrence of any needle.
	pub fn first_position(&self, needles: &[&str]) -> Option<usize> {
		needles.iter().filter_map(|n| self.haystack.find(n)).min()
	}

	/// Value following the first label found, on the same line or the next.
	///
	/// Labels are tried in order, so longer labels should come first.
	pub fn labeled(&self, labels: &[&str]) -> Option<String> {
		for label in labels {
			for (index, line) in self.lines.iter().enumerate() {
				let Some(rest) = strip_label(line, label) else {
					continue;
				};
				let value = rest
					.trim_start_matches(|c: char| c == ':' || c == '=' || c == '-' || c.is_whitespace())
					.trim();
				if !value.is_empty() {
					return Some(value.to_string());
				}
				if let Some(next) = self.lines.get(index + 1) {
					let next = next.trim_start_matches(':').trim();
					if !next.is_empty() {
						return Some(next.to_string());
					}
				}
			}
		}
		None
	}
}

/// Case-insensitive prefix match that stops on a word boundary.
fn strip_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
	let head = line.get(..label.len())?;
	if !head.eq_ignore_ascii_case(label) {
		return None;
	}
	let rest = &line[label.len()..];
	match rest.chars().next() {
		Some(c) if c.is_alphanumeric() => None,
		_ => Some(rest),
	}
}

fn reference_re() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| {
		Regex::new(
			r"(?i)\b(?:no\.?\s*ref(?:erensi)?|nomor\s+referensi|ref(?:erence)?(?:\s*(?:no|number)\.?)?)\s*[:#]?\s*([A-Z0-9\-]*[0-9][A-Z0-9\-]*)",
		)
		.expect("invalid reference regex")
	})
}

fn masked_card_re() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| Regex::new(r"(?:[*xX•]{2,}[\s\-]*)+(\d{4})\b").expect("invalid card regex"))
}

/// Reference number written inline, e.g. `Ref: BMRI12345`.
pub fn inline_reference(text: &str) -> Option<String> {
	reference_re()
		.captures_iter(text)
		.filter_map(|caps| caps.get(1))
		.map(|m| m.as_str().trim_matches('-'))
		.find(|value| value.len() >= 6)
		.map(str::to_string)
}

/// Last four digits of a masked card number such as `**** 1234`.
pub fn masked_card_suffix(text: &str) -> Option<String> {
	masked_card_re()
		.captures(text)
		.and_then(|caps| caps.get(1))
		.map(|m| m.as_str().to_string())
}

/// Keep the account-like part of a value: digits plus masking characters.
pub fn account_value(value: &str) -> Option<String> {
	let cleaned: String = value
		.chars()
		.filter(|c| c.is_ascii_digit() || matches!(c, '*' | 'x' | 'X' | '•'))
		.collect();
	if cleaned.chars().any(|c| c.is_ascii_digit()) {
		Some(cleaned)
	} else {
		None
	}
}

const MONTHS: &[(&str, &str)] = &[
	("januari", "Jan"),
	("februari", "Feb"),
	("pebruari", "Feb"),
	("peb", "Feb"),
	("maret", "Mar"),
	("mei", "May"),
	("juni", "Jun"),
	("juli", "Jul"),
	("agustus", "Aug"),
	("agu", "Aug"),
	("agt", "Aug"),
	("agst", "Aug"),
	("oktober", "Oct"),
	("okt", "Oct"),
	("desember", "Dec"),
	("des", "Dec"),
];

const DROPPED_TOKENS: &[&str] = &["wib", "wita", "wit", "pukul", "jam", "at"];

const DATETIME_FORMATS: &[&str] = &[
	"%d %b %Y %H:%M:%S",
	"%d %b %Y %H:%M",
	"%d/%m/%Y %H:%M:%S",
	"%d/%m/%Y %H:%M",
	"%d-%m-%Y %H:%M:%S",
	"%d-%m-%Y %H:%M",
	"%Y-%m-%d %H:%M:%S",
	"%Y-%m-%d %H:%M",
	"%d %b %Y %H.%M.%S",
	"%d %b %Y %H.%M",
];

const DATE_FORMATS: &[&str] = &["%d %b %Y", "%d/%m/%Y", "%d-%m-%Y", "%Y-%m-%d"];

/// Parse a bank-formatted local timestamp into UTC.
///
/// Indonesian month names are accepted. Date-only values resolve to local
/// midnight.
pub fn parse_local_datetime(value: &str, offset: FixedOffset) -> Option<DateTime<Utc>> {
	let normalized = value
		.replace(',', " ")
		.split_whitespace()
		.filter(|token| !DROPPED_TOKENS.contains(&token.to_ascii_lowercase().as_str()))
		.map(|token| {
			let lower = token.trim_end_matches('.').to_lowercase();
			MONTHS
				.iter()
				.find(|(id, _)| *id == lower)
				.map(|(_, en)| en.to_string())
				.unwrap_or_else(|| token.to_string())
		})
		.collect::<Vec<_>>()
		.join(" ");

	let naive = DATETIME_FORMATS
		.iter()
		.find_map(|fmt| NaiveDateTime::parse_from_str(&normalized, fmt).ok())
		.or_else(|| {
			DATE_FORMATS
				.iter()
				.find_map(|fmt| NaiveDate::parse_from_str(&normalized, fmt).ok())
				.and_then(|date| date.and_hms_opt(0, 0, 0))
		})?;

	offset
		.from_local_datetime(&naive)
		.single()
		.map(|local| local.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn wib() -> FixedOffset {
		FixedOffset::east_opt(7 * 3600).unwrap()
	}

	#[test]
	fn test_labeled_same_line_and_next_line() {
		let text = NotificationText::new(
			"Transfer",
			"Penerima : JOHN DOE\nNominal\nRp150.000,00\nBerita:\n",
		);
		assert_eq!(text.labeled(&["Penerima"]).as_deref(), Some("JOHN DOE"));
		assert_eq!(text.labeled(&["Nominal"]).as_deref(), Some("Rp150.000,00"));
		assert_eq!(text.labeled(&["Berita"]), None);
	}

	#[test]
	fn test_label_requires_word_boundary() {
		let text = NotificationText::new("", "Totalan: 5\nTotal: 10");
		assert_eq!(text.labeled(&["Total"]).as_deref(), Some("10"));
	}

	#[test]
	fn test_inline_reference() {
		assert_eq!(
			inline_reference("Transfer berhasil. Ref: BMRI12345 terima kasih").as_deref(),
			Some("BMRI12345")
		);
		assert_eq!(inline_reference("No. Referensi 20261019ABC").as_deref(), Some("20261019ABC"));
		assert_eq!(inline_reference("nothing"), None);
	}

	#[test]
	fn test_masked_card_suffix() {
		assert_eq!(masked_card_suffix("Kartu **** **** **** 4321 digunakan").as_deref(), Some("4321"));
		assert_eq!(masked_card_suffix("card xxxx-9876").as_deref(), Some("9876"));
	}

	#[test]
	fn test_parse_indonesian_datetime() {
		let parsed = parse_local_datetime("19 Okt 2026 14:30:00 WIB", wib()).unwrap();
		assert_eq!(parsed.to_rfc3339(), "2026-10-19T07:30:00+00:00");

		let parsed = parse_local_datetime("05 Mei 2026", wib()).unwrap();
		assert_eq!(parsed.to_rfc3339(), "2026-05-04T17:00:00+00:00");

		let parsed = parse_local_datetime("19/10/2026 08:00", wib()).unwrap();
		assert_eq!(parsed.to_rfc3339(), "2026-10-19T01:00:00+00:00");

		assert!(parse_local_datetime("kemarin sore", wib()).is_none());
	}
}
