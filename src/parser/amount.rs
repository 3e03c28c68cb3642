//! Locale-aware money parsing.
//!
//! Indonesian banks write `Rp150.000,00` while others use `IDR 150,000.00`.
//! A value whose separator could mean either thousands or decimals is
//! rejected instead of guessed.

use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::OnceLock;

/// Number formatting convention of a bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberLocale {
	/// `.` groups thousands, `,` separates decimals.
	Indonesian,
	/// `,` groups thousands, `.` separates decimals.
	English,
	/// Infer from the value; ambiguous values are rejected.
	#[default]
	Auto,
}

impl NumberLocale {
	fn separators(&self) -> Option<(char, char)> {
		match self {
			NumberLocale::Indonesian => Some(('.', ',')),
			NumberLocale::English => Some((',', '.')),
			NumberLocale::Auto => None,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
	#[error("not a number: {0}")]
	Invalid(String),

	#[error("ambiguous separator in {0}")]
	Ambiguous(String),
}

/// A money value found in text, with the currency marker next to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoneyMatch {
	pub currency: Option<&'static str>,
	pub raw: String,
}

fn money_re() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| {
		Regex::new(r"(?i)(?:^|[^A-Za-z])(Rp\.?|IDR|USD|SGD|\$)\s?([0-9](?:[0-9.,]*[0-9])?(?:,-)?)")
			.expect("invalid money regex")
	})
}

fn bare_number_re() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| Regex::new(r"[0-9](?:[0-9.,]*[0-9])?").expect("invalid number regex"))
}

fn currency_code(marker: &str) -> &'static str {
	let marker = marker.trim_end_matches('.').to_ascii_uppercase();
	match marker.as_str() {
		"RP" | "IDR" => "IDR",
		"USD" | "$" => "USD",
		"SGD" => "SGD",
		_ => "IDR",
	}
}

/// First currency-tagged amount in `text`.
pub fn find_money(text: &str) -> Option<MoneyMatch> {
	money_re().captures(text).map(|caps| MoneyMatch {
		currency: caps.get(1).map(|m| currency_code(m.as_str())),
		raw: caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default(),
	})
}

/// Amount inside a labelled value; the currency marker is optional there.
pub fn find_money_in_value(value: &str) -> Option<MoneyMatch> {
	find_money(value).or_else(|| {
		bare_number_re().find(value).map(|m| MoneyMatch {
			currency: None,
			raw: m.as_str().to_string(),
		})
	})
}

/// Parse a formatted number such as `150.000,00` into a decimal.
pub fn parse_amount(raw: &str, locale: NumberLocale) -> Result<Decimal, AmountError> {
	let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
	let value = compact
		.strip_suffix(",-")
		.or_else(|| compact.strip_suffix(".-"))
		.unwrap_or(&compact);

	let invalid = || AmountError::Invalid(raw.to_string());
	let ambiguous = || AmountError::Ambiguous(raw.to_string());

	if value.is_empty()
		|| !value.starts_with(|c: char| c.is_ascii_digit())
		|| !value.ends_with(|c: char| c.is_ascii_digit())
		|| !value.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ',')
	{
		return Err(invalid());
	}

	let dots = value.matches('.').count();
	let commas = value.matches(',').count();

	let (integer, fraction): (String, &str) = if dots == 0 && commas == 0 {
		(value.to_string(), "")
	} else if dots > 0 && commas > 0 {
		let last_dot = value.rfind('.').unwrap_or(0);
		let last_comma = value.rfind(',').unwrap_or(0);
		let (decimal_sep, group_sep) = if last_comma > last_dot { (',', '.') } else { ('.', ',') };
		if value.matches(decimal_sep).count() != 1 {
			return Err(invalid());
		}
		let (int_part, frac_part) = value.split_once(decimal_sep).ok_or_else(invalid)?;
		(strip_groups(int_part, group_sep).ok_or_else(invalid)?, frac_part)
	} else {
		let sep = if dots > 0 { '.' } else { ',' };
		let occurrences = dots + commas;
		if occurrences > 1 {
			(strip_groups(value, sep).ok_or_else(invalid)?, "")
		} else {
			let (int_part, after) = value.split_once(sep).ok_or_else(invalid)?;
			match locale.separators() {
				None => match after.len() {
					3 => return Err(ambiguous()),
					1 | 2 => (int_part.to_string(), after),
					_ => return Err(invalid()),
				},
				Some((group_sep, _)) if sep == group_sep => {
					if after.len() != 3 {
						return Err(ambiguous());
					}
					(strip_groups(value, sep).ok_or_else(invalid)?, "")
				}
				Some(_) => match after.len() {
					1 | 2 => (int_part.to_string(), after),
					3 => return Err(ambiguous()),
					_ => return Err(invalid()),
				},
			}
		}
	};

	if fraction.len() > 2 {
		return Err(ambiguous());
	}

	let literal = if fraction.is_empty() {
		integer
	} else {
		format!("{integer}.{fraction}")
	};
	Decimal::from_str(&literal).map_err(|_| invalid())
}

/// Remove thousands separators after checking the groups are well formed.
fn strip_groups(value: &str, sep: char) -> Option<String> {
	let mut groups = value.split(sep);
	let head = groups.next()?;
	if head.is_empty() || head.len() > 3 {
		return None;
	}
	let mut out = head.to_string();
	for group in groups {
		if group.len() != 3 {
			return None;
		}
		out.push_str(group);
	}
	Some(out)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn dec(value: &str) -> Decimal {
		value.parse().unwrap()
	}

	#[test]
	fn test_indonesian_formats() {
		let l = NumberLocale::Indonesian;
		assert_eq!(parse_amount("150.000,00", l).unwrap(), dec("150000.00"));
		assert_eq!(parse_amount("1.250.000", l).unwrap(), dec("1250000"));
		assert_eq!(parse_amount("150.000", l).unwrap(), dec("150000"));
		assert_eq!(parse_amount("2.500,-", l).unwrap(), dec("2500"));
		assert_eq!(parse_amount("7,5", l).unwrap(), dec("7.5"));
	}

	#[test]
	fn test_english_formats() {
		let l = NumberLocale::English;
		assert_eq!(parse_amount("150,000.00", l).unwrap(), dec("150000.00"));
		assert_eq!(parse_amount("1,250,000", l).unwrap(), dec("1250000"));
		assert_eq!(parse_amount("150,000", l).unwrap(), dec("150000"));
		assert_eq!(parse_amount("12.34", l).unwrap(), dec("12.34"));
	}

	#[test]
	fn test_auto_locale_resolves_when_unambiguous() {
		let l = NumberLocale::Auto;
		assert_eq!(parse_amount("150.000,00", l).unwrap(), dec("150000.00"));
		assert_eq!(parse_amount("150,000.00", l).unwrap(), dec("150000.00"));
		assert_eq!(parse_amount("1.000.000", l).unwrap(), dec("1000000"));
		assert_eq!(parse_amount("99,50", l).unwrap(), dec("99.50"));
	}

	#[test]
	fn test_ambiguous_values_are_rejected() {
		assert!(matches!(parse_amount("150.000", NumberLocale::Auto), Err(AmountError::Ambiguous(_))));
		assert!(matches!(parse_amount("150,000", NumberLocale::Auto), Err(AmountError::Ambiguous(_))));
		assert!(matches!(parse_amount("150,000", NumberLocale::Indonesian), Err(AmountError::Ambiguous(_))));
		assert!(matches!(parse_amount("10.5", NumberLocale::Indonesian), Err(AmountError::Ambiguous(_))));
	}

	#[test]
	fn test_malformed_values() {
		assert!(parse_amount("", NumberLocale::Auto).is_err());
		assert!(parse_amount("1.2.3,4,5", NumberLocale::Auto).is_err());
		assert!(parse_amount("15.00.000", NumberLocale::Indonesian).is_err());
		assert!(parse_amount("abc", NumberLocale::Auto).is_err());
	}

	#[test]
	fn test_find_money_markers() {
		let m = find_money("Nominal: Rp150.000,00 berhasil").unwrap();
		assert_eq!(m.currency, Some("IDR"));
		assert_eq!(m.raw, "150.000,00");

		let m = find_money("Amount IDR 1,250,000.00").unwrap();
		assert_eq!(m.currency, Some("IDR"));
		assert_eq!(m.raw, "1,250,000.00");

		let m = find_money("charged USD 12.50 at store").unwrap();
		assert_eq!(m.currency, Some("USD"));

		assert!(find_money("no money here 12345").is_none());
		assert_eq!(find_money_in_value("150.000").unwrap().raw, "150.000");
	}
}
