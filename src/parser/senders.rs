//! Allow-list of bank senders.
//!
//! A notification is only considered when its `From` header belongs to one of
//! the configured banks. The same directory normalizes free-text bank names
//! ("Bank Mandiri", "PT BANK CENTRAL ASIA TBK") into bank codes so the
//! reconciler can compare them with wallet bank codes.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;

use super::amount::NumberLocale;

/// One bank whose notifications are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankSender {
	pub bank_code: String,
	pub display_name: String,
	/// Sender domains; subdomains match too.
	#[serde(default)]
	pub domains: Vec<String>,
	/// Case-insensitive fragments of the sender display name.
	#[serde(default)]
	pub names: Vec<String>,
	/// Other spellings of the bank used inside message bodies.
	#[serde(default)]
	pub aliases: Vec<String>,
	#[serde(default)]
	pub number_locale: NumberLocale,
}

#[derive(Debug, Clone, Default)]
pub struct SenderDirectory {
	banks: Vec<BankSender>,
}

fn address_re() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| Regex::new(r"<\s*([^<>\s]+@[^<>\s]+)\s*>").expect("invalid address regex"))
}

impl SenderDirectory {
	pub fn new(banks: Vec<BankSender>) -> Self {
		Self { banks }
	}

	/// Load an allow-list from a JSON array of [`BankSender`].
	pub fn from_json_file(path: &Path) -> Result<Self, std::io::Error> {
		let content = std::fs::read_to_string(path)?;
		let banks: Vec<BankSender> = serde_json::from_str(&content)
			.map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
		Ok(Self::new(banks))
	}

	pub fn banks(&self) -> &[BankSender] {
		&self.banks
	}

	/// Find the bank a `From` header belongs to.
	pub fn identify(&self, sender: &str) -> Option<&BankSender> {
		let (display_name, address) = split_sender(sender);
		let domain = address
			.rsplit_once('@')
			.map(|(_, domain)| domain.trim().to_ascii_lowercase());
		let display_lower = display_name.to_lowercase();

		self.banks.iter().find(|bank| {
			let domain_hit = domain.as_deref().is_some_and(|domain| {
				bank.domains.iter().any(|allowed| {
					let allowed = allowed.to_ascii_lowercase();
					domain == allowed || domain.ends_with(&format!(".{allowed}"))
				})
			});
			let name_hit = !display_lower.is_empty()
				&& bank
					.names
					.iter()
					.any(|name| display_lower.contains(&name.to_lowercase()));
			domain_hit || name_hit
		})
	}

	/// Map a bank name found in a message body to a bank code.
	///
	/// Unknown names are returned lower-cased and trimmed.
	pub fn normalize_bank(&self, name: &str) -> String {
		let lower = name.trim().to_lowercase();
		let tokens: Vec<&str> = lower
			.split(|c: char| !c.is_alphanumeric())
			.filter(|t| !t.is_empty())
			.collect();

		for bank in &self.banks {
			if lower == bank.bank_code.to_lowercase() {
				return bank.bank_code.clone();
			}
			let hit = bank.aliases.iter().chain(std::iter::once(&bank.bank_code)).any(|alias| {
				let alias = alias.to_lowercase();
				if alias.contains(' ') {
					lower.contains(&alias)
				} else {
					tokens.contains(&alias.as_str())
				}
			});
			if hit {
				return bank.bank_code.clone();
			}
		}
		lower
	}
}

/// Split `Name <addr@host>` into its display name and address parts.
fn split_sender(sender: &str) -> (String, String) {
	if let Some(caps) = address_re().captures(sender) {
		let address = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
		let start = caps.get(0).map(|m| m.start()).unwrap_or(0);
		let name = sender[..start].trim().trim_matches('"').trim().to_string();
		return (name, address.to_string());
	}
	let trimmed = sender.trim();
	if trimmed.contains('@') {
		(String::new(), trimmed.to_string())
	} else {
		(trimmed.to_string(), String::new())
	}
}

/// Built-in catalog of Indonesian retail banks.
pub fn default_bank_senders() -> Vec<BankSender> {
	fn bank(
		code: &str,
		display: &str,
		domains: &[&str],
		names: &[&str],
		aliases: &[&str],
		locale: NumberLocale,
	) -> BankSender {
		BankSender {
			bank_code: code.to_string(),
			display_name: display.to_string(),
			domains: domains.iter().map(|s| s.to_string()).collect(),
			names: names.iter().map(|s| s.to_string()).collect(),
			aliases: aliases.iter().map(|s| s.to_string()).collect(),
			number_locale: locale,
		}
	}

	vec![
		bank(
			"mandiri",
			"Bank Mandiri",
			&["bankmandiri.co.id"],
			&["livin' by mandiri", "bank mandiri"],
			&["bank mandiri", "mandiri", "bmri", "livin"],
			NumberLocale::Indonesian,
		),
		bank(
			"bca",
			"Bank Central Asia",
			&["bca.co.id", "klikbca.com"],
			&["bank central asia", "mybca"],
			&["bank central asia", "bca", "cenaidja"],
			NumberLocale::English,
		),
		bank(
			"bni",
			"Bank Negara Indonesia",
			&["bni.co.id"],
			&["bni mobile", "bank negara indonesia"],
			&["bank negara indonesia", "bni", "bnin"],
			NumberLocale::Indonesian,
		),
		bank(
			"bri",
			"Bank Rakyat Indonesia",
			&["bri.co.id"],
			&["brimo", "bank rakyat indonesia"],
			&["bank rakyat indonesia", "bri", "brimo", "bbri"],
			NumberLocale::Indonesian,
		),
		bank(
			"jago",
			"Bank Jago",
			&["jago.com"],
			&["bank jago"],
			&["bank jago", "jago"],
			NumberLocale::Indonesian,
		),
	]
}

#[cfg(test)]
mod tests {
	use super::*;

	fn directory() -> SenderDirectory {
		SenderDirectory::new(default_bank_senders())
	}

	#[test]
	fn test_identify_by_domain_and_subdomain() {
		let dir = directory();
		let bank = dir.identify("Livin' by Mandiri <noreply.livin@bankmandiri.co.id>").unwrap();
		assert_eq!(bank.bank_code, "mandiri");
		let bank = dir.identify("bca@notification.klikbca.com").unwrap();
		assert_eq!(bank.bank_code, "bca");
	}

	#[test]
	fn test_identify_rejects_lookalike_domain() {
		let dir = directory();
		assert!(dir.identify("Promo <deals@notbankmandiri.co.id.example.com>").is_none());
		assert!(dir.identify("Friend <friend@gmail.com>").is_none());
	}

	#[test]
	fn test_identify_by_display_name() {
		let dir = directory();
		let bank = dir.identify("\"BRImo\" <alerts@mailer.example.net>").unwrap();
		assert_eq!(bank.bank_code, "bri");
	}

	#[test]
	fn test_normalize_bank_names() {
		let dir = directory();
		assert_eq!(dir.normalize_bank("PT BANK CENTRAL ASIA TBK"), "bca");
		assert_eq!(dir.normalize_bank("Bank Mandiri"), "mandiri");
		assert_eq!(dir.normalize_bank("BNI"), "bni");
		assert_eq!(dir.normalize_bank("  BankX "), "bankx");
	}
}
