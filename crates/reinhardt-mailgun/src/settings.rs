//! Mailgun configuration
//!
//! Settings can be built in code, read from `MAILGUN_*` environment
//! variables, or loaded from TOML:
//!
//! ```toml
//! [mailgun]
//! api_key = "key-3ax6xnjp29jd6fds4gc373sgvjxteol0"
//! domain = "mg.example.com"
//! region = "eu"
//! timeout = 10
//! ```

use crate::error::{TransportError, TransportResult};
use serde::{Deserialize, Deserializer};
use std::env;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use zeroize::Zeroizing;

pub const DEFAULT_ENDPOINT: &str = "https://api.mailgun.net";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Mailgun API region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailgunRegion {
	/// US region (api.mailgun.net)
	Us,
	/// EU region (api.eu.mailgun.net)
	Eu,
}

impl MailgunRegion {
	pub fn endpoint(&self) -> &'static str {
		match self {
			MailgunRegion::Us => DEFAULT_ENDPOINT,
			MailgunRegion::Eu => "https://api.eu.mailgun.net",
		}
	}
}

impl std::str::FromStr for MailgunRegion {
	type Err = TransportError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"us" => Ok(MailgunRegion::Us),
			"eu" => Ok(MailgunRegion::Eu),
			other => Err(TransportError::Configuration(format!(
				"Unknown Mailgun region '{}', expected 'us' or 'eu'",
				other
			))),
		}
	}
}

/// Mailgun API key, wiped from memory on drop and never printed.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ApiKey(Zeroizing<String>);

impl ApiKey {
	pub fn new(key: impl Into<String>) -> Self {
		Self(Zeroizing::new(key.into()))
	}

	pub fn expose(&self) -> &str {
		self.0.as_str()
	}

	pub fn is_empty(&self) -> bool {
		self.0.trim().is_empty()
	}
}

impl fmt::Debug for ApiKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("ApiKey(***)")
	}
}

impl From<&str> for ApiKey {
	fn from(key: &str) -> Self {
		Self::new(key)
	}
}

impl From<String> for ApiKey {
	fn from(key: String) -> Self {
		Self::new(key)
	}
}

impl<'de> Deserialize<'de> for ApiKey {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		String::deserialize(deserializer).map(ApiKey::new)
	}
}

/// Configuration bag owned by a Mailgun transport.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MailgunSettings {
	pub api_key: ApiKey,

	/// Sending domain registered with Mailgun
	pub domain: String,

	/// API base URL; `region` overrides it when set
	#[serde(default = "default_endpoint")]
	pub endpoint: String,

	/// Request timeout, written as (possibly fractional) seconds
	#[serde(default = "default_timeout", deserialize_with = "deserialize_seconds")]
	pub timeout: Duration,
}

#[derive(Deserialize)]
struct RawSettings {
	#[serde(flatten)]
	settings: MailgunSettings,
	#[serde(default)]
	region: Option<MailgunRegion>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SettingsFile {
	Table { mailgun: RawSettings },
	Flat(RawSettings),
}

fn default_endpoint() -> String {
	DEFAULT_ENDPOINT.to_string()
}

fn default_timeout() -> Duration {
	Duration::from_secs(DEFAULT_TIMEOUT_SECS)
}

fn parse_seconds(secs: f64) -> Option<Duration> {
	Duration::try_from_secs_f64(secs).ok()
}

fn deserialize_seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
	let secs = f64::deserialize(deserializer)?;
	parse_seconds(secs).ok_or_else(|| {
		serde::de::Error::custom(format!(
			"timeout must be a non-negative number of seconds, got {}",
			secs
		))
	})
}

impl MailgunSettings {
	/// Create settings for the US endpoint.
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_mailgun::MailgunSettings;
	///
	/// let settings = MailgunSettings::new("key-123", "mg.example.com");
	/// assert_eq!(settings.endpoint, "https://api.mailgun.net");
	/// assert!(settings.validate().is_ok());
	/// ```
	pub fn new(api_key: impl Into<ApiKey>, domain: impl Into<String>) -> Self {
		Self {
			api_key: api_key.into(),
			domain: domain.into(),
			endpoint: default_endpoint(),
			timeout: default_timeout(),
		}
	}

	pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
		self.endpoint = endpoint.into();
		self
	}

	pub fn with_region(mut self, region: MailgunRegion) -> Self {
		self.endpoint = region.endpoint().to_string();
		self
	}

	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;
		self
	}

	pub fn timeout(&self) -> Duration {
		self.timeout
	}

	/// Read settings from the environment.
	///
	/// `MAILGUN_API_KEY` and `MAILGUN_DOMAIN` are required; `MAILGUN_ENDPOINT`,
	/// `MAILGUN_REGION` and `MAILGUN_TIMEOUT` are optional. The region wins
	/// over an explicit endpoint.
	pub fn from_env() -> TransportResult<Self> {
		let api_key = required_var("MAILGUN_API_KEY")?;
		let domain = required_var("MAILGUN_DOMAIN")?;
		let mut settings = Self::new(api_key, domain);

		if let Ok(endpoint) = env::var("MAILGUN_ENDPOINT") {
			settings.endpoint = endpoint;
		}
		if let Ok(region) = env::var("MAILGUN_REGION") {
			settings = settings.with_region(region.parse()?);
		}
		if let Ok(timeout) = env::var("MAILGUN_TIMEOUT") {
			settings.timeout = timeout
				.trim()
				.parse::<f64>()
				.ok()
				.and_then(parse_seconds)
				.ok_or_else(|| {
					TransportError::Configuration(format!(
						"MAILGUN_TIMEOUT must be a number of seconds, got '{}'",
						timeout
					))
				})?;
		}

		Ok(settings)
	}

	/// Parse settings from TOML, either top-level keys or a `[mailgun]` table.
	pub fn from_toml_str(content: &str) -> TransportResult<Self> {
		let file: SettingsFile = toml::from_str(content)
			.map_err(|e| TransportError::Configuration(format!("Invalid settings: {}", e)))?;

		let raw = match file {
			SettingsFile::Table { mailgun } => mailgun,
			SettingsFile::Flat(raw) => raw,
		};

		Ok(match raw.region {
			Some(region) => raw.settings.with_region(region),
			None => raw.settings,
		})
	}

	pub fn from_file(path: impl AsRef<Path>) -> TransportResult<Self> {
		let path = path.as_ref();
		let content = std::fs::read_to_string(path).map_err(|e| {
			TransportError::Configuration(format!(
				"Failed to read settings file {}: {}",
				path.display(),
				e
			))
		})?;
		Self::from_toml_str(&content)
	}

	/// Check the settings are usable for API calls.
	pub fn validate(&self) -> TransportResult<()> {
		if self.api_key.is_empty() {
			return Err(TransportError::Configuration(
				"API key must not be empty".to_string(),
			));
		}

		if self.domain.trim().is_empty() {
			return Err(TransportError::Configuration(
				"Sending domain must not be empty".to_string(),
			));
		}

		// The domain is interpolated into request paths.
		if let Some(c) = self.domain.chars().find(|&c| {
			matches!(c, '/' | '?' | '#' | '%' | '\\') || c.is_whitespace() || c.is_control()
		}) {
			return Err(TransportError::Configuration(format!(
				"Sending domain '{}' contains invalid character {:?}",
				self.domain, c
			)));
		}

		if self.timeout.is_zero() {
			return Err(TransportError::Configuration(
				"Timeout must be greater than zero".to_string(),
			));
		}

		let url = url::Url::parse(&self.endpoint).map_err(|e| {
			TransportError::Configuration(format!("Invalid endpoint '{}': {}", self.endpoint, e))
		})?;
		if url.scheme() != "http" && url.scheme() != "https" {
			return Err(TransportError::Configuration(format!(
				"Endpoint must use http or https, got '{}'",
				url.scheme()
			)));
		}

		Ok(())
	}
}

fn required_var(name: &str) -> TransportResult<String> {
	env::var(name)
		.map_err(|_| TransportError::Configuration(format!("{} is not set", name)))
}
