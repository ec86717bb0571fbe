//! Mailgun REST client
//!
//! Only the two calls the transport needs are covered: the domain
//! connection check and raw MIME submission.

use crate::error::{TransportError, TransportResult};
use crate::settings::MailgunSettings;
use async_trait::async_trait;
use reqwest::{Client, multipart};
use serde::Deserialize;

/// Connection settings Mailgun reports for a sending domain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ConnectionSettings {
	#[serde(default)]
	pub require_tls: bool,
	#[serde(default)]
	pub skip_verification: bool,
}

#[derive(Debug, Deserialize)]
struct ConnectionResponse {
	connection: ConnectionSettings,
}

/// Mailgun's answer to a send call.
///
/// `id` is `None` when the provider did not accept the message; `message`
/// then carries the response body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SendResponse {
	#[serde(default)]
	pub id: Option<String>,
	#[serde(default)]
	pub message: String,
}

/// Calls the Mailgun transport makes against the provider.
#[async_trait]
pub trait MailgunApi: Send + Sync {
	/// Fetch the connection settings of `domain`; fails when the domain is
	/// unknown or the key is rejected.
	async fn check_connection(&self, domain: &str) -> TransportResult<ConnectionSettings>;

	/// Submit a pre-rendered MIME message for delivery to `recipients`.
	async fn send_mime(
		&self,
		domain: &str,
		recipients: &[String],
		mime: Vec<u8>,
	) -> TransportResult<SendResponse>;
}

/// [`MailgunApi`] over HTTPS with basic auth `api:<key>`.
pub struct HttpMailgunClient {
	settings: MailgunSettings,
	client: Client,
}

impl HttpMailgunClient {
	pub fn new(settings: MailgunSettings) -> TransportResult<Self> {
		let client = Client::builder().timeout(settings.timeout()).build()?;
		Ok(Self::with_client(settings, client))
	}

	pub fn with_client(settings: MailgunSettings, client: Client) -> Self {
		Self { settings, client }
	}

	fn build_url(&self, path: &str) -> String {
		format!("{}/v3/{}", self.settings.endpoint.trim_end_matches('/'), path)
	}

	fn build_form(recipients: &[String], mime: Vec<u8>) -> TransportResult<multipart::Form> {
		let mut form = multipart::Form::new();

		for recipient in recipients {
			form = form.text("to", recipient.clone());
		}

		let part = multipart::Part::bytes(mime)
			.file_name("message")
			.mime_str("message/rfc822")
			.map_err(|e| TransportError::Message(format!("Failed to set MIME type: {}", e)))?;

		Ok(form.part("message", part))
	}
}

#[async_trait]
impl MailgunApi for HttpMailgunClient {
	async fn check_connection(&self, domain: &str) -> TransportResult<ConnectionSettings> {
		let url = self.build_url(&format!("domains/{}/connection", domain));
		tracing::debug!(%url, "checking Mailgun domain connection");

		let response = self
			.client
			.get(&url)
			.basic_auth("api", Some(self.settings.api_key.expose()))
			.send()
			.await?;

		if !response.status().is_success() {
			let status = response.status().as_u16();
			let body = response
				.text()
				.await
				.unwrap_or_else(|_| "Unknown error".to_string());
			return Err(TransportError::Api { status, body });
		}

		let parsed: ConnectionResponse = response.json().await?;
		Ok(parsed.connection)
	}

	async fn send_mime(
		&self,
		domain: &str,
		recipients: &[String],
		mime: Vec<u8>,
	) -> TransportResult<SendResponse> {
		let url = self.build_url(&format!("{}/messages.mime", domain));
		let form = Self::build_form(recipients, mime)?;
		tracing::debug!(%url, recipients = recipients.len(), "submitting MIME message");

		let response = self
			.client
			.post(&url)
			.basic_auth("api", Some(self.settings.api_key.expose()))
			.multipart(form)
			.send()
			.await?;

		let status = response.status();
		if !status.is_success() {
			let body = response
				.text()
				.await
				.unwrap_or_else(|_| "Unknown error".to_string());
			tracing::warn!(status = status.as_u16(), %body, "Mailgun rejected message");
			return Ok(SendResponse {
				id: None,
				message: body,
			});
		}

		Ok(response.json().await?)
	}
}
