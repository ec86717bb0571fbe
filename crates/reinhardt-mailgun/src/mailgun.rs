//! Mailgun transport
//!
//! Sends pre-rendered MIME messages through Mailgun's `messages.mime`
//! endpoint.
//!
//! # Examples
//!
//! ```no_run
//! use reinhardt_mailgun::{EmailMessage, MailgunSettings, MailgunTransport, Transport};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut transport = MailgunTransport::new(MailgunSettings::new(
//!     "your-api-key",
//!     "mg.your-domain.com",
//! ));
//!
//! let mut message = EmailMessage::builder()
//!     .from("sender@your-domain.com")
//!     .to("recipient@example.com")
//!     .subject("Test")
//!     .body("Hello!")
//!     .build()?;
//!
//! let report = transport.send(&mut message).await?;
//! assert_eq!(report.sent, 1);
//! println!("queued as {}", message.id());
//! # Ok(())
//! # }
//! ```

use crate::client::{HttpMailgunClient, MailgunApi, SendResponse};
use crate::error::{TransportError, TransportResult};
use crate::events::{BubbleEvent, EventDispatcher, SendEvent, SendResult, TransportChangeEvent};
use crate::message::EmailMessage;
use crate::settings::{ApiKey, MailgunSettings};
use crate::transport::{SendReport, Transport, TransportCore};
use async_trait::async_trait;
use std::sync::Arc;

/// Name reported on every event raised by [`MailgunTransport`].
pub const TRANSPORT_NAME: &str = "mailgun";

/// Transport delivering through the Mailgun HTTP API.
///
/// The API client is rebuilt on every [`start`](Transport::start), so
/// configuration changes made through the setters apply from the next start.
pub struct MailgunTransport {
	core: TransportCore,
	settings: MailgunSettings,
	injected: Option<Arc<dyn MailgunApi>>,
	api: Option<Arc<dyn MailgunApi>>,
}

impl MailgunTransport {
	pub fn new(settings: MailgunSettings) -> Self {
		Self::with_dispatcher(settings, EventDispatcher::new())
	}

	/// Create a transport sharing an existing dispatcher.
	pub fn with_dispatcher(settings: MailgunSettings, dispatcher: EventDispatcher) -> Self {
		Self {
			core: TransportCore::new(TRANSPORT_NAME, dispatcher),
			settings,
			injected: None,
			api: None,
		}
	}

	/// Create a transport that talks to `api` instead of building an HTTP client.
	pub fn with_client(settings: MailgunSettings, api: Arc<dyn MailgunApi>) -> Self {
		let mut transport = Self::new(settings);
		transport.injected = Some(api);
		transport
	}

	pub fn settings(&self) -> &MailgunSettings {
		&self.settings
	}

	pub fn set_api_key(&mut self, key: impl Into<ApiKey>) {
		self.settings.api_key = key.into();
	}

	pub fn set_endpoint(&mut self, endpoint: impl Into<String>) {
		self.settings.endpoint = endpoint.into();
	}

	pub fn endpoint(&self) -> &str {
		&self.settings.endpoint
	}

	pub fn set_domain(&mut self, domain: impl Into<String>) {
		self.settings.domain = domain.into();
	}

	pub fn domain(&self) -> &str {
		&self.settings.domain
	}

	fn build_api(&self) -> TransportResult<Arc<dyn MailgunApi>> {
		match &self.injected {
			Some(api) => Ok(Arc::clone(api)),
			None => Ok(Arc::new(HttpMailgunClient::new(self.settings.clone())?)),
		}
	}

	async fn deliver(
		&self,
		message: &EmailMessage,
		recipients: &[String],
	) -> TransportResult<SendResponse> {
		let api = self.api.as_ref().ok_or(TransportError::NotStarted)?;
		let mime = message.to_mime()?;
		api.send_mime(&self.settings.domain, recipients, mime).await
	}
}

#[async_trait]
impl Transport for MailgunTransport {
	fn core(&self) -> &TransportCore {
		&self.core
	}

	fn core_mut(&mut self) -> &mut TransportCore {
		&mut self.core
	}

	async fn start(&mut self) -> TransportResult<()> {
		if self.core.is_started() {
			return Ok(());
		}

		let mut event = TransportChangeEvent::new(TRANSPORT_NAME);
		self.core.dispatcher().before_transport_started(&mut event);
		if event.bubble_cancelled() {
			tracing::debug!(transport = TRANSPORT_NAME, "start cancelled by listener");
			return Ok(());
		}

		self.settings.validate()?;
		let api = self.build_api()?;
		self.api = Some(Arc::clone(&api));

		if let Err(e) = api.check_connection(&self.settings.domain).await {
			tracing::debug!(domain = %self.settings.domain, error = %e, "connection check failed");
			self.core
				.throw_exception(TransportError::ConnectionFailed(e.to_string()))?;
		}

		self.core.dispatcher().transport_started(&mut event);
		self.core.set_started(true);
		tracing::debug!(domain = %self.settings.domain, "Mailgun transport started");

		Ok(())
	}

	async fn send(&mut self, message: &mut EmailMessage) -> TransportResult<SendReport> {
		if !self.is_started() {
			self.start().await?;
		}

		let mut report = SendReport::default();

		let mut event = SendEvent::new(TRANSPORT_NAME, message);
		self.core.dispatcher().before_send_performed(&mut event);
		if event.bubble_cancelled() {
			tracing::debug!(message_id = %event.message().id(), "send cancelled by listener");
			return Ok(report);
		}

		if event.message().reverse_path().is_none() {
			self.core.throw_exception(TransportError::MissingSender)?;
		}

		let recipients = event.message().recipients();
		if recipients.is_empty() {
			self.core.throw_exception(TransportError::MissingRecipient)?;
		}

		let response = match self.deliver(event.message(), &recipients).await {
			Ok(response) => response,
			Err(e) => {
				self.core.throw_exception(e)?;
				SendResponse::default()
			}
		};

		match response.id {
			Some(id) => {
				report.sent += 1;
				event.message_mut().set_id(&id);
				event.set_result(SendResult::Success);
				tracing::info!(
					message_id = %event.message().id(),
					recipients = recipients.len(),
					"message accepted by Mailgun"
				);
			}
			None => {
				let previous = event.message().id().to_string();
				event.message_mut().generate_id();
				event.set_result(SendResult::Failed);
				event.set_failed_recipients(recipients.clone());
				report.failed_recipients = recipients;
				tracing::warn!(
					message_id = %previous,
					reason = %response.message,
					"message not accepted by Mailgun"
				);
			}
		}

		self.core.dispatcher().send_performed(&mut event);

		Ok(report)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::client::ConnectionSettings;
	use crate::events::{EventListener, TransportExceptionEvent};
	use parking_lot::Mutex;
	use rstest::{fixture, rstest};

	/// In-memory stand-in for the Mailgun API.
	#[derive(Default)]
	struct FakeApi {
		connection_error: bool,
		reply_id: Option<String>,
		checks: Mutex<Vec<String>>,
		sent: Mutex<Vec<(String, Vec<String>, Vec<u8>)>>,
	}

	impl FakeApi {
		fn accepting(id: &str) -> Arc<Self> {
			Arc::new(Self {
				reply_id: Some(id.to_string()),
				..Default::default()
			})
		}

		fn rejecting() -> Arc<Self> {
			Arc::new(Self::default())
		}
	}

	#[async_trait]
	impl MailgunApi for FakeApi {
		async fn check_connection(&self, domain: &str) -> TransportResult<ConnectionSettings> {
			self.checks.lock().push(domain.to_string());
			if self.connection_error {
				return Err(TransportError::Api {
					status: 404,
					body: "Domain not found".to_string(),
				});
			}
			Ok(ConnectionSettings::default())
		}

		async fn send_mime(
			&self,
			domain: &str,
			recipients: &[String],
			mime: Vec<u8>,
		) -> TransportResult<SendResponse> {
			self.sent
				.lock()
				.push((domain.to_string(), recipients.to_vec(), mime));
			Ok(SendResponse {
				id: self.reply_id.clone(),
				message: match self.reply_id {
					Some(_) => "Queued. Thank you.".to_string(),
					None => "Rejected".to_string(),
				},
			})
		}
	}

	#[derive(Default)]
	struct Recorder {
		events: Mutex<Vec<String>>,
		failed: Mutex<Vec<String>>,
		cancel_start: bool,
		cancel_send: bool,
		suppress_errors: bool,
	}

	impl EventListener for Recorder {
		fn before_transport_started(&self, event: &mut TransportChangeEvent) {
			self.events.lock().push("before_started".to_string());
			if self.cancel_start {
				event.cancel_bubble();
			}
		}

		fn transport_started(&self, _event: &mut TransportChangeEvent) {
			self.events.lock().push("started".to_string());
		}

		fn before_send_performed(&self, event: &mut SendEvent<'_>) {
			self.events.lock().push("before_send".to_string());
			if self.cancel_send {
				event.cancel_bubble();
			}
		}

		fn send_performed(&self, event: &mut SendEvent<'_>) {
			self.events.lock().push(format!("sent:{}", event.result()));
			*self.failed.lock() = event.failed_recipients().to_vec();
		}

		fn exception_thrown(&self, event: &mut TransportExceptionEvent<'_>) {
			self.events.lock().push(format!("exception:{}", event.error()));
			if self.suppress_errors {
				event.cancel_bubble();
			}
		}
	}

	#[fixture]
	fn settings() -> MailgunSettings {
		MailgunSettings::new("key-test", "mg.example.com")
	}

	fn message() -> EmailMessage {
		EmailMessage::builder()
			.from("alice@example.com")
			.to("bob@example.com")
			.cc("carol@example.com")
			.subject("Hello")
			.body("Hi")
			.build()
			.unwrap()
	}

	#[rstest]
	#[tokio::test]
	async fn test_start_checks_connection_and_fires_events(settings: MailgunSettings) {
		// Arrange
		let api = FakeApi::accepting("<1@mg.example.com>");
		let mut transport = MailgunTransport::with_client(settings, api.clone());
		let recorder = Arc::new(Recorder::default());
		transport.register_plugin(recorder.clone());

		// Act
		transport.start().await.unwrap();

		// Assert
		assert!(transport.is_started());
		assert_eq!(*api.checks.lock(), vec!["mg.example.com"]);
		assert_eq!(*recorder.events.lock(), vec!["before_started", "started"]);
	}

	#[rstest]
	#[tokio::test]
	async fn test_start_twice_checks_once(settings: MailgunSettings) {
		// Arrange
		let api = FakeApi::accepting("<1@mg.example.com>");
		let mut transport = MailgunTransport::with_client(settings, api.clone());

		// Act
		transport.start().await.unwrap();
		transport.start().await.unwrap();

		// Assert
		assert_eq!(api.checks.lock().len(), 1);
	}

	#[rstest]
	#[tokio::test]
	async fn test_start_cancelled_by_listener(settings: MailgunSettings) {
		// Arrange
		let api = FakeApi::accepting("<1@mg.example.com>");
		let mut transport = MailgunTransport::with_client(settings, api.clone());
		transport.register_plugin(Arc::new(Recorder {
			cancel_start: true,
			..Default::default()
		}));

		// Act
		transport.start().await.unwrap();

		// Assert
		assert!(!transport.is_started());
		assert!(api.checks.lock().is_empty());
	}

	#[rstest]
	#[tokio::test]
	async fn test_start_connection_failure(settings: MailgunSettings) {
		// Arrange
		let api = Arc::new(FakeApi {
			connection_error: true,
			..Default::default()
		});
		let mut transport = MailgunTransport::with_client(settings, api);
		let recorder = Arc::new(Recorder::default());
		transport.register_plugin(recorder.clone());

		// Act
		let result = transport.start().await;

		// Assert
		assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
		assert!(!transport.is_started());
		let events = recorder.events.lock();
		assert_eq!(events.len(), 2);
		assert!(events[1].starts_with("exception:Connection failed"));
	}

	#[rstest]
	#[tokio::test]
	async fn test_start_connection_failure_suppressed(settings: MailgunSettings) {
		// Arrange
		let api = Arc::new(FakeApi {
			connection_error: true,
			..Default::default()
		});
		let mut transport = MailgunTransport::with_client(settings, api);
		transport.register_plugin(Arc::new(Recorder {
			suppress_errors: true,
			..Default::default()
		}));

		// Act
		let result = transport.start().await;

		// Assert
		assert!(result.is_ok());
		assert!(transport.is_started());
	}

	#[rstest]
	#[tokio::test]
	async fn test_start_rejects_invalid_settings() {
		// Arrange
		let api = FakeApi::accepting("<1@mg.example.com>");
		let mut transport =
			MailgunTransport::with_client(MailgunSettings::new("key", ""), api.clone());

		// Act
		let result = transport.start().await;

		// Assert
		assert!(matches!(result, Err(TransportError::Configuration(_))));
		assert!(api.checks.lock().is_empty());
	}

	#[rstest]
	#[tokio::test]
	async fn test_send_without_sender_fails(settings: MailgunSettings) {
		// Arrange
		let api = FakeApi::accepting("<1@mg.example.com>");
		let mut transport = MailgunTransport::with_client(settings, api.clone());
		let mut message = EmailMessage::builder().to("bob@example.com").build().unwrap();

		// Act
		let result = transport.send(&mut message).await;

		// Assert
		match result {
			Err(e @ TransportError::MissingSender) => {
				assert_eq!(e.to_string(), "Cannot send message without a sender address")
			}
			other => panic!("expected MissingSender, got {:?}", other),
		}
		assert!(api.sent.lock().is_empty());
	}

	#[rstest]
	#[tokio::test]
	async fn test_send_without_recipient_fails(settings: MailgunSettings) {
		// Arrange
		let api = FakeApi::accepting("<1@mg.example.com>");
		let mut transport = MailgunTransport::with_client(settings, api.clone());
		let mut message = EmailMessage::builder()
			.from("alice@example.com")
			.build()
			.unwrap();

		// Act
		let result = transport.send(&mut message).await;

		// Assert
		match result {
			Err(e @ TransportError::MissingRecipient) => {
				assert_eq!(
					e.to_string(),
					"Cannot send message without a recipient address"
				)
			}
			other => panic!("expected MissingRecipient, got {:?}", other),
		}
		assert!(api.sent.lock().is_empty());
	}

	#[rstest]
	#[tokio::test]
	async fn test_send_success_assigns_provider_id(settings: MailgunSettings) {
		// Arrange
		let api = FakeApi::accepting("<20240101.abc@mg.example.com>");
		let mut transport = MailgunTransport::with_client(settings, api.clone());
		let recorder = Arc::new(Recorder::default());
		transport.register_plugin(recorder.clone());
		let mut message = message();

		// Act
		let report = transport.send(&mut message).await.unwrap();

		// Assert
		assert_eq!(report.sent, 1);
		assert!(report.failed_recipients.is_empty());
		assert_eq!(message.id(), "20240101.abc@mg.example.com");
		assert!(transport.is_started());
		assert_eq!(
			*recorder.events.lock(),
			vec!["before_started", "started", "before_send", "sent:success"]
		);

		let sent = api.sent.lock();
		assert_eq!(sent.len(), 1);
		assert_eq!(sent[0].0, "mg.example.com");
		assert_eq!(sent[0].1, vec!["bob@example.com", "carol@example.com"]);
		assert!(String::from_utf8_lossy(&sent[0].2).contains("Subject: Hello"));
	}

	#[rstest]
	#[tokio::test]
	async fn test_send_failure_regenerates_id(settings: MailgunSettings) {
		// Arrange
		let api = FakeApi::rejecting();
		let mut transport = MailgunTransport::with_client(settings, api);
		let recorder = Arc::new(Recorder::default());
		transport.register_plugin(recorder.clone());
		let mut message = message();
		let original_id = message.id().to_string();

		// Act
		let report = transport.send(&mut message).await.unwrap();

		// Assert
		assert_eq!(report.sent, 0);
		assert_eq!(
			report.failed_recipients,
			vec!["bob@example.com", "carol@example.com"]
		);
		assert_ne!(message.id(), original_id);
		assert_eq!(recorder.events.lock().last().unwrap(), "sent:failed");
		assert_eq!(
			*recorder.failed.lock(),
			vec!["bob@example.com", "carol@example.com"]
		);
	}

	#[rstest]
	#[tokio::test]
	async fn test_send_success_reports_no_failed_recipients_to_listeners(
		settings: MailgunSettings,
	) {
		// Arrange
		let api = FakeApi::accepting("<1@mg.example.com>");
		let mut transport = MailgunTransport::with_client(settings, api);
		let recorder = Arc::new(Recorder::default());
		transport.register_plugin(recorder.clone());
		let mut message = message();

		// Act
		transport.send(&mut message).await.unwrap();

		// Assert
		assert!(recorder.failed.lock().is_empty());
	}

	#[rstest]
	#[tokio::test]
	async fn test_send_after_cancelled_start_is_not_started(settings: MailgunSettings) {
		// Arrange
		let api = FakeApi::accepting("<1@mg.example.com>");
		let mut transport = MailgunTransport::with_client(settings, api.clone());
		let recorder = Arc::new(Recorder {
			cancel_start: true,
			..Default::default()
		});
		transport.register_plugin(recorder.clone());
		let mut message = message();

		// Act
		let result = transport.send(&mut message).await;

		// Assert
		assert!(matches!(result, Err(TransportError::NotStarted)));
		assert!(!transport.is_started());
		assert!(api.sent.lock().is_empty());
		assert_eq!(
			recorder.events.lock().last().unwrap(),
			"exception:Transport is not started"
		);
	}

	#[rstest]
	#[tokio::test]
	async fn test_send_after_cancelled_start_suppressed_reports_failure(
		settings: MailgunSettings,
	) {
		// Arrange
		let api = FakeApi::accepting("<1@mg.example.com>");
		let mut transport = MailgunTransport::with_client(settings, api.clone());
		let recorder = Arc::new(Recorder {
			cancel_start: true,
			suppress_errors: true,
			..Default::default()
		});
		transport.register_plugin(recorder.clone());
		let mut message = message();
		let original_id = message.id().to_string();

		// Act
		let report = transport.send(&mut message).await.unwrap();

		// Assert
		assert_eq!(report.sent, 0);
		assert_eq!(
			report.failed_recipients,
			vec!["bob@example.com", "carol@example.com"]
		);
		assert_ne!(message.id(), original_id);
		assert!(api.sent.lock().is_empty());
		assert_eq!(
			*recorder.events.lock(),
			vec![
				"before_started",
				"before_send",
				"exception:Transport is not started",
				"sent:failed",
			]
		);
	}

	#[rstest]
	#[tokio::test]
	async fn test_send_missing_sender_suppressed_then_rendering_fails(settings: MailgunSettings) {
		// Arrange
		let api = FakeApi::accepting("<1@mg.example.com>");
		let mut transport = MailgunTransport::with_client(settings, api.clone());
		let recorder = Arc::new(Recorder {
			suppress_errors: true,
			..Default::default()
		});
		transport.register_plugin(recorder.clone());
		let mut message = EmailMessage::builder().to("bob@example.com").build().unwrap();

		// Act
		let report = transport.send(&mut message).await.unwrap();

		// Assert
		assert_eq!(report.sent, 0);
		assert!(api.sent.lock().is_empty());
		let events = recorder.events.lock();
		let exceptions: Vec<&String> = events
			.iter()
			.filter(|e| e.starts_with("exception:"))
			.collect();
		assert_eq!(exceptions.len(), 2);
		assert_eq!(
			exceptions[0],
			"exception:Cannot send message without a sender address"
		);
		assert!(exceptions[1].starts_with("exception:Failed to build message"));
		assert_eq!(events.last().unwrap(), "sent:failed");
	}

	#[rstest]
	#[tokio::test]
	async fn test_send_with_several_authors(settings: MailgunSettings) {
		// Arrange
		let api = FakeApi::accepting("<multi@mg.example.com>");
		let mut transport = MailgunTransport::with_client(settings, api.clone());
		let mut message = EmailMessage::builder()
			.from("alice@example.com")
			.from("carol@example.com")
			.to("bob@example.com")
			.subject("Joint note")
			.build()
			.unwrap();

		// Act
		let report = transport.send(&mut message).await.unwrap();

		// Assert
		assert_eq!(report.sent, 1);
		assert_eq!(message.reverse_path().unwrap().to_string(), "alice@example.com");
		let sent = api.sent.lock();
		assert!(String::from_utf8_lossy(&sent[0].2).contains("Sender: alice@example.com"));
	}

	#[rstest]
	#[tokio::test]
	async fn test_send_cancelled_by_listener(settings: MailgunSettings) {
		// Arrange
		let api = FakeApi::accepting("<1@mg.example.com>");
		let mut transport = MailgunTransport::with_client(settings, api.clone());
		let recorder = Arc::new(Recorder {
			cancel_send: true,
			..Default::default()
		});
		transport.register_plugin(recorder.clone());
		let mut message = message();
		let original_id = message.id().to_string();

		// Act
		let report = transport.send(&mut message).await.unwrap();

		// Assert
		assert_eq!(report.sent, 0);
		assert!(api.sent.lock().is_empty());
		assert_eq!(message.id(), original_id);
		assert!(!recorder.events.lock().iter().any(|e| e.starts_with("sent:")));
	}

	#[rstest]
	#[tokio::test]
	async fn test_send_missing_recipient_suppressed_reports_failure(settings: MailgunSettings) {
		// Arrange
		let api = FakeApi::rejecting();
		let mut transport = MailgunTransport::with_client(settings, api);
		let recorder = Arc::new(Recorder {
			suppress_errors: true,
			..Default::default()
		});
		transport.register_plugin(recorder.clone());
		let mut message = EmailMessage::builder()
			.from("alice@example.com")
			.build()
			.unwrap();

		// Act
		let report = transport.send(&mut message).await.unwrap();

		// Assert
		assert_eq!(report.sent, 0);
		let events = recorder.events.lock();
		assert!(events.iter().any(|e| e.contains("without a recipient address")));
		assert_eq!(events.last().unwrap(), "sent:failed");
	}

	#[rstest]
	#[tokio::test]
	async fn test_stop_after_start(settings: MailgunSettings) {
		// Arrange
		let api = FakeApi::accepting("<1@mg.example.com>");
		let mut transport = MailgunTransport::with_client(settings, api);
		transport.start().await.unwrap();

		// Act
		transport.stop().await.unwrap();

		// Assert
		assert!(!transport.is_started());
		assert!(transport.ping().await.unwrap());
	}

	#[rstest]
	fn test_config_accessors(settings: MailgunSettings) {
		// Arrange
		let mut transport = MailgunTransport::new(settings);

		// Act
		transport.set_domain("mg.other.com");
		transport.set_endpoint("https://api.eu.mailgun.net");
		transport.set_api_key("key-new");

		// Assert
		assert_eq!(transport.domain(), "mg.other.com");
		assert_eq!(transport.endpoint(), "https://api.eu.mailgun.net");
		assert_eq!(transport.settings().api_key.expose(), "key-new");
	}
}
