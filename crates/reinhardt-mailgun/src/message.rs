//! Message model handed to transports
//!
//! An [`EmailMessage`] owns its addresses as parsed lettre [`Mailbox`]es so
//! the transport can pull the reverse path and recipient list without
//! re-parsing, and renders itself to raw MIME through lettre's builder.

use crate::error::{TransportError, TransportResult};
use lettre::Address;
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, MultiPart, MultiPartBuilder, SinglePart};
use uuid::Uuid;

/// Right-hand side used for generated Message-IDs when no From domain is known.
const GENERATED_ID_DOMAIN: &str = "mailgun.generated";

/// A file attached to an email message.
///
/// # Examples
///
/// ```
/// use reinhardt_mailgun::Attachment;
///
/// let attachment = Attachment::new("report.pdf", b"%PDF-1.4".to_vec());
/// assert_eq!(attachment.filename(), "report.pdf");
/// assert_eq!(attachment.mime_type(), "application/pdf");
/// ```
#[derive(Debug, Clone)]
pub struct Attachment {
	filename: String,
	content: Vec<u8>,
	mime_type: String,
}

impl Attachment {
	/// Create an attachment, guessing the MIME type from the filename.
	pub fn new(filename: impl Into<String>, content: Vec<u8>) -> Self {
		let filename = filename.into();
		let mime_type = Self::detect_mime_type(&filename);

		Self {
			filename,
			content,
			mime_type,
		}
	}

	/// Override the detected MIME type
	pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
		self.mime_type = mime_type.into();
		self
	}

	pub fn filename(&self) -> &str {
		&self.filename
	}

	pub fn content(&self) -> &[u8] {
		&self.content
	}

	pub fn mime_type(&self) -> &str {
		&self.mime_type
	}

	fn to_part(&self) -> TransportResult<SinglePart> {
		let content_type = ContentType::parse(&self.mime_type).map_err(|e| {
			TransportError::Message(format!(
				"Invalid MIME type '{}' for attachment '{}': {}",
				self.mime_type, self.filename, e
			))
		})?;

		Ok(lettre::message::Attachment::new(self.filename.clone())
			.body(self.content.clone(), content_type))
	}

	fn detect_mime_type(filename: &str) -> String {
		mime_guess::from_path(filename)
			.first()
			.map(|mime| mime.to_string())
			.unwrap_or_else(|| "application/octet-stream".to_string())
	}
}

/// An email message as seen by a transport.
///
/// The transport reads the reverse path and recipients from it, and writes
/// the provider-assigned Message-ID back after a successful send.
#[derive(Debug, Clone)]
pub struct EmailMessage {
	id: String,
	subject: String,
	body: String,
	html: Option<String>,
	from: Vec<Mailbox>,
	sender: Option<Mailbox>,
	return_path: Option<Address>,
	reply_to: Vec<Mailbox>,
	to: Vec<Mailbox>,
	cc: Vec<Mailbox>,
	bcc: Vec<Mailbox>,
	attachments: Vec<Attachment>,
}

impl EmailMessage {
	/// Create a new builder for constructing an `EmailMessage`.
	pub fn builder() -> EmailMessageBuilder {
		EmailMessageBuilder::default()
	}

	/// Message-ID without angle brackets.
	pub fn id(&self) -> &str {
		&self.id
	}

	/// Store an id assigned by the provider.
	///
	/// Mailgun wraps ids in angle brackets; they are stripped here.
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_mailgun::EmailMessage;
	///
	/// let mut message = EmailMessage::builder()
	///     .from("sender@example.com")
	///     .to("user@example.com")
	///     .build()
	///     .unwrap();
	/// message.set_id("<20240101.1@mg.example.com>");
	/// assert_eq!(message.id(), "20240101.1@mg.example.com");
	/// ```
	pub fn set_id(&mut self, id: impl AsRef<str>) {
		self.id = id
			.as_ref()
			.trim()
			.trim_start_matches('<')
			.trim_end_matches('>')
			.to_string();
	}

	/// Replace the Message-ID with a freshly generated one.
	///
	/// Called after a failed delivery so a retry by the caller does not
	/// reuse an id the provider may already have seen.
	pub fn generate_id(&mut self) -> &str {
		self.id = Self::new_id(self.from.first());
		&self.id
	}

	fn new_id(from: Option<&Mailbox>) -> String {
		let domain = from
			.map(|mailbox| mailbox.email.domain())
			.filter(|domain| !domain.is_empty())
			.unwrap_or(GENERATED_ID_DOMAIN);
		format!("{}@{}", Uuid::new_v4().simple(), domain)
	}

	pub fn subject(&self) -> &str {
		&self.subject
	}

	pub fn body(&self) -> &str {
		&self.body
	}

	pub fn html(&self) -> Option<&str> {
		self.html.as_deref()
	}

	pub fn from(&self) -> &[Mailbox] {
		&self.from
	}

	pub fn sender(&self) -> Option<&Mailbox> {
		self.sender.as_ref()
	}

	pub fn return_path(&self) -> Option<&Address> {
		self.return_path.as_ref()
	}

	pub fn reply_to(&self) -> &[Mailbox] {
		&self.reply_to
	}

	pub fn to(&self) -> &[Mailbox] {
		&self.to
	}

	pub fn cc(&self) -> &[Mailbox] {
		&self.cc
	}

	pub fn bcc(&self) -> &[Mailbox] {
		&self.bcc
	}

	pub fn attachments(&self) -> &[Attachment] {
		&self.attachments
	}

	/// Address the provider should use as the envelope sender.
	///
	/// Return-Path wins over Sender, which wins over the first From address.
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_mailgun::EmailMessage;
	///
	/// let message = EmailMessage::builder()
	///     .from("author@example.com")
	///     .sender("relay@example.com")
	///     .to("user@example.com")
	///     .build()
	///     .unwrap();
	/// assert_eq!(message.reverse_path().unwrap().to_string(), "relay@example.com");
	/// ```
	pub fn reverse_path(&self) -> Option<&Address> {
		self.return_path
			.as_ref()
			.or_else(|| self.sender.as_ref().map(|mailbox| &mailbox.email))
			.or_else(|| self.from.first().map(|mailbox| &mailbox.email))
	}

	/// Envelope recipients: To, then Bcc, then Cc.
	pub fn recipients(&self) -> Vec<String> {
		self.to
			.iter()
			.chain(self.bcc.iter())
			.chain(self.cc.iter())
			.map(|mailbox| mailbox.email.to_string())
			.collect()
	}

	/// Render the message as RFC 5322 bytes.
	///
	/// Bcc recipients are not written to the headers; the provider receives
	/// them through the envelope recipient list instead.
	pub fn to_mime(&self) -> TransportResult<Vec<u8>> {
		let mut builder = lettre::Message::builder()
			.subject(self.subject.clone())
			.message_id(Some(format!("<{}>", self.id)))
			.date_now();

		for mailbox in &self.from {
			builder = builder.from(mailbox.clone());
		}
		// Several authors need a Sender; the first author stands in when none is set.
		let sender = self
			.sender
			.as_ref()
			.or_else(|| self.from.first().filter(|_| self.from.len() > 1));
		if let Some(sender) = sender {
			builder = builder.sender(sender.clone());
		}
		for mailbox in &self.reply_to {
			builder = builder.reply_to(mailbox.clone());
		}
		for mailbox in &self.to {
			builder = builder.to(mailbox.clone());
		}
		for mailbox in &self.cc {
			builder = builder.cc(mailbox.clone());
		}
		for mailbox in &self.bcc {
			builder = builder.bcc(mailbox.clone());
		}

		let message = if self.attachments.is_empty() {
			match &self.html {
				Some(html) => builder.multipart(MultiPart::alternative_plain_html(
					self.body.clone(),
					html.clone(),
				))?,
				None => builder.singlepart(SinglePart::plain(self.body.clone()))?,
			}
		} else {
			let mixed = MultiPart::mixed();
			let mut mixed = self.append_content(mixed);
			for attachment in &self.attachments {
				mixed = mixed.singlepart(attachment.to_part()?);
			}
			builder.multipart(mixed)?
		};

		Ok(message.formatted())
	}

	fn append_content(&self, mixed: MultiPartBuilder) -> MultiPart {
		match &self.html {
			Some(html) => mixed.multipart(MultiPart::alternative_plain_html(
				self.body.clone(),
				html.clone(),
			)),
			None => mixed.singlepart(SinglePart::plain(self.body.clone())),
		}
	}
}

/// Builder for [`EmailMessage`].
///
/// Addresses are collected as strings and parsed in [`build`](Self::build),
/// so a malformed address surfaces as a single `InvalidAddress` error.
#[derive(Debug, Default)]
pub struct EmailMessageBuilder {
	subject: String,
	body: String,
	html: Option<String>,
	from: Vec<String>,
	sender: Option<String>,
	return_path: Option<String>,
	reply_to: Vec<String>,
	to: Vec<String>,
	cc: Vec<String>,
	bcc: Vec<String>,
	attachments: Vec<Attachment>,
}

impl EmailMessageBuilder {
	pub fn subject(mut self, subject: impl Into<String>) -> Self {
		self.subject = subject.into();
		self
	}

	pub fn body(mut self, body: impl Into<String>) -> Self {
		self.body = body.into();
		self
	}

	pub fn html(mut self, html: impl Into<String>) -> Self {
		self.html = Some(html.into());
		self
	}

	/// Add a From mailbox, either `user@host` or `Name <user@host>`.
	pub fn from(mut self, from: impl Into<String>) -> Self {
		self.from.push(from.into());
		self
	}

	pub fn sender(mut self, sender: impl Into<String>) -> Self {
		self.sender = Some(sender.into());
		self
	}

	pub fn return_path(mut self, address: impl Into<String>) -> Self {
		self.return_path = Some(address.into());
		self
	}

	pub fn reply_to(mut self, reply_to: impl Into<String>) -> Self {
		self.reply_to.push(reply_to.into());
		self
	}

	pub fn to(mut self, to: impl Into<String>) -> Self {
		self.to.push(to.into());
		self
	}

	pub fn to_all<I, S>(mut self, to: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.to.extend(to.into_iter().map(Into::into));
		self
	}

	pub fn cc(mut self, cc: impl Into<String>) -> Self {
		self.cc.push(cc.into());
		self
	}

	pub fn bcc(mut self, bcc: impl Into<String>) -> Self {
		self.bcc.push(bcc.into());
		self
	}

	pub fn attachment(mut self, attachment: Attachment) -> Self {
		self.attachments.push(attachment);
		self
	}

	/// Parse every address and assemble the message.
	///
	/// No field is required here; the transport decides whether a message
	/// without a sender or recipients may be sent.
	pub fn build(self) -> TransportResult<EmailMessage> {
		let from = parse_mailboxes(&self.from)?;
		let sender = self.sender.as_deref().map(parse_mailbox).transpose()?;
		let return_path = self
			.return_path
			.as_deref()
			.map(|address| {
				address
					.trim()
					.parse::<Address>()
					.map_err(|e| TransportError::InvalidAddress(format!("{}: {}", address, e)))
			})
			.transpose()?;

		let id = EmailMessage::new_id(from.first());

		Ok(EmailMessage {
			id,
			subject: self.subject,
			body: self.body,
			html: self.html,
			from,
			sender,
			return_path,
			reply_to: parse_mailboxes(&self.reply_to)?,
			to: parse_mailboxes(&self.to)?,
			cc: parse_mailboxes(&self.cc)?,
			bcc: parse_mailboxes(&self.bcc)?,
			attachments: self.attachments,
		})
	}
}

fn parse_mailbox(value: &str) -> TransportResult<Mailbox> {
	value
		.trim()
		.parse::<Mailbox>()
		.map_err(|e| TransportError::InvalidAddress(format!("{}: {}", value, e)))
}

fn parse_mailboxes(values: &[String]) -> TransportResult<Vec<Mailbox>> {
	values.iter().map(|value| parse_mailbox(value)).collect()
}
