//! # Reinhardt Mailgun
//!
//! Mail transport delivering through the Mailgun HTTP API.
//!
//! ## Features
//!
//! - **Transport interface**: [`Transport`] with start/stop/ping/send and
//!   plugin registration, shared state in [`TransportCore`]
//! - **Lifecycle events**: listeners observe start, stop, send and errors,
//!   and may cancel starts, sends, or suppress errors
//! - **Raw MIME delivery**: messages are rendered with lettre and posted to
//!   `messages.mime`, with recipients taken from To, Bcc and Cc
//! - **Configuration**: API key, endpoint (or region) and sending domain,
//!   from code, environment variables or TOML
//!
//! ## Example
//!
//! ```rust,no_run
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use reinhardt_mailgun::events::{EventListener, SendEvent};
//! use reinhardt_mailgun::{EmailMessage, MailgunSettings, MailgunTransport, Transport};
//! use std::sync::Arc;
//!
//! struct AuditLog;
//!
//! impl EventListener for AuditLog {
//!     fn send_performed(&self, event: &mut SendEvent<'_>) {
//!         println!("{} -> {}", event.message().id(), event.result());
//!     }
//! }
//!
//! let mut transport = MailgunTransport::new(MailgunSettings::from_env()?);
//! transport.register_plugin(Arc::new(AuditLog));
//!
//! let mut message = EmailMessage::builder()
//!     .from("Billing <billing@mg.example.com>")
//!     .to("customer@example.com")
//!     .subject("Your invoice")
//!     .body("Invoice attached.")
//!     .build()?;
//!
//! let report = transport.send(&mut message).await?;
//! println!("sent {} message(s)", report.sent);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod events;
pub mod mailgun;
pub mod message;
pub mod settings;
pub mod transport;

pub use client::{ConnectionSettings, HttpMailgunClient, MailgunApi, SendResponse};
pub use error::{TransportError, TransportResult};
pub use events::{EventDispatcher, EventListener, SendResult};
pub use mailgun::MailgunTransport;
pub use message::{Attachment, EmailMessage, EmailMessageBuilder};
pub use settings::{ApiKey, MailgunRegion, MailgunSettings};
pub use transport::{SendReport, Transport, TransportCore};
