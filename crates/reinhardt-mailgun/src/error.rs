//! Transport error types

use thiserror::Error;

/// Errors raised by transports and the Mailgun client.
///
/// Every variant is offered to registered listeners through
/// [`TransportCore::throw_exception`](crate::transport::TransportCore::throw_exception)
/// before it reaches the caller, except configuration errors which are
/// returned directly.
#[derive(Debug, Error)]
pub enum TransportError {
	#[error("Connection failed: {0}")]
	ConnectionFailed(String),

	#[error("Cannot send message without a sender address")]
	MissingSender,

	#[error("Cannot send message without a recipient address")]
	MissingRecipient,

	#[error("Transport is not started")]
	NotStarted,

	#[error("Invalid configuration: {0}")]
	Configuration(String),

	#[error("Invalid email address: {0}")]
	InvalidAddress(String),

	#[error("Failed to build message: {0}")]
	Message(String),

	#[error("HTTP request failed: {0}")]
	Http(#[from] reqwest::Error),

	#[error("Mailgun API error ({status}): {body}")]
	Api { status: u16, body: String },
}

impl From<lettre::error::Error> for TransportError {
	fn from(err: lettre::error::Error) -> Self {
		TransportError::Message(err.to_string())
	}
}

impl From<lettre::address::AddressError> for TransportError {
	fn from(err: lettre::address::AddressError) -> Self {
		TransportError::InvalidAddress(err.to_string())
	}
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;
