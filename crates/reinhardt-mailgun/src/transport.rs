//! Generic transport interface and the state every transport shares
//!
//! A transport owns a [`TransportCore`] and exposes it through
//! [`Transport::core`]/[`Transport::core_mut`]; the default trait methods
//! implement stop, ping and plugin registration on top of it, leaving
//! `start` and `send` to the concrete transport.

use crate::error::{TransportError, TransportResult};
use crate::events::{
	BubbleEvent, EventDispatcher, EventListener, TransportChangeEvent, TransportExceptionEvent,
};
use crate::message::EmailMessage;
use async_trait::async_trait;
use std::sync::Arc;

/// Outcome of [`Transport::send`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReport {
	/// Number of messages the provider accepted (0 or 1)
	pub sent: usize,
	/// Recipients the provider did not accept
	pub failed_recipients: Vec<String>,
}

impl SendReport {
	pub fn is_success(&self) -> bool {
		self.sent > 0
	}
}

/// Started flag, event dispatcher and transport name.
#[derive(Debug, Clone)]
pub struct TransportCore {
	name: &'static str,
	started: bool,
	dispatcher: EventDispatcher,
}

impl TransportCore {
	pub fn new(name: &'static str, dispatcher: EventDispatcher) -> Self {
		Self {
			name,
			started: false,
			dispatcher,
		}
	}

	pub fn name(&self) -> &'static str {
		self.name
	}

	pub fn is_started(&self) -> bool {
		self.started
	}

	pub fn set_started(&mut self, started: bool) {
		self.started = started;
	}

	pub fn dispatcher(&self) -> &EventDispatcher {
		&self.dispatcher
	}

	/// Stop the logical connection.
	///
	/// A listener cancelling `before_transport_stopped` keeps the transport
	/// started.
	pub fn stop(&mut self) {
		if self.started {
			let mut event = TransportChangeEvent::new(self.name);
			self.dispatcher.before_transport_stopped(&mut event);
			if event.bubble_cancelled() {
				tracing::debug!(transport = self.name, "stop cancelled by listener");
				return;
			}

			self.dispatcher.transport_stopped(&mut event);
			tracing::debug!(transport = self.name, "transport stopped");
		}

		self.started = false;
	}

	/// Offer an error to listeners before returning it.
	///
	/// Returns `Ok(())` when a listener cancelled the exception event, in
	/// which case the caller carries on as if nothing failed.
	pub fn throw_exception(&self, error: TransportError) -> TransportResult<()> {
		let mut event = TransportExceptionEvent::new(self.name, &error);
		self.dispatcher.exception_thrown(&mut event);

		if event.bubble_cancelled() {
			tracing::warn!(
				transport = self.name,
				error = %error,
				"transport error suppressed by listener"
			);
			return Ok(());
		}

		Err(error)
	}
}

/// Interface every mail transport implements.
#[async_trait]
pub trait Transport: Send + Sync {
	fn core(&self) -> &TransportCore;

	fn core_mut(&mut self) -> &mut TransportCore;

	fn is_started(&self) -> bool {
		self.core().is_started()
	}

	/// Open the logical connection; a no-op when already started.
	async fn start(&mut self) -> TransportResult<()>;

	async fn stop(&mut self) -> TransportResult<()> {
		self.core_mut().stop();
		Ok(())
	}

	/// Whether the connection is alive. HTTP transports hold no socket, so
	/// the default always answers `true`.
	async fn ping(&mut self) -> TransportResult<bool> {
		Ok(true)
	}

	/// Send one message, starting the transport first if needed.
	async fn send(&mut self, message: &mut EmailMessage) -> TransportResult<SendReport>;

	fn register_plugin(&self, plugin: Arc<dyn EventListener>) {
		self.core().dispatcher().bind_listener(plugin);
	}
}
