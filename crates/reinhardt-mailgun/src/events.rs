//! Transport lifecycle events
//!
//! Listeners are bound to an [`EventDispatcher`] and receive every event in
//! registration order. Any listener may cancel an event's bubble, which
//! stops propagation to the remaining listeners and, for `before_*` events
//! and exceptions, tells the transport to abort or suppress.

use crate::error::TransportError;
use crate::message::EmailMessage;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Propagation flag shared by every event type.
pub trait BubbleEvent {
	/// Stop delivering this event to further listeners
	fn cancel_bubble(&mut self);

	/// Whether a listener cancelled propagation
	fn bubble_cancelled(&self) -> bool;
}

macro_rules! impl_bubble_event {
	($ty:ty) => {
		impl BubbleEvent for $ty {
			fn cancel_bubble(&mut self) {
				self.cancelled = true;
			}

			fn bubble_cancelled(&self) -> bool {
				self.cancelled
			}
		}
	};
}

/// Fired around a transport's start and stop.
#[derive(Debug, Clone)]
pub struct TransportChangeEvent {
	transport: &'static str,
	cancelled: bool,
}

impl TransportChangeEvent {
	pub fn new(transport: &'static str) -> Self {
		Self {
			transport,
			cancelled: false,
		}
	}

	/// Name of the transport that raised the event
	pub fn transport(&self) -> &'static str {
		self.transport
	}
}

impl_bubble_event!(TransportChangeEvent);

/// Delivery state recorded on a [`SendEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendResult {
	/// Not yet handed to the provider
	Pending,
	/// Queued locally for later delivery
	Spooled,
	/// Accepted by the provider
	Success,
	/// Accepted for some recipients only
	Tentative,
	/// Rejected by the provider
	Failed,
}

impl fmt::Display for SendResult {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			SendResult::Pending => "pending",
			SendResult::Spooled => "spooled",
			SendResult::Success => "success",
			SendResult::Tentative => "tentative",
			SendResult::Failed => "failed",
		};
		write!(f, "{}", s)
	}
}

/// Fired before and after a message is handed to the provider.
///
/// Listeners get mutable access to the message in `before_send_performed`,
/// so they can rewrite it before it is rendered.
pub struct SendEvent<'a> {
	transport: &'static str,
	message: &'a mut EmailMessage,
	result: SendResult,
	failed_recipients: Vec<String>,
	cancelled: bool,
}

impl<'a> SendEvent<'a> {
	pub fn new(transport: &'static str, message: &'a mut EmailMessage) -> Self {
		Self {
			transport,
			message,
			result: SendResult::Pending,
			failed_recipients: Vec::new(),
			cancelled: false,
		}
	}

	pub fn transport(&self) -> &'static str {
		self.transport
	}

	pub fn message(&self) -> &EmailMessage {
		&*self.message
	}

	pub fn message_mut(&mut self) -> &mut EmailMessage {
		&mut *self.message
	}

	pub fn result(&self) -> SendResult {
		self.result
	}

	pub fn set_result(&mut self, result: SendResult) {
		self.result = result;
	}

	pub fn failed_recipients(&self) -> &[String] {
		&self.failed_recipients
	}

	pub fn set_failed_recipients(&mut self, recipients: Vec<String>) {
		self.failed_recipients = recipients;
	}
}

impl fmt::Debug for SendEvent<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SendEvent")
			.field("transport", &self.transport)
			.field("message_id", &self.message.id())
			.field("result", &self.result)
			.field("failed_recipients", &self.failed_recipients)
			.field("cancelled", &self.cancelled)
			.finish()
	}
}

impl_bubble_event!(SendEvent<'_>);

/// Fired when a transport is about to return an error.
///
/// Cancelling the bubble suppresses the error and lets the transport
/// carry on.
#[derive(Debug)]
pub struct TransportExceptionEvent<'a> {
	transport: &'static str,
	error: &'a TransportError,
	cancelled: bool,
}

impl<'a> TransportExceptionEvent<'a> {
	pub fn new(transport: &'static str, error: &'a TransportError) -> Self {
		Self {
			transport,
			error,
			cancelled: false,
		}
	}

	pub fn transport(&self) -> &'static str {
		self.transport
	}

	pub fn error(&self) -> &TransportError {
		self.error
	}
}

impl_bubble_event!(TransportExceptionEvent<'_>);

/// A plugin observing transport activity.
///
/// Every hook defaults to a no-op, so a listener only implements what it
/// cares about.
pub trait EventListener: Send + Sync {
	fn before_transport_started(&self, _event: &mut TransportChangeEvent) {}

	fn transport_started(&self, _event: &mut TransportChangeEvent) {}

	fn before_transport_stopped(&self, _event: &mut TransportChangeEvent) {}

	fn transport_stopped(&self, _event: &mut TransportChangeEvent) {}

	fn before_send_performed(&self, _event: &mut SendEvent<'_>) {}

	fn send_performed(&self, _event: &mut SendEvent<'_>) {}

	fn exception_thrown(&self, _event: &mut TransportExceptionEvent<'_>) {}
}

/// Shared list of listeners with ordered, cancellable dispatch.
///
/// Clones share the same listener list.
///
/// # Examples
///
/// ```
/// use reinhardt_mailgun::events::{
///     BubbleEvent, EventDispatcher, EventListener, TransportChangeEvent,
/// };
/// use std::sync::Arc;
///
/// struct Veto;
///
/// impl EventListener for Veto {
///     fn before_transport_started(&self, event: &mut TransportChangeEvent) {
///         event.cancel_bubble();
///     }
/// }
///
/// let dispatcher = EventDispatcher::new();
/// dispatcher.bind_listener(Arc::new(Veto));
///
/// let mut event = TransportChangeEvent::new("mailgun");
/// dispatcher.before_transport_started(&mut event);
/// assert!(event.bubble_cancelled());
/// ```
#[derive(Clone, Default)]
pub struct EventDispatcher {
	listeners: Arc<RwLock<Vec<Arc<dyn EventListener>>>>,
}

impl EventDispatcher {
	pub fn new() -> Self {
		Self::default()
	}

	/// Bind a listener; binding the same `Arc` twice has no effect.
	pub fn bind_listener(&self, listener: Arc<dyn EventListener>) {
		let mut listeners = self.listeners.write();
		if listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
			return;
		}
		listeners.push(listener);
	}

	pub fn listener_count(&self) -> usize {
		self.listeners.read().len()
	}

	pub fn before_transport_started(&self, event: &mut TransportChangeEvent) {
		self.dispatch(event, |l, e| l.before_transport_started(e));
	}

	pub fn transport_started(&self, event: &mut TransportChangeEvent) {
		self.dispatch(event, |l, e| l.transport_started(e));
	}

	pub fn before_transport_stopped(&self, event: &mut TransportChangeEvent) {
		self.dispatch(event, |l, e| l.before_transport_stopped(e));
	}

	pub fn transport_stopped(&self, event: &mut TransportChangeEvent) {
		self.dispatch(event, |l, e| l.transport_stopped(e));
	}

	pub fn before_send_performed(&self, event: &mut SendEvent<'_>) {
		self.dispatch(event, |l, e| l.before_send_performed(e));
	}

	pub fn send_performed(&self, event: &mut SendEvent<'_>) {
		self.dispatch(event, |l, e| l.send_performed(e));
	}

	pub fn exception_thrown(&self, event: &mut TransportExceptionEvent<'_>) {
		self.dispatch(event, |l, e| l.exception_thrown(e));
	}

	fn dispatch<E, F>(&self, event: &mut E, hook: F)
	where
		E: BubbleEvent,
		F: Fn(&dyn EventListener, &mut E),
	{
		// Snapshot so a listener may bind further listeners without deadlocking
		let listeners = self.listeners.read().clone();
		for listener in listeners.iter() {
			if event.bubble_cancelled() {
				break;
			}
			hook(listener.as_ref(), &mut *event);
		}
	}
}

impl fmt::Debug for EventDispatcher {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("EventDispatcher")
			.field("listeners", &self.listener_count())
			.finish()
	}
}
