//! DevTools command/response correlation.
//!
//! This module implements the request/response correlation layer on top of a
//! transport. It handles:
//! - Generating unique command ids
//! - Correlating responses with pending commands
//! - Distinguishing events from responses
//! - Fanning events out to every subscriber
//!
//! # Message Flow
//!
//! 1. Caller invokes [`Connection::send_command`] with session, method, and params
//! 2. Connection assigns an id and parks a oneshot sender under it
//! 3. The command is queued for the writer task
//! 4. Caller awaits the oneshot receiver
//! 5. The run loop receives the response from the transport
//! 6. The response is matched by id and delivered through the oneshot
//!
//! Events are published on a broadcast channel; every [`Connection::subscribe`]
//! receiver sees every event that arrives after it subscribed.


use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::task::{Context, Poll};

use codecap_protocol::cdp::{ErrorPayload, Event, Message, Request};
use serde_json::Value;
use tokio::sync::Mutex as TokioMutex;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::error::{Error, Result};
use crate::transport::{Transport, TransportParts, TransportReceiver};

/// Capacity of the event broadcast buffer.
///
/// A page load can emit a few hundred network events in a burst; slow
/// subscribers that fall further behind see `Lagged` and skip ahead.
pub const EVENT_BUFFER: usize = 1024;

struct Pending {
	method: String,
	tx: oneshot::Sender<Result<Value>>,
}

/// Pending commands keyed by id.
type CallbackMap = Arc<TokioMutex<HashMap<u32, Pending>>>;

/// RAII guard ensuring callback cleanup when a command future is dropped.
struct CancelGuard {
	id: u32,
	callbacks: CallbackMap,
	completed: bool,
}

impl CancelGuard {
	fn new(id: u32, callbacks: CallbackMap) -> Self {
		Self {
			id,
			callbacks,
			completed: false,
		}
	}

	fn complete(&mut self) {
		self.completed = true;
	}
}

impl Drop for CancelGuard {
	fn drop(&mut self) {
		if self.completed {
			return;
		}

		let id = self.id;
		let callbacks = Arc::clone(&self.callbacks);

		if let Ok(handle) = tokio::runtime::Handle::try_current() {
			handle.spawn(async move {
				if callbacks.lock().await.remove(&id).is_some() {
					tracing::debug!(id, "CancelGuard: removed orphaned callback");
				}
			});
		}
	}
}

/// Future returned by [`Connection::send_command`] with automatic cancellation cleanup.
struct ResponseFuture {
	rx: oneshot::Receiver<Result<Value>>,
	guard: CancelGuard,
}

impl Future for ResponseFuture {
	type Output = Result<Value>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		match Pin::new(&mut self.rx).poll(cx) {
			Poll::Ready(result) => {
				self.guard.complete();
				Poll::Ready(result.map_err(|_| Error::ChannelClosed).and_then(|r| r))
			}
			Poll::Pending => Poll::Pending,
		}
	}
}

enum Outbound {
	Message(Value),
	Close,
}

/// DevTools connection to one browser.
///
/// Owned by a single session; never shared between captures.
pub struct Connection {
	/// Sequential command id counter
	last_id: AtomicU32,
	/// Pending command callbacks keyed by id
	callbacks: CallbackMap,
	/// Queue feeding the writer task
	outbound_tx: mpsc::UnboundedSender<Outbound>,
	/// Transport halves and queues, taken once by `run()`
	transport_sender: TokioMutex<Option<Box<dyn Transport>>>,
	transport_receiver: TokioMutex<Option<Box<dyn TransportReceiver>>>,
	message_rx: TokioMutex<Option<mpsc::UnboundedReceiver<Value>>>,
	outbound_rx: TokioMutex<Option<mpsc::UnboundedReceiver<Outbound>>>,
	/// Event fan-out
	events: broadcast::Sender<Event>,
	/// Set by `close()` to stop the run loop
	shutdown: watch::Sender<bool>,
	/// Set once the run loop has exited
	closed: AtomicBool,
}

impl Connection {
	/// Creates a connection over the given transport. Nothing flows until [`run`](Self::run).
	pub fn new(parts: TransportParts) -> Self {
		let TransportParts {
			sender,
			receiver,
			message_rx,
		} = parts;

		let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
		let (events, _) = broadcast::channel(EVENT_BUFFER);
		let (shutdown, _) = watch::channel(false);

		Self {
			last_id: AtomicU32::new(0),
			callbacks: Arc::new(TokioMutex::new(HashMap::new())),
			outbound_tx,
			transport_sender: TokioMutex::new(Some(sender)),
			transport_receiver: TokioMutex::new(Some(receiver)),
			message_rx: TokioMutex::new(Some(message_rx)),
			outbound_rx: TokioMutex::new(Some(outbound_rx)),
			events,
			shutdown,
			closed: AtomicBool::new(false),
		}
	}

	/// Wraps the connection in an [`Arc`] and spawns its run loop.
	pub fn spawn(parts: TransportParts) -> (Arc<Self>, tokio::task::JoinHandle<()>) {
		let connection = Arc::new(Self::new(parts));
		let handle = tokio::spawn({
			let connection = Arc::clone(&connection);
			async move { connection.run().await }
		});
		(connection, handle)
	}

	/// Sends a command and awaits its response.
	///
	/// `session_id` addresses a flattened target session; [`None`] addresses
	/// the browser itself.
	///
	/// # Errors
	///
	/// Returns [`Error::Remote`] when the browser answers with an error and
	/// [`Error::ChannelClosed`] when the connection is gone.
	pub async fn send_command(&self, session_id: Option<&str>, method: &str, params: Value) -> Result<Value> {
		if self.is_closed() {
			return Err(Error::ChannelClosed);
		}

		let id = self.last_id.fetch_add(1, Ordering::SeqCst);
		tracing::trace!(id, method, session = session_id, "Sending command");

		let (tx, rx) = oneshot::channel();
		{
			// `run` marks the connection closed before draining callbacks, so a
			// check made under the same lock cannot miss the drain.
			let mut callbacks = self.callbacks.lock().await;
			if self.is_closed() {
				return Err(Error::ChannelClosed);
			}
			callbacks.insert(
				id,
				Pending {
					method: method.to_string(),
					tx,
				},
			);
		}

		let guard = CancelGuard::new(id, Arc::clone(&self.callbacks));

		let request = Request {
			id,
			method: method.to_string(),
			params,
			session_id: session_id.map(str::to_string),
		};

		let request_value = serde_json::to_value(&request)?;
		if self.outbound_tx.send(Outbound::Message(request_value)).is_err() {
			tracing::error!("Failed to queue command: outbound channel closed");
			return Err(Error::ChannelClosed);
		}

		ResponseFuture { rx, guard }.await
	}

	/// Subscribes to every event received from now on.
	pub fn subscribe(&self) -> broadcast::Receiver<Event> {
		self.events.subscribe()
	}

	/// Returns true once the run loop has stopped.
	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}

	/// Asks the run loop to close the socket and stop.
	///
	/// Pending commands fail with [`Error::ChannelClosed`].
	pub fn close(&self) {
		let _ = self.outbound_tx.send(Outbound::Close);
		self.shutdown.send_replace(true);
	}

	/// Runs the message dispatch loop until the transport ends or [`close`](Self::close) is called.
	pub async fn run(self: &Arc<Self>) {
		let (Some(transport_receiver), Some(mut transport_sender), Some(mut outbound_rx), Some(mut message_rx)) = (
			self.transport_receiver.lock().await.take(),
			self.transport_sender.lock().await.take(),
			self.outbound_rx.lock().await.take(),
			self.message_rx.lock().await.take(),
		) else {
			tracing::warn!("Connection::run called more than once");
			return;
		};

		let reader_handle = tokio::spawn(async move {
			if let Err(e) = transport_receiver.run().await {
				tracing::error!(error = %e, "Transport read error");
			}
		});

		let writer_handle = tokio::spawn(async move {
			while let Some(outbound) = outbound_rx.recv().await {
				match outbound {
					Outbound::Message(message) => {
						if let Err(e) = transport_sender.send(message).await {
							tracing::error!(error = %e, "Transport write error");
							break;
						}
					}
					Outbound::Close => {
						if let Err(e) = transport_sender.close().await {
							tracing::debug!(error = %e, "Transport close error");
						}
						break;
					}
				}
			}
		});

		let mut shutdown = self.shutdown.subscribe();
		loop {
			if *shutdown.borrow_and_update() {
				tracing::debug!("Connection shutdown requested");
				break;
			}

			tokio::select! {
				message = message_rx.recv() => {
					let Some(value) = message else {
						tracing::debug!("Transport ended");
						break;
					};
					match serde_json::from_value::<Message>(value) {
						Ok(message) => {
							if let Err(e) = self.dispatch_internal(message).await {
								tracing::warn!(error = %e, "Error dispatching message");
							}
						}
						Err(e) => tracing::error!(error = %e, "Failed to parse message"),
					}
				}
				changed = shutdown.changed() => {
					if changed.is_err() {
						break;
					}
				}
			}
		}

		self.closed.store(true, Ordering::SeqCst);
		reader_handle.abort();
		let _ = self.outbound_tx.send(Outbound::Close);
		let _ = writer_handle.await;
		self.fail_pending().await;
	}

	/// Dispatch an incoming message (test-only public version)
	#[cfg(test)]
	pub(crate) async fn dispatch(&self, message: Message) -> Result<()> {
		self.dispatch_internal(message).await
	}

	async fn dispatch_internal(&self, message: Message) -> Result<()> {
		match message {
			Message::Response(response) => {
				let pending = self.callbacks.lock().await.remove(&response.id).ok_or_else(|| {
					Error::ProtocolError(format!("Cannot find request to respond: id={}", response.id))
				})?;

				let result = match response.error {
					Some(payload) => Err(parse_protocol_error(&pending.method, payload)),
					None => Ok(response.result.unwrap_or(Value::Null)),
				};

				let _ = pending.tx.send(result);
				Ok(())
			}
			Message::Event(event) => {
				tracing::trace!(method = %event.method, session = ?event.session_id, "Event");
				// No subscribers is fine; events are opportunistic.
				let _ = self.events.send(event);
				Ok(())
			}
			Message::Unknown(value) => {
				tracing::debug!(message = %value, "Unknown message type (ignored)");
				Ok(())
			}
		}
	}

	async fn fail_pending(&self) {
		let pending: Vec<Pending> = self.callbacks.lock().await.drain().map(|(_, p)| p).collect();
		if !pending.is_empty() {
			tracing::debug!(count = pending.len(), "Failing pending commands after shutdown");
		}
		for p in pending {
			let _ = p.tx.send(Err(Error::ChannelClosed));
		}
	}
}

/// Converts a protocol error payload into a runtime [`Error`].
pub(crate) fn parse_protocol_error(method: &str, payload: ErrorPayload) -> Error {
	let message = match payload.data {
		Some(data) if !data.is_empty() => format!("{}: {}", payload.message, data),
		_ => payload.message,
	};
	Error::Remote {
		method: method.to_string(),
		code: payload.code,
		message,
	}
}
