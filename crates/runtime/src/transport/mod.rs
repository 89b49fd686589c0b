//! Message transport between the connection and the browser.
//!
//! A transport is split into a sending half ([`Transport`]) and a receiving
//! half ([`TransportReceiver`]). The receiver runs as its own task and pushes
//! every inbound JSON message into an unbounded channel that the
//! [`Connection`](crate::Connection) drains.

#[cfg(any(test, feature = "fake-transport"))]
pub mod fake;

use std::future::Future;
use std::pin::Pin;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::{Error, Result};

/// Sending half of a transport.
pub trait Transport: Send {
	/// Sends one JSON message.
	fn send(&mut self, message: Value) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

	/// Closes the outbound side. Defaults to a no-op.
	fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		Box::pin(async { Ok(()) })
	}
}

/// Receiving half of a transport.
pub trait TransportReceiver: Send {
	/// Reads messages until the peer closes or the channel consumer goes away.
	fn run(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>>;
}

/// Everything a [`Connection`](crate::Connection) needs from a transport.
pub struct TransportParts {
	pub sender: Box<dyn Transport>,
	pub receiver: Box<dyn TransportReceiver>,
	pub message_rx: mpsc::UnboundedReceiver<Value>,
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport to a DevTools endpoint.
pub struct WebSocketTransport {
	stream: WsStream,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl WebSocketTransport {
	/// Connects to `url` (`ws://` or `wss://`).
	///
	/// # Errors
	///
	/// Returns [`Error::Rejected`] when the endpoint answers the handshake with
	/// an HTTP error status, [`Error::ConnectionFailed`] for every other failure.
	pub async fn connect(url: &str) -> Result<(Self, mpsc::UnboundedReceiver<Value>)> {
		let (stream, _response) = tokio_tungstenite::connect_async(url).await.map_err(map_handshake_error)?;
		let (message_tx, message_rx) = mpsc::unbounded_channel();
		Ok((Self { stream, message_tx }, message_rx))
	}

	/// Splits the socket into connection-ready parts.
	pub fn into_transport_parts(self, message_rx: mpsc::UnboundedReceiver<Value>) -> TransportParts {
		let (sink, stream) = self.stream.split();
		TransportParts {
			sender: Box::new(WebSocketTransportSender { sink }),
			receiver: Box::new(WebSocketTransportReceiver {
				stream,
				message_tx: self.message_tx,
			}),
			message_rx,
		}
	}
}

fn map_handshake_error(err: tungstenite::Error) -> Error {
	match err {
		tungstenite::Error::Http(response) => {
			let status = response.status();
			let body = response
				.body()
				.as_deref()
				.map(String::from_utf8_lossy)
				.unwrap_or_default();
			let reason = status.canonical_reason().unwrap_or_default();
			let message = if body.trim().is_empty() {
				reason.to_string()
			} else {
				format!("{reason}: {}", body.trim())
			};
			Error::Rejected {
				status: status.as_u16(),
				message,
			}
		}
		other => Error::ConnectionFailed(other.to_string()),
	}
}

/// Sending half of [`WebSocketTransport`].
pub struct WebSocketTransportSender {
	sink: SplitSink<WsStream, Message>,
}

impl Transport for WebSocketTransportSender {
	fn send(&mut self, message: Value) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		Box::pin(async move {
			let text = serde_json::to_string(&message)?;
			self.sink
				.send(Message::Text(text))
				.await
				.map_err(|e| Error::TransportError(format!("Failed to send message: {e}")))
		})
	}

	fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		Box::pin(async move {
			self.sink
				.close()
				.await
				.map_err(|e| Error::TransportError(format!("Failed to close socket: {e}")))
		})
	}
}

/// Receiving half of [`WebSocketTransport`].
pub struct WebSocketTransportReceiver {
	stream: SplitStream<WsStream>,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl TransportReceiver for WebSocketTransportReceiver {
	fn run(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
		let Self { mut stream, message_tx } = *self;
		Box::pin(async move {
			while let Some(frame) = stream.next().await {
				let frame = frame.map_err(|e| Error::TransportError(format!("Failed to read message: {e}")))?;
				let value: Value = match frame {
					Message::Text(text) => match serde_json::from_str(&text) {
						Ok(value) => value,
						Err(e) => {
							tracing::warn!(error = %e, "Dropping non-JSON text frame");
							continue;
						}
					},
					Message::Binary(bytes) => match serde_json::from_slice(&bytes) {
						Ok(value) => value,
						Err(e) => {
							tracing::warn!(error = %e, "Dropping non-JSON binary frame");
							continue;
						}
					},
					Message::Close(frame) => {
						tracing::debug!(?frame, "Browser closed the socket");
						return Ok(());
					}
					_ => continue,
				};

				if message_tx.send(value).is_err() {
					// Consumer gone; normal shutdown.
					return Ok(());
				}
			}
			Ok(())
		})
	}
}
