//! In-memory transport for testing command correlation and event dispatch.
//!
//! # Example
//!
//! ```ignore
//! let (parts, mut controller) = FakeTransportBuilder::new().build();
//! let connection = Arc::new(Connection::new(parts));
//! tokio::spawn({
//!     let conn = Arc::clone(&connection);
//!     async move { conn.run().await }
//! });
//!
//! let fut = connection.send_command(None, "Target.createTarget", json!({}));
//! let sent = controller.next_sent().await.unwrap();
//! controller.inject_response(sent["id"].as_u64().unwrap() as u32, json!({"targetId": "T"}));
//! let result = fut.await?;
//! ```

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use tokio::sync::mpsc;

use super::{Transport, TransportParts, TransportReceiver};
use crate::error::Result;

/// Builder for fake transport instances.
#[derive(Default)]
pub struct FakeTransportBuilder {}

impl FakeTransportBuilder {
	pub fn new() -> Self {
		Self {}
	}

	/// Returns [`TransportParts`] for a [`Connection`](crate::Connection) and a
	/// [`FakeTransportController`] that plays the browser side.
	pub fn build(self) -> (TransportParts, FakeTransportController) {
		let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
		let (message_tx, message_rx) = mpsc::unbounded_channel();
		let (sent_tx, sent_rx) = mpsc::unbounded_channel();

		let parts = TransportParts {
			sender: Box::new(FakeTransportSender { sent: sent_tx }),
			receiver: Box::new(FakeTransportReceiver { inbound_rx, message_tx }),
			message_rx,
		};

		let controller = FakeTransportController {
			inbound_tx,
			sent: sent_rx,
		};

		(parts, controller)
	}
}

/// Browser side of a fake transport.
pub struct FakeTransportController {
	inbound_tx: mpsc::UnboundedSender<Value>,
	sent: mpsc::UnboundedReceiver<Value>,
}

impl FakeTransportController {
	/// Injects a raw JSON message as if the browser had sent it.
	pub fn inject(&self, message: Value) {
		let _ = self.inbound_tx.send(message);
	}

	/// Injects a successful response to command `id`.
	pub fn inject_response(&self, id: u32, result: Value) {
		self.inject(serde_json::json!({ "id": id, "result": result }));
	}

	/// Injects an error response to command `id`.
	pub fn inject_error(&self, id: u32, code: i64, message: &str) {
		self.inject(serde_json::json!({
			"id": id,
			"error": { "code": code, "message": message }
		}));
	}

	/// Injects an event, optionally scoped to a target session.
	pub fn inject_event(&self, session_id: Option<&str>, method: &str, params: Value) {
		let mut event = serde_json::json!({ "method": method, "params": params });
		if let Some(session_id) = session_id {
			event["sessionId"] = Value::from(session_id);
		}
		self.inject(event);
	}

	/// Waits for the next message the connection sent.
	///
	/// Returns [`None`] once the connection side is gone.
	pub async fn next_sent(&mut self) -> Option<Value> {
		self.sent.recv().await
	}

	/// Simulates the browser dropping the socket.
	pub fn disconnect(self) {
		drop(self);
	}
}

struct FakeTransportSender {
	sent: mpsc::UnboundedSender<Value>,
}

impl Transport for FakeTransportSender {
	fn send(&mut self, message: Value) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		let _ = self.sent.send(message);
		Box::pin(async { Ok(()) })
	}
}

struct FakeTransportReceiver {
	inbound_rx: mpsc::UnboundedReceiver<Value>,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl TransportReceiver for FakeTransportReceiver {
	fn run(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
		let Self {
			mut inbound_rx,
			message_tx,
		} = *self;
		Box::pin(async move {
			while let Some(message) = inbound_rx.recv().await {
				if message_tx.send(message).is_err() {
					break;
				}
			}
			Ok(())
		})
	}
}
