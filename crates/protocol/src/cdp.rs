//! Chrome DevTools Protocol message envelopes.
//!
//! CDP is JSON-RPC-like: commands carry an `id`, responses echo it back with
//! either `result` or `error`, and events carry only `method` and `params`.
//! With flattened target sessions every command and event addressed to a page
//! also carries a `sessionId`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Command sent to the browser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
	/// Correlation id echoed back in the [`Response`].
	pub id: u32,
	/// Domain-qualified method name, e.g. `Page.navigate`.
	pub method: String,
	/// Method parameters.
	#[serde(default)]
	pub params: Value,
	/// Target session the command is addressed to, [`None`] for the browser itself.
	#[serde(rename = "sessionId", default, skip_serializing_if = "Option::is_none")]
	pub session_id: Option<String>,
}

/// Reply to a [`Request`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
	/// Id of the request this answers.
	pub id: u32,
	/// Success payload (mutually exclusive with `error`).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	/// Error payload (mutually exclusive with `result`).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<ErrorPayload>,
	/// Session the request was addressed to.
	#[serde(rename = "sessionId", default, skip_serializing_if = "Option::is_none")]
	pub session_id: Option<String>,
}

/// Error details inside a [`Response`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
	/// JSON-RPC style error code (e.g. `-32000` for generic server errors).
	pub code: i64,
	/// Human-readable message.
	pub message: String,
	/// Optional extra detail.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<String>,
}

/// Notification pushed by the browser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
	/// Domain-qualified event name, e.g. `Network.loadingFailed`.
	pub method: String,
	/// Event parameters.
	#[serde(default)]
	pub params: Value,
	/// Session that emitted the event, [`None`] for browser-level events.
	#[serde(rename = "sessionId", default, skip_serializing_if = "Option::is_none")]
	pub session_id: Option<String>,
}

/// Any inbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
	/// Has an `id` field.
	Response(Response),
	/// Has a `method` but no `id`.
	Event(Event),
	/// Anything else (forward-compatible catch-all).
	Unknown(Value),
}
