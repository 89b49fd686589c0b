//! Error types for the codecap runtime.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to the remote browser.
#[derive(Debug, Error)]
pub enum Error {
	/// Failed to establish the WebSocket connection.
	#[error("Failed to connect to browser endpoint: {0}")]
	ConnectionFailed(String),

	/// The endpoint answered the WebSocket handshake with an HTTP error.
	///
	/// Hosted browser services report quota and concurrency limits this way.
	#[error("Browser endpoint rejected the connection: HTTP {status} {message}")]
	Rejected { status: u16, message: String },

	/// Endpoint discovery (`/json/version`) failed.
	#[error("Endpoint discovery failed: {0}")]
	Discovery(String),

	/// Transport-level error (WebSocket read/write).
	#[error("Transport error: {0}")]
	TransportError(String),

	/// Protocol-level error (unexpected message shape).
	#[error("Protocol error: {0}")]
	ProtocolError(String),

	/// The browser answered a command with an error.
	#[error("{method} failed: {message} ({code})")]
	Remote {
		/// Command that failed
		method: String,
		/// CDP error code
		code: i64,
		/// Human-readable error message
		message: String,
	},

	/// I/O error.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	/// Timeout waiting for an operation.
	#[error("Timeout: {0}")]
	Timeout(String),

	/// Navigation did not reach the requested load state in time.
	#[error("Navigation timeout after {duration_ms}ms navigating to '{url}'")]
	NavigationTimeout { url: String, duration_ms: u64 },

	/// The browser refused or aborted a navigation.
	#[error("Navigation to '{url}' failed: {reason}")]
	NavigationFailed { url: String, reason: String },

	/// Page script threw while being evaluated.
	#[error("Evaluation failed: {0}")]
	Evaluation(String),

	/// Element not found by selector.
	#[error("Element not found: selector '{0}'")]
	ElementNotFound(String),

	/// Connection or page already closed.
	#[error("Channel closed unexpectedly")]
	ChannelClosed,
}

impl Error {
	/// Returns true if this is a timeout error.
	pub fn is_timeout(&self) -> bool {
		matches!(self, Error::Timeout(_) | Error::NavigationTimeout { .. })
	}

	/// Returns true if the connection to the browser is gone.
	pub fn is_closed(&self) -> bool {
		match self {
			Error::ChannelClosed => true,
			Error::Remote { message, .. } => {
				message.contains("Target closed") || message.contains("Session with given id not found")
			}
			_ => false,
		}
	}

	/// HTTP status reported by the endpoint, when the failure carried one.
	pub fn http_status(&self) -> Option<u16> {
		match self {
			Error::Rejected { status, .. } => Some(*status),
			_ => None,
		}
	}

	/// Text supplied by the remote service itself, without URLs or
	/// selectors added on this side.
	pub fn remote_message(&self) -> Option<&str> {
		match self {
			Error::Rejected { message, .. } | Error::Remote { message, .. } => Some(message.as_str()),
			Error::ConnectionFailed(message) => Some(message.as_str()),
			_ => None,
		}
	}
}
