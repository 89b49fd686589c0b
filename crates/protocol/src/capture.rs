//! Request and response bodies of the capture endpoint.
//!
//! The endpoint accepts one JSON object per request:
//!
//! ```json
//! { "url": "https://login.example.com/authorize?...", "email": "user@example.com", "password": "..." }
//! ```
//!
//! and answers with either `{ "code": "<authorization code>" }` or
//! `{ "error": "<message>", "code": <status> }`.

use serde::{Deserialize, Serialize};

/// Incoming capture request as it appears on the wire.
///
/// Every field is optional at this layer so that a body with missing fields
/// still deserializes and can be rejected with the regular "missing params"
/// failure instead of a serde error.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct CaptureRequest {
	/// Login URL the browser is sent to first.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
	/// Account identifier typed into the username field.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub email: Option<String>,
	/// Account secret typed into the password field.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub password: Option<String>,
}

impl CaptureRequest {
	/// Builds a request with all three fields set.
	pub fn new(url: impl Into<String>, email: impl Into<String>, password: impl Into<String>) -> Self {
		Self {
			url: Some(url.into()),
			email: Some(email.into()),
			password: Some(password.into()),
		}
	}
}

impl std::fmt::Debug for CaptureRequest {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CaptureRequest")
			.field("url", &self.url)
			.field("email", &self.email)
			.field("password", &self.password.as_ref().map(|_| "<redacted>"))
			.finish()
	}
}

/// Body returned by the capture endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CaptureResponse {
	/// The authorization code was captured.
	Success {
		/// Authorization code taken from the terminal redirect.
		code: String,
	},
	/// The session ended without a code.
	Failure {
		/// Caller-facing failure message.
		error: String,
		/// Coarse numeric classification (mirrors the HTTP status).
		#[serde(default, skip_serializing_if = "Option::is_none")]
		code: Option<u16>,
	},
}

impl CaptureResponse {
	/// Creates a success body.
	pub fn success(code: impl Into<String>) -> Self {
		Self::Success { code: code.into() }
	}

	/// Creates a failure body with a numeric classification.
	pub fn failure(error: impl Into<String>, code: u16) -> Self {
		Self::Failure {
			error: error.into(),
			code: Some(code),
		}
	}

	/// Returns `true` for [`CaptureResponse::Success`].
	pub fn is_success(&self) -> bool {
		matches!(self, Self::Success { .. })
	}
}
