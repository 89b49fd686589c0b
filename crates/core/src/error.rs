//! Terminal failure reasons of a capture session.

use codecap_runtime::Error as RuntimeError;
use thiserror::Error;

/// Result type alias for capture operations.
pub type Result<T> = std::result::Result<T, CaptureError>;

/// Message callers see for quota and concurrency rejections.
pub const RATE_LIMIT_MESSAGE: &str = "rate limit exceeded";

/// Why a session ended without an authorization code.
#[derive(Debug, Error)]
pub enum CaptureError {
	/// A required input field was missing or empty. Raised before any
	/// browser resource is acquired.
	#[error("Missing required params: {field}")]
	InvalidRequest { field: &'static str },

	/// A login or consent control did not appear within its wait budget.
	#[error("Form control '{selector}' not found within {timeout_ms}ms")]
	FormNotFound { selector: String, timeout_ms: u64 },

	/// The initial navigation did not stabilize within its budget.
	#[error("Navigation to '{url}' did not settle within {timeout_ms}ms")]
	NavigationTimeout { url: String, timeout_ms: u64 },

	/// Every UI step completed but no terminal redirect carried a code.
	#[error("Code not found after authentication")]
	CodeNotCaptured,

	/// The browser backend failed or refused service.
	#[error("Browser service error during {step}: {source}")]
	RemoteService {
		step: &'static str,
		#[source]
		source: RuntimeError,
	},

	/// A matching redirect had a URL that could not be parsed. Logged by the
	/// observer; never the outcome of a session.
	#[error("Malformed redirect '{url}': {reason}")]
	MalformedRedirect { url: String, reason: String },

	/// A fault (panic) inside the session.
	#[error("Internal error: {0}")]
	Internal(String),
}

impl CaptureError {
	pub(crate) fn remote(step: &'static str, source: RuntimeError) -> Self {
		Self::RemoteService { step, source }
	}

	/// Returns true when the backend signalled a quota or rate limit.
	pub fn is_rate_limited(&self) -> bool {
		match self {
			Self::RemoteService { source, .. } => {
				source.http_status() == Some(429) || source.remote_message().is_some_and(looks_rate_limited)
			}
			_ => false,
		}
	}

	/// Coarse numeric classification, used as the HTTP status.
	pub fn status(&self) -> u16 {
		match self {
			Self::InvalidRequest { .. } => 400,
			Self::FormNotFound { .. } => 502,
			Self::NavigationTimeout { .. } => 504,
			Self::CodeNotCaptured => 422,
			Self::RemoteService { .. } if self.is_rate_limited() => 429,
			Self::RemoteService { .. } | Self::MalformedRedirect { .. } => 502,
			Self::Internal(_) => 500,
		}
	}

	/// Caller-facing message.
	///
	/// Rate-limit signals are normalized to [`RATE_LIMIT_MESSAGE`]; internal
	/// fault details are withheld.
	pub fn user_message(&self) -> String {
		match self {
			Self::InvalidRequest { .. } => "Missing required params".to_string(),
			Self::RemoteService { .. } if self.is_rate_limited() => RATE_LIMIT_MESSAGE.to_string(),
			Self::Internal(_) => "Internal error".to_string(),
			other => other.to_string(),
		}
	}

	/// Short machine-readable name of the failure kind.
	pub fn kind(&self) -> &'static str {
		match self {
			Self::InvalidRequest { .. } => "invalid_request",
			Self::FormNotFound { .. } => "form_not_found",
			Self::NavigationTimeout { .. } => "navigation_timeout",
			Self::CodeNotCaptured => "code_not_captured",
			Self::RemoteService { .. } => "remote_service_error",
			Self::MalformedRedirect { .. } => "malformed_redirect",
			Self::Internal(_) => "internal",
		}
	}
}

/// `429` counts only as a standalone token, so ids and ports containing
/// those digits do not match.
fn looks_rate_limited(message: &str) -> bool {
	let lower = message.to_ascii_lowercase();
	lower.split(|c: char| !c.is_ascii_alphanumeric()).any(|token| token == "429")
		|| lower.contains("too many requests")
		|| lower.contains("rate limit")
		|| lower.contains("quota")
}
