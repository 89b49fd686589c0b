//! Validated session input.

use std::fmt;

use codecap_protocol::CaptureRequest;

use crate::error::{CaptureError, Result};

/// Login URL and credentials for one capture session.
///
/// Construction validates every field, so holding a `SessionRequest` means the
/// input is complete. Immutable once built.
#[derive(Clone)]
pub struct SessionRequest {
	target_url: String,
	username: String,
	secret: String,
}

impl SessionRequest {
	/// Validates and builds a request.
	///
	/// # Errors
	///
	/// Returns [`CaptureError::InvalidRequest`] naming the first field that is
	/// empty or whitespace-only.
	pub fn new(target_url: impl Into<String>, username: impl Into<String>, secret: impl Into<String>) -> Result<Self> {
		let request = Self {
			target_url: target_url.into(),
			username: username.into(),
			secret: secret.into(),
		};
		request.validate()?;
		Ok(request)
	}

	/// Builds a request from the wire body.
	pub fn from_wire(body: &CaptureRequest) -> Result<Self> {
		fn field(value: &Option<String>, name: &'static str) -> Result<String> {
			value
				.clone()
				.ok_or(CaptureError::InvalidRequest { field: name })
		}

		Self::new(
			field(&body.url, "url")?,
			field(&body.email, "email")?,
			field(&body.password, "password")?,
		)
	}

	fn validate(&self) -> Result<()> {
		for (value, name) in [
			(&self.target_url, "url"),
			(&self.username, "email"),
			(&self.secret, "password"),
		] {
			if value.trim().is_empty() {
				return Err(CaptureError::InvalidRequest { field: name });
			}
		}
		Ok(())
	}

	pub fn target_url(&self) -> &str {
		&self.target_url
	}

	pub fn username(&self) -> &str {
		&self.username
	}

	pub fn secret(&self) -> &str {
		&self.secret
	}
}

impl fmt::Debug for SessionRequest {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SessionRequest")
			.field("target_url", &self.target_url)
			.field("username", &"<redacted>")
			.field("secret", &"<redacted>")
			.finish()
	}
}
