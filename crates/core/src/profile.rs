//! Provider profiles: selectors, redirect marker, and step budgets.
//!
//! A profile captures everything that differs between identity providers.
//! Profiles are JSON documents; any field left out falls back to the built-in
//! `gigya` profile, so a file only has to name what it changes:
//!
//! ```json
//! {
//!   "name": "acme",
//!   "selectors": { "consent": null },
//!   "timeouts": { "grace_ms": 5000 }
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use codecap_protocol::{Viewport, WaitUntil};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::observer::RedirectMatcher;

/// Name of the built-in profile.
pub const DEFAULT_PROFILE: &str = "gigya";

/// Desktop user agent presented to login pages.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

#[derive(Debug, Error)]
pub enum ProfileError {
	#[error("Failed to read profile {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("Failed to parse profile: {0}")]
	Parse(#[from] serde_json::Error),

	#[error("Invalid profile '{name}': {reason}")]
	Invalid { name: String, reason: String },

	#[error("Unknown profile '{0}' (built-in: {DEFAULT_PROFILE})")]
	Unknown(String),
}

/// CSS selectors of the login form and the optional consent control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Selectors {
	pub username: String,
	pub password: String,
	pub submit: String,
	/// Authorize/consent button shown after login by some flows.
	pub consent: Option<String>,
}

impl Default for Selectors {
	fn default() -> Self {
		Self {
			username: r#"#gigya-login-form input[name="username"]"#.to_string(),
			password: r#"#gigya-login-form input[name="password"]"#.to_string(),
			submit: r#"#gigya-login-form input[type="submit"]"#.to_string(),
			consent: Some(r#"#cvs_from input[type="submit"]"#.to_string()),
		}
	}
}

/// Per-step budgets in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
	/// Initial navigation. Fatal on expiry.
	pub navigation_ms: u64,
	/// Each login form control. Fatal on expiry.
	pub form_ms: u64,
	/// Navigation after submitting the form. Tolerated.
	pub post_submit_ms: u64,
	/// Consent control. Absence tolerated.
	pub consent_ms: u64,
	/// Wait for the code after the UI steps.
	pub grace_ms: u64,
	/// Delay between typed characters.
	pub keystroke_delay_ms: u64,
}

impl Default for Timeouts {
	fn default() -> Self {
		Self {
			navigation_ms: 30_000,
			form_ms: 20_000,
			post_submit_ms: 30_000,
			consent_ms: 20_000,
			grace_ms: 3_000,
			keystroke_delay_ms: 100,
		}
	}
}

impl Timeouts {
	pub fn navigation(&self) -> Duration {
		Duration::from_millis(self.navigation_ms)
	}

	pub fn form(&self) -> Duration {
		Duration::from_millis(self.form_ms)
	}

	pub fn post_submit(&self) -> Duration {
		Duration::from_millis(self.post_submit_ms)
	}

	pub fn consent(&self) -> Duration {
		Duration::from_millis(self.consent_ms)
	}

	pub fn grace(&self) -> Duration {
		Duration::from_millis(self.grace_ms)
	}

	pub fn keystroke_delay(&self) -> Duration {
		Duration::from_millis(self.keystroke_delay_ms)
	}
}

/// Everything provider-specific about a capture flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderProfile {
	pub name: String,
	pub selectors: Selectors,
	pub redirect: RedirectMatcher,
	pub wait_until: WaitUntil,
	pub viewport: Viewport,
	pub user_agent: String,
	pub timeouts: Timeouts,
}

impl Default for ProviderProfile {
	fn default() -> Self {
		Self {
			name: DEFAULT_PROFILE.to_string(),
			selectors: Selectors::default(),
			redirect: RedirectMatcher::default(),
			wait_until: WaitUntil::NetworkAlmostIdle,
			viewport: Viewport::default(),
			user_agent: DEFAULT_USER_AGENT.to_string(),
			timeouts: Timeouts::default(),
		}
	}
}

impl ProviderProfile {
	/// Looks up a built-in profile by name.
	pub fn builtin(name: &str) -> Result<Self, ProfileError> {
		match name {
			DEFAULT_PROFILE => Ok(Self::default()),
			other => Err(ProfileError::Unknown(other.to_string())),
		}
	}

	/// Parses and validates a JSON profile.
	pub fn from_json(json: &str) -> Result<Self, ProfileError> {
		let profile: Self = serde_json::from_str(json)?;
		profile.validate()?;
		Ok(profile)
	}

	/// Reads and validates a JSON profile file.
	pub fn from_path(path: &Path) -> Result<Self, ProfileError> {
		let json = std::fs::read_to_string(path).map_err(|source| ProfileError::Io {
			path: path.to_path_buf(),
			source,
		})?;
		Self::from_json(&json)
	}

	/// Resolves a profile reference: a built-in name or a path to a JSON file.
	pub fn load(reference: &str) -> Result<Self, ProfileError> {
		let path = Path::new(reference);
		if path.extension().is_some_and(|ext| ext == "json") || path.is_file() {
			Self::from_path(path)
		} else {
			Self::builtin(reference)
		}
	}

	/// Checks that every required selector and redirect field is set.
	pub fn validate(&self) -> Result<(), ProfileError> {
		let invalid = |reason: &str| ProfileError::Invalid {
			name: self.name.clone(),
			reason: reason.to_string(),
		};

		if self.selectors.username.trim().is_empty() {
			return Err(invalid("selectors.username is empty"));
		}
		if self.selectors.password.trim().is_empty() {
			return Err(invalid("selectors.password is empty"));
		}
		if self.selectors.submit.trim().is_empty() {
			return Err(invalid("selectors.submit is empty"));
		}
		if self.selectors.consent.as_deref().is_some_and(|s| s.trim().is_empty()) {
			return Err(invalid("selectors.consent is empty (use null to skip consent)"));
		}
		if self.redirect.prefix.is_empty() {
			return Err(invalid("redirect.prefix is empty"));
		}
		if self.redirect.param.is_empty() {
			return Err(invalid("redirect.param is empty"));
		}
		if self.viewport.width == 0 || self.viewport.height == 0 {
			return Err(invalid("viewport must be non-zero"));
		}
		Ok(())
	}
}
