//! Application configuration.
//!
//! Values are layered: built-in defaults, then an optional JSON file, then
//! environment variables, then command-line flags. Later layers only replace
//! fields they actually set.

use std::fmt;
use std::net::SocketAddr;
use std::path::Path;

use codecap::{DEFAULT_PROFILE, ProviderProfile};
use codecap_runtime::BrowserEndpoint;
use serde::Deserialize;

use crate::error::{CliError, Result};

pub const DEFAULT_LISTEN: &str = "127.0.0.1:8080";

pub const ENV_ENDPOINT: &str = "CODECAP_ENDPOINT";
pub const ENV_TOKEN: &str = "CODECAP_TOKEN";
/// Token variable understood by hosted browser services; used when
/// [`ENV_TOKEN`] is unset.
pub const ENV_TOKEN_FALLBACK: &str = "BROWSERLESS_TOKEN";
pub const ENV_LISTEN: &str = "CODECAP_LISTEN";

#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
	/// Browser endpoint, `ws(s)://` or `http(s)://`.
	pub endpoint: Option<String>,
	/// API token appended to the endpoint.
	pub token: Option<String>,
	/// Built-in profile name or path to a JSON profile.
	pub profile: Option<String>,
	/// Socket address the HTTP server binds.
	pub listen: Option<String>,
}

/// Command-line values that replace configured ones.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
	pub endpoint: Option<String>,
	pub token: Option<String>,
	pub profile: Option<String>,
	pub listen: Option<String>,
}

impl AppConfig {
	pub fn from_path(path: &Path) -> Result<Self> {
		let json = std::fs::read_to_string(path).map_err(|source| CliError::ConfigRead {
			path: path.to_path_buf(),
			source,
		})?;
		serde_json::from_str(&json).map_err(|source| CliError::ConfigParse {
			path: path.to_path_buf(),
			source,
		})
	}

	/// Loads every layer using the process environment.
	pub fn load(path: Option<&Path>, overrides: Overrides) -> Result<Self> {
		let base = match path {
			Some(path) => Self::from_path(path)?,
			None => Self::default(),
		};
		Ok(base.merge_env(env_var).merge(overrides))
	}

	/// Applies environment values from `lookup`. Empty values are ignored.
	pub fn merge_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
		let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

		if let Some(endpoint) = get(ENV_ENDPOINT) {
			self.endpoint = Some(endpoint);
		}
		if let Some(token) = get(ENV_TOKEN).or_else(|| get(ENV_TOKEN_FALLBACK)) {
			self.token = Some(token);
		}
		if let Some(listen) = get(ENV_LISTEN) {
			self.listen = Some(listen);
		}
		self
	}

	pub fn merge(mut self, overrides: Overrides) -> Self {
		self.endpoint = overrides.endpoint.or(self.endpoint);
		self.token = overrides.token.or(self.token);
		self.profile = overrides.profile.or(self.profile);
		self.listen = overrides.listen.or(self.listen);
		self
	}

	pub fn browser_endpoint(&self) -> Result<BrowserEndpoint> {
		let address = self.endpoint.as_deref().ok_or(CliError::MissingEndpoint)?;
		let endpoint = BrowserEndpoint::parse(address)?;
		Ok(match &self.token {
			Some(token) => endpoint.with_token(token.clone()),
			None => endpoint,
		})
	}

	pub fn provider_profile(&self) -> Result<ProviderProfile> {
		Ok(ProviderProfile::load(self.profile.as_deref().unwrap_or(DEFAULT_PROFILE))?)
	}

	pub fn listen_addr(&self) -> Result<SocketAddr> {
		let listen = self.listen.as_deref().unwrap_or(DEFAULT_LISTEN);
		listen.parse().map_err(|_| CliError::InvalidListen(listen.to_string()))
	}
}

impl fmt::Debug for AppConfig {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("AppConfig")
			.field("endpoint", &self.endpoint)
			.field("token", &self.token.as_ref().map(|_| "<redacted>"))
			.field("profile", &self.profile)
			.field("listen", &self.listen)
			.finish()
	}
}

fn env_var(name: &str) -> Option<String> {
	std::env::var(name).ok()
}
