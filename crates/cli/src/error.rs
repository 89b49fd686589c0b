use std::path::PathBuf;

use codecap::ProfileError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

/// Startup and configuration failures.
#[derive(Debug, Error)]
pub enum CliError {
	#[error("failed to read config {path}: {source}")]
	ConfigRead {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("invalid config {path}: {source}")]
	ConfigParse {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},

	#[error("invalid listen address '{0}'")]
	InvalidListen(String),

	#[error("no browser endpoint configured (use --endpoint, CODECAP_ENDPOINT, or \"endpoint\" in the config file)")]
	MissingEndpoint,

	#[error(transparent)]
	Endpoint(#[from] codecap_runtime::Error),

	#[error(transparent)]
	Profile(#[from] ProfileError),
}
