mod capture;
mod serve;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use codecap::{CdpBackend, SessionDriver};
use tracing::{info, warn};

use crate::cli::{Cli, Commands};
use crate::config::AppConfig;

pub async fn dispatch(cli: Cli) -> Result<ExitCode> {
	let overrides = cli.overrides();
	let config = AppConfig::load(cli.config.as_deref(), overrides).context("Failed to load configuration")?;

	match cli.command {
		Commands::Serve(_) => serve::run(&config).await.map(|()| ExitCode::SUCCESS),
		Commands::Capture(args) => {
			let captured = capture::run(&config, args).await?;
			Ok(if captured { ExitCode::SUCCESS } else { ExitCode::FAILURE })
		}
	}
}

/// Builds a session driver against the configured browser endpoint.
pub fn build_driver(config: &AppConfig) -> Result<SessionDriver> {
	let endpoint = config.browser_endpoint()?;
	let profile = config.provider_profile()?;

	if !endpoint.has_token() {
		warn!(%endpoint, "No API token configured for the browser endpoint");
	}
	info!(%endpoint, profile = %profile.name, "Using browser endpoint");

	Ok(SessionDriver::new(Arc::new(CdpBackend::new(endpoint)), profile))
}
