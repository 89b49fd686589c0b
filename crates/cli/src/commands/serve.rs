use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;

use super::build_driver;
use crate::config::AppConfig;
use crate::server;

pub async fn run(config: &AppConfig) -> Result<()> {
	let addr = config.listen_addr()?;
	let driver = build_driver(config)?;

	let listener = TcpListener::bind(addr)
		.await
		.with_context(|| format!("Failed to bind capture server to {addr}"))?;
	info!(%addr, "Serving capture endpoint");

	server::serve(listener, driver, server::shutdown_signal())
		.await
		.context("Capture server error")?;

	info!("Capture server stopped");
	Ok(())
}
