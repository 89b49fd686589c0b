use anyhow::Result;
use codecap::{CaptureRequest, to_response};

use super::build_driver;
use crate::cli::CaptureArgs;
use crate::config::AppConfig;

/// Runs one session and prints the response body. Returns whether a code
/// was captured.
pub async fn run(config: &AppConfig, args: CaptureArgs) -> Result<bool> {
	let driver = build_driver(config)?;
	let request = CaptureRequest::new(args.url, args.email, args.password);

	let response = to_response(&driver.capture_request(&request).await);
	println!("{}", serde_json::to_string(&response)?);

	Ok(response.is_success())
}
