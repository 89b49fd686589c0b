//! Remote browser endpoint resolution.
//!
//! An endpoint is either a DevTools WebSocket URL (`ws://`, `wss://`) used
//! as-is, or an HTTP base URL (`http://`, `https://`) whose `/json/version`
//! document names the WebSocket URL. Hosted browser services authenticate with
//! a `token` query parameter, which is attached to every request and never
//! shown in logs.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::transport::WebSocketTransport;

const TOKEN_PARAM: &str = "token";
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// `/json/version` response subset.
#[derive(Debug, Deserialize)]
pub struct VersionInfo {
	#[serde(rename = "webSocketDebuggerUrl")]
	pub web_socket_debugger_url: String,
	#[serde(rename = "Browser", default)]
	pub browser: Option<String>,
}

/// Address of a remote headless browser.
#[derive(Clone)]
pub struct BrowserEndpoint {
	url: Url,
	token: Option<String>,
}

impl BrowserEndpoint {
	/// Parses an endpoint address.
	///
	/// # Errors
	///
	/// Returns [`Error::ConnectionFailed`] when the address is not a URL or
	/// uses a scheme other than `ws`, `wss`, `http`, or `https`.
	pub fn parse(address: &str) -> Result<Self> {
		let url = Url::parse(address.trim())
			.map_err(|e| Error::ConnectionFailed(format!("Invalid browser endpoint: {e}")))?;
		match url.scheme() {
			"ws" | "wss" | "http" | "https" => Ok(Self { url, token: None }),
			other => Err(Error::ConnectionFailed(format!(
				"Unsupported browser endpoint scheme '{other}' (expected ws, wss, http, or https)"
			))),
		}
	}

	/// Sets the access token sent as the `token` query parameter.
	pub fn with_token(mut self, token: impl Into<String>) -> Self {
		let token = token.into();
		self.token = (!token.is_empty()).then_some(token);
		self
	}

	/// Returns true when a token is configured.
	pub fn has_token(&self) -> bool {
		self.token.is_some()
	}

	/// Resolves the DevTools WebSocket URL, running discovery for HTTP endpoints.
	///
	/// # Errors
	///
	/// Returns [`Error::Rejected`] when discovery answers with a client or
	/// server error status, [`Error::Discovery`] for unreachable or malformed
	/// discovery documents.
	pub async fn resolve(&self) -> Result<String> {
		match self.url.scheme() {
			"ws" | "wss" => Ok(self.authorize(self.url.clone()).into()),
			_ => {
				let info = self.fetch_version().await?;
				tracing::debug!(browser = ?info.browser, "Discovered DevTools endpoint");
				let ws = Url::parse(&info.web_socket_debugger_url)
					.map_err(|e| Error::Discovery(format!("Invalid webSocketDebuggerUrl: {e}")))?;
				Ok(self.authorize(ws).into())
			}
		}
	}

	/// Resolves the endpoint, opens the socket, and spawns a [`Connection`] over it.
	pub async fn connect(&self) -> Result<(Arc<Connection>, tokio::task::JoinHandle<()>)> {
		let ws_url = self.resolve().await?;
		tracing::debug!(endpoint = %self, "Connecting to browser");
		let (transport, message_rx) = WebSocketTransport::connect(&ws_url).await?;
		Ok(Connection::spawn(transport.into_transport_parts(message_rx)))
	}

	async fn fetch_version(&self) -> Result<VersionInfo> {
		let mut url = self.url.clone();
		url.set_path(&format!("{}/json/version", self.url.path().trim_end_matches('/')));
		let url = self.authorize(url);

		let client = reqwest::Client::builder()
			.timeout(DISCOVERY_TIMEOUT)
			.build()
			.map_err(|e| Error::Discovery(format!("Failed to create HTTP client: {e}")))?;

		let response = client
			.get(url)
			.send()
			.await
			.map_err(|e| Error::Discovery(format!("{}: {}", self, e.without_url())))?;

		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			let reason = status.canonical_reason().unwrap_or_default();
			let message = if body.trim().is_empty() {
				reason.to_string()
			} else {
				format!("{reason}: {}", body.trim())
			};
			return Err(Error::Rejected {
				status: status.as_u16(),
				message,
			});
		}

		response
			.json()
			.await
			.map_err(|e| Error::Discovery(format!("Failed to parse /json/version: {e}")))
	}

	fn authorize(&self, mut url: Url) -> Url {
		let Some(token) = &self.token else {
			return url;
		};
		let kept: Vec<(String, String)> = url
			.query_pairs()
			.filter(|(k, _)| k != TOKEN_PARAM)
			.map(|(k, v)| (k.into_owned(), v.into_owned()))
			.collect();
		url.query_pairs_mut()
			.clear()
			.extend_pairs(kept)
			.append_pair(TOKEN_PARAM, token);
		url
	}
}

impl fmt::Display for BrowserEndpoint {
	/// Writes the endpoint with any token value masked.
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut shown = self.url.clone();
		let has_query_token = shown.query_pairs().any(|(k, _)| k == TOKEN_PARAM);
		if has_query_token || self.token.is_some() {
			let kept: Vec<(String, String)> = shown
				.query_pairs()
				.filter(|(k, _)| k != TOKEN_PARAM)
				.map(|(k, v)| (k.into_owned(), v.into_owned()))
				.collect();
			shown
				.query_pairs_mut()
				.clear()
				.extend_pairs(kept)
				.append_pair(TOKEN_PARAM, "***");
		}
		write!(f, "{shown}")
	}
}

impl fmt::Debug for BrowserEndpoint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("BrowserEndpoint")
			.field("url", &self.to_string())
			.field("token", &self.token.as_ref().map(|_| "<redacted>"))
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use axum::extract::Query;
	use axum::http::StatusCode;
	use axum::routing::get;
	use axum::{Json, Router};
	use serde_json::json;

	use super::*;

	async fn serve(app: Router) -> String {
		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
		format!("http://{addr}")
	}

	#[tokio::test]
	async fn websocket_endpoint_is_used_directly() {
		let endpoint = BrowserEndpoint::parse("wss://chrome.example.com").unwrap();
		assert_eq!(endpoint.resolve().await.unwrap(), "wss://chrome.example.com/");
	}

	#[tokio::test]
	async fn token_is_appended_once() {
		let endpoint = BrowserEndpoint::parse("wss://chrome.example.com/?token=old&stealth=true")
			.unwrap()
			.with_token("secret");
		let resolved = Url::parse(&endpoint.resolve().await.unwrap()).unwrap();
		let pairs: Vec<(String, String)> = resolved.query_pairs().into_owned().collect();
		assert_eq!(
			pairs,
			vec![("stealth".to_string(), "true".to_string()), ("token".to_string(), "secret".to_string())]
		);
	}

	#[test]
	fn empty_token_is_ignored() {
		let endpoint = BrowserEndpoint::parse("ws://127.0.0.1:9222").unwrap().with_token("");
		assert!(!endpoint.has_token());
	}

	#[test]
	fn display_masks_token() {
		let endpoint = BrowserEndpoint::parse("wss://chrome.example.com")
			.unwrap()
			.with_token("secret");
		let shown = endpoint.to_string();
		assert!(!shown.contains("secret"));
		assert!(shown.contains("token=***"));
		assert!(!format!("{endpoint:?}").contains("secret"));
	}

	#[test]
	fn display_masks_inline_token() {
		let endpoint = BrowserEndpoint::parse("wss://chrome.example.com/?token=inline").unwrap();
		assert!(!endpoint.to_string().contains("inline"));
	}

	#[test]
	fn unsupported_scheme_is_rejected() {
		let err = BrowserEndpoint::parse("ftp://chrome.example.com").unwrap_err();
		assert!(err.to_string().contains("ftp"));
		assert!(BrowserEndpoint::parse("not a url").is_err());
	}

	#[tokio::test]
	async fn http_endpoint_discovers_websocket_url() {
		let app = Router::new().route(
			"/json/version",
			get(|Query(query): Query<HashMap<String, String>>| async move {
				assert_eq!(query.get("token").map(String::as_str), Some("secret"));
				Json(json!({
					"Browser": "HeadlessChrome/120.0",
					"webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/browser/abc"
				}))
			}),
		);
		let base = serve(app).await;

		let endpoint = BrowserEndpoint::parse(&base).unwrap().with_token("secret");
		let resolved = endpoint.resolve().await.unwrap();
		assert_eq!(resolved, "ws://127.0.0.1:9222/devtools/browser/abc?token=secret");
	}

	#[tokio::test]
	async fn discovery_rate_limit_is_rejected_with_status() {
		let app = Router::new().route(
			"/json/version",
			get(|| async { (StatusCode::TOO_MANY_REQUESTS, "Too many concurrent sessions") }),
		);
		let base = serve(app).await;

		let err = BrowserEndpoint::parse(&base).unwrap().resolve().await.unwrap_err();
		assert_eq!(err.http_status(), Some(429));
		assert!(err.to_string().contains("Too many concurrent sessions"));
	}

	#[tokio::test]
	async fn malformed_discovery_document_is_discovery_error() {
		let app = Router::new().route("/json/version", get(|| async { Json(json!({"Browser": "x"})) }));
		let base = serve(app).await;

		let err = BrowserEndpoint::parse(&base).unwrap().resolve().await.unwrap_err();
		assert!(matches!(err, Error::Discovery(_)));
	}
}
