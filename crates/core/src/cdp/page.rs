//! [`CdpPage`]: one DevTools target driven over a flattened session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use codecap_protocol::{Viewport, WaitUntil};
use codecap_runtime::{Connection, Error, Result};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::broadcast;

use super::events::{EventPump, LoadState, PageShared};
use super::input;
use crate::browser::{BrowserPage, NavigationEvent};

/// Capacity of each page's navigation event stream.
const NAVIGATION_BUFFER: usize = 256;

/// Budget for `Target.closeTarget` during close.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval between selector probes.
const SELECTOR_POLL: Duration = Duration::from_millis(100);

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTargetResult {
	target_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttachResult {
	session_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NavigateResult {
	#[serde(default)]
	loader_id: Option<String>,
	#[serde(default)]
	error_text: Option<String>,
}

/// A browser tab reached through a DevTools connection.
///
/// The page owns its connection. [`close`](BrowserPage::close) closes the
/// target and the socket; dropping an unclosed page does the same in the
/// background.
pub struct CdpPage {
	connection: Arc<Connection>,
	target_id: String,
	session_id: String,
	shared: Arc<PageShared>,
	/// Load generation current when the last click started.
	click_generation: AtomicU64,
	closed: AtomicBool,
}

impl CdpPage {
	/// Creates a blank target on `connection`, attaches to it, and enables the
	/// domains the page needs.
	pub async fn open(connection: Arc<Connection>) -> Result<Self> {
		// Subscribe before attaching so no session event is missed.
		let events = connection.subscribe();

		let created: CreateTargetResult = serde_json::from_value(
			connection
				.send_command(None, "Target.createTarget", json!({ "url": "about:blank" }))
				.await?,
		)?;

		let attached: AttachResult = serde_json::from_value(
			connection
				.send_command(
					None,
					"Target.attachToTarget",
					json!({ "targetId": created.target_id, "flatten": true }),
				)
				.await?,
		)?;

		tracing::debug!(target = %created.target_id, session = %attached.session_id, "Attached to page target");

		let shared = Arc::new(PageShared::new(NAVIGATION_BUFFER));
		tokio::spawn(
			EventPump::new(attached.session_id.clone(), created.target_id.clone()).run(events, Arc::clone(&shared)),
		);

		let page = Self {
			connection,
			target_id: created.target_id,
			session_id: attached.session_id,
			shared,
			click_generation: AtomicU64::new(0),
			closed: AtomicBool::new(false),
		};

		page.command("Page.enable", json!({})).await?;
		page.command("Page.setLifecycleEventsEnabled", json!({ "enabled": true }))
			.await?;
		page.command("Network.enable", json!({})).await?;
		page.command("Runtime.enable", json!({})).await?;

		Ok(page)
	}

	pub fn target_id(&self) -> &str {
		&self.target_id
	}

	async fn command(&self, method: &str, params: Value) -> Result<Value> {
		self.connection
			.send_command(Some(&self.session_id), method, params)
			.await
	}

	/// Evaluates `expression` and returns its JSON value.
	pub(crate) async fn evaluate(&self, expression: &str) -> Result<Value> {
		let result = self
			.command(
				"Runtime.evaluate",
				json!({
					"expression": expression,
					"returnByValue": true,
					"awaitPromise": true,
				}),
			)
			.await?;

		if let Some(details) = result.get("exceptionDetails") {
			let text = details
				.pointer("/exception/description")
				.or_else(|| details.get("text"))
				.and_then(Value::as_str)
				.unwrap_or("uncaught exception");
			return Err(Error::Evaluation(text.to_string()));
		}

		Ok(result
			.pointer("/result/value")
			.cloned()
			.unwrap_or(Value::Null))
	}

	pub(crate) async fn dispatch_input(&self, method: &str, params: Value) -> Result<()> {
		self.command(method, params).await.map(|_| ())
	}

	async fn wait_for_load<F>(&self, timeout: Duration, url: &str, predicate: F) -> Result<()>
	where
		F: FnMut(&LoadState) -> bool,
	{
		let mut rx = self.shared.load.subscribe();
		match tokio::time::timeout(timeout, rx.wait_for(predicate)).await {
			Ok(Ok(_)) => Ok(()),
			Ok(Err(_)) => Err(Error::ChannelClosed),
			Err(_) => Err(Error::NavigationTimeout {
				url: url.to_string(),
				duration_ms: timeout.as_millis() as u64,
			}),
		}
	}

	async fn poll_selector(&self, probe: &str, selector: &str) -> Result<()> {
		loop {
			self.ensure_open()?;
			match self.evaluate(probe).await {
				Ok(Value::Bool(true)) => return Ok(()),
				Ok(_) => {}
				Err(err) if err.is_closed() => return Err(err),
				// Execution contexts come and go while the page navigates.
				Err(err) => tracing::trace!(error = %err, selector, "Selector probe failed"),
			}
			tokio::time::sleep(SELECTOR_POLL).await;
		}
	}

	fn ensure_open(&self) -> Result<()> {
		if self.closed.load(Ordering::SeqCst) || self.connection.is_closed() {
			Err(Error::ChannelClosed)
		} else {
			Ok(())
		}
	}
}

#[async_trait]
impl BrowserPage for CdpPage {
	async fn set_viewport(&self, viewport: Viewport) -> Result<()> {
		self.command(
			"Emulation.setDeviceMetricsOverride",
			json!({
				"width": viewport.width,
				"height": viewport.height,
				"deviceScaleFactor": 1,
				"mobile": false,
			}),
		)
		.await
		.map(|_| ())
	}

	async fn set_user_agent(&self, user_agent: &str) -> Result<()> {
		self.command("Network.setUserAgentOverride", json!({ "userAgent": user_agent }))
			.await
			.map(|_| ())
	}

	fn navigation_events(&self) -> broadcast::Receiver<NavigationEvent> {
		match self.shared.navigation.lock().as_ref() {
			Some(tx) => tx.subscribe(),
			None => {
				// Closed page: hand out a stream that is already over.
				let (tx, rx) = broadcast::channel(1);
				drop(tx);
				rx
			}
		}
	}

	async fn goto(&self, url: &str, wait_until: WaitUntil, timeout: Duration) -> Result<()> {
		self.ensure_open()?;
		let started = tokio::time::Instant::now();

		let navigated = tokio::time::timeout(timeout, self.command("Page.navigate", json!({ "url": url })))
			.await
			.map_err(|_| Error::NavigationTimeout {
				url: url.to_string(),
				duration_ms: timeout.as_millis() as u64,
			})??;
		let navigated: NavigateResult = serde_json::from_value(navigated)?;

		if let Some(reason) = navigated.error_text.filter(|t| !t.is_empty()) {
			return Err(Error::NavigationFailed {
				url: url.to_string(),
				reason,
			});
		}

		// Same-document navigations have no loader to wait for.
		let Some(loader_id) = navigated.loader_id else {
			return Ok(());
		};

		let remaining = timeout.saturating_sub(started.elapsed());
		let event = wait_until.lifecycle_event();
		self.wait_for_load(remaining, url, |state| state.loader_reached(&loader_id, event))
			.await
			.map_err(|err| match err {
				Error::NavigationTimeout { url, .. } => Error::NavigationTimeout {
					url,
					duration_ms: timeout.as_millis() as u64,
				},
				other => other,
			})
	}

	async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
		let probe = input::selector_probe(selector)?;
		tokio::time::timeout(timeout, self.poll_selector(&probe, selector))
			.await
			.map_err(|_| {
				Error::Timeout(format!(
					"{}ms waiting for selector '{selector}'",
					timeout.as_millis()
				))
			})?
	}

	async fn type_text(&self, selector: &str, text: &str, delay: Duration) -> Result<()> {
		self.ensure_open()?;
		input::focus(self, selector).await?;
		input::type_characters(self, text, delay).await
	}

	async fn click(&self, selector: &str) -> Result<()> {
		self.ensure_open()?;
		self.click_generation
			.store(self.shared.load.borrow().generation, Ordering::SeqCst);
		let (x, y) = input::element_center(self, selector).await?;
		input::click_at(self, x, y).await
	}

	async fn wait_for_navigation(&self, wait_until: WaitUntil, timeout: Duration) -> Result<()> {
		self.ensure_open()?;
		let baseline = self.click_generation.load(Ordering::SeqCst);
		let event = wait_until.lifecycle_event();
		self.wait_for_load(timeout, "<post-click navigation>", |state| {
			state.generation > baseline && state.has_reached(event)
		})
		.await
	}

	async fn close(&self) -> Result<()> {
		if self.closed.swap(true, Ordering::SeqCst) {
			return Ok(());
		}

		let result = if self.connection.is_closed() {
			Ok(())
		} else {
			match tokio::time::timeout(
				CLOSE_TIMEOUT,
				self.connection.send_command(
					None,
					"Target.closeTarget",
					json!({ "targetId": self.target_id }),
				),
			)
			.await
			{
				Ok(Ok(_)) => Ok(()),
				Ok(Err(err)) if err.is_closed() => Ok(()),
				Ok(Err(err)) => Err(err),
				Err(_) => Err(Error::Timeout("closing target".to_string())),
			}
		};

		self.shared.shut_down();
		self.connection.close();
		tracing::debug!(target = %self.target_id, "Page closed");
		result
	}
}

impl Drop for CdpPage {
	fn drop(&mut self) {
		if self.closed.swap(true, Ordering::SeqCst) {
			return;
		}

		self.shared.shut_down();
		let connection = Arc::clone(&self.connection);
		let target_id = self.target_id.clone();

		match tokio::runtime::Handle::try_current() {
			Ok(handle) => {
				handle.spawn(async move {
					let close = connection.send_command(None, "Target.closeTarget", json!({ "targetId": target_id }));
					match tokio::time::timeout(CLOSE_TIMEOUT, close).await {
						Ok(Ok(_)) => {}
						Ok(Err(err)) => tracing::debug!(error = %err, "Background close of dropped page failed"),
						Err(_) => tracing::debug!("Background close of dropped page timed out"),
					}
					connection.close();
				});
			}
			Err(_) => connection.close(),
		}
	}
}
