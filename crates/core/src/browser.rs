//! The narrow browser interface the session driver is written against.
//!
//! [`BrowserBackend`] hands out exclusively owned [`BrowserPage`]s. The CDP
//! implementation lives in [`crate::cdp`]; tests substitute scripted fakes.

use std::time::Duration;

use async_trait::async_trait;
use codecap_protocol::{Viewport, WaitUntil};
use codecap_runtime::Result;
use tokio::sync::broadcast;

/// Result of one resource load attempted by the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
	/// The resource loaded.
	Succeeded,
	/// The browser could not complete the load (unresolvable host, unknown
	/// scheme, aborted, ...).
	Failed {
		/// Browser-provided reason, e.g. `net::ERR_UNKNOWN_URL_SCHEME`.
		error_text: String,
	},
}

/// An observed attempt by the page to load a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationEvent {
	pub url: String,
	pub outcome: NavigationOutcome,
}

impl NavigationEvent {
	pub fn succeeded(url: impl Into<String>) -> Self {
		Self {
			url: url.into(),
			outcome: NavigationOutcome::Succeeded,
		}
	}

	pub fn failed(url: impl Into<String>, error_text: impl Into<String>) -> Self {
		Self {
			url: url.into(),
			outcome: NavigationOutcome::Failed {
				error_text: error_text.into(),
			},
		}
	}

	/// Returns true when the load did not complete.
	pub fn is_failed(&self) -> bool {
		matches!(self.outcome, NavigationOutcome::Failed { .. })
	}
}

/// Source of browser pages.
#[async_trait]
pub trait BrowserBackend: Send + Sync {
	/// Acquires a fresh page owned exclusively by the caller.
	///
	/// Quota and concurrency rejections from hosted browser services surface
	/// here as [`Error::Rejected`](codecap_runtime::Error::Rejected).
	async fn acquire(&self) -> Result<Box<dyn BrowserPage>>;
}

/// One page in a remote browser.
///
/// Every waiting operation takes its own timeout and fails with a timeout
/// error (see [`codecap_runtime::Error::is_timeout`]) when it elapses.
#[async_trait]
pub trait BrowserPage: Send + Sync {
	async fn set_viewport(&self, viewport: Viewport) -> Result<()>;

	async fn set_user_agent(&self, user_agent: &str) -> Result<()>;

	/// Subscribes to the page's navigation events.
	///
	/// The stream ends (`RecvError::Closed`) once the page is closed.
	fn navigation_events(&self) -> broadcast::Receiver<NavigationEvent>;

	/// Navigates and waits until the page satisfies `wait_until`.
	async fn goto(&self, url: &str, wait_until: WaitUntil, timeout: Duration) -> Result<()>;

	/// Waits until an element matching `selector` is present.
	async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()>;

	/// Focuses the element and types `text` one character at a time.
	async fn type_text(&self, selector: &str, text: &str, delay: Duration) -> Result<()>;

	/// Clicks the centre of the element.
	async fn click(&self, selector: &str) -> Result<()>;

	/// Waits for a navigation started after the last click to satisfy `wait_until`.
	async fn wait_for_navigation(&self, wait_until: WaitUntil, timeout: Duration) -> Result<()>;

	/// Closes the page and releases the remote browser.
	async fn close(&self) -> Result<()>;
}
