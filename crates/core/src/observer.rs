//! Redirect code observer.
//!
//! Watches a page's navigation events for the provider's terminal redirect: a
//! failed load whose URL starts with a non-routable marker (e.g. `mym://...`)
//! and carries the authorization code in its query string.
//!
//! The observer owns a write-once slot. The first matching redirect with a
//! non-empty code fills it; later matches are logged and dropped. The driver
//! awaits the slot with a timeout instead of polling.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use url::form_urlencoded;

use crate::browser::{NavigationEvent, NavigationOutcome};
use crate::error::CaptureError;

/// Identifies the terminal redirect and the query parameter holding the code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedirectMatcher {
	/// URL prefix of the terminal redirect, usually a custom scheme.
	pub prefix: String,
	/// Query parameter carrying the authorization code.
	pub param: String,
}

impl Default for RedirectMatcher {
	fn default() -> Self {
		Self {
			prefix: "mym".to_string(),
			param: "code".to_string(),
		}
	}
}

impl RedirectMatcher {
	pub fn new(prefix: impl Into<String>, param: impl Into<String>) -> Self {
		Self {
			prefix: prefix.into(),
			param: param.into(),
		}
	}

	/// Returns true if `url` is a terminal redirect candidate.
	pub fn matches(&self, url: &str) -> bool {
		url.starts_with(&self.prefix)
	}

	/// Extracts the code from a matching URL.
	///
	/// Only the query string is read; the scheme and authority of a marker
	/// URL are often not valid URL syntax. Returns `Ok(None)` when there is no
	/// query or the parameter is absent or empty.
	///
	/// # Errors
	///
	/// Returns [`CaptureError::MalformedRedirect`] when the query contains an
	/// invalid percent escape.
	pub fn extract(&self, url: &str) -> Result<Option<String>, CaptureError> {
		let Some((_, rest)) = url.split_once('?') else {
			return Ok(None);
		};
		let query = rest.split_once('#').map_or(rest, |(query, _)| query);

		if let Some(at) = invalid_escape(query) {
			return Err(CaptureError::MalformedRedirect {
				url: url.to_string(),
				reason: format!("invalid percent escape at query offset {at}"),
			});
		}

		Ok(form_urlencoded::parse(query.as_bytes())
			.find(|(key, _)| key == self.param.as_str())
			.map(|(_, value)| value.into_owned())
			.filter(|value| !value.is_empty()))
	}
}

/// Offset of the first `%` not followed by two hex digits.
fn invalid_escape(query: &str) -> Option<usize> {
	let bytes = query.as_bytes();
	bytes.iter().enumerate().find_map(|(at, &b)| {
		let valid = b != b'%' || bytes.get(at + 1..at + 3).is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
		(!valid).then_some(at)
	})
}

/// What the observer made of one navigation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
	/// Not a failed load, or not a terminal redirect.
	Ignored,
	/// Filled the slot.
	Captured,
	/// Matched, but a code was already captured.
	Duplicate,
	/// Matched, but the URL could not be parsed.
	Malformed,
	/// Matched, but the code parameter was missing or empty.
	MissingCode,
}

/// Lifecycle of an observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverState {
	/// Listening, nothing captured yet.
	Idle,
	/// A code is available. Terminal.
	Captured,
	/// The event stream ended without a code. Terminal.
	Uncaptured,
}

/// Matches navigation events and keeps the first captured code.
pub struct RedirectObserver {
	matcher: RedirectMatcher,
	slot: watch::Sender<Option<String>>,
	ended: AtomicBool,
}

impl RedirectObserver {
	pub fn new(matcher: RedirectMatcher) -> Self {
		let (slot, _) = watch::channel(None);
		Self {
			matcher,
			slot,
			ended: AtomicBool::new(false),
		}
	}

	/// Spawns a task feeding `events` into a new observer.
	///
	/// Subscribe to the page's events before navigating so nothing is missed.
	pub fn attach(matcher: RedirectMatcher, events: broadcast::Receiver<NavigationEvent>) -> ObserverHandle {
		let observer = Arc::new(Self::new(matcher));
		let task = tokio::spawn(Arc::clone(&observer).listen(events));
		ObserverHandle { observer, task }
	}

	async fn listen(self: Arc<Self>, mut events: broadcast::Receiver<NavigationEvent>) {
		loop {
			match events.recv().await {
				Ok(event) => {
					self.observe(&event);
				}
				Err(broadcast::error::RecvError::Lagged(n)) => {
					tracing::warn!(dropped = n, "Redirect observer lagged behind navigation events");
				}
				Err(broadcast::error::RecvError::Closed) => break,
			}
		}
		self.ended.store(true, Ordering::SeqCst);
		tracing::debug!(state = ?self.state(), "Navigation event stream ended");
	}

	/// Inspects one navigation event.
	pub fn observe(&self, event: &NavigationEvent) -> Observation {
		let NavigationOutcome::Failed { error_text } = &event.outcome else {
			return Observation::Ignored;
		};
		if !self.matcher.matches(&event.url) {
			return Observation::Ignored;
		}

		let code = match self.matcher.extract(&event.url) {
			Ok(Some(code)) => code,
			Ok(None) => {
				tracing::debug!(param = %self.matcher.param, "Terminal redirect without a code");
				return Observation::MissingCode;
			}
			Err(err) => {
				tracing::warn!(error = %err, "Ignoring malformed redirect");
				return Observation::Malformed;
			}
		};

		let code_len = code.len();
		let stored = self.slot.send_if_modified(|slot| {
			if slot.is_none() {
				*slot = Some(code);
				true
			} else {
				false
			}
		});

		if stored {
			tracing::debug!(code_len, error_text = %error_text, "Captured authorization code");
			Observation::Captured
		} else {
			tracing::debug!(code_len, "Discarding later redirect, code already captured");
			Observation::Duplicate
		}
	}

	/// Returns the captured code, if any.
	pub fn captured(&self) -> Option<String> {
		self.slot.borrow().clone()
	}

	pub fn state(&self) -> ObserverState {
		if self.slot.borrow().is_some() {
			ObserverState::Captured
		} else if self.ended.load(Ordering::SeqCst) {
			ObserverState::Uncaptured
		} else {
			ObserverState::Idle
		}
	}

	/// Waits until a code is captured.
	///
	/// Never resolves if no code arrives; race it against something bounded.
	pub async fn code(&self) -> String {
		let mut rx = self.slot.subscribe();
		loop {
			if let Some(code) = rx.borrow_and_update().clone() {
				return code;
			}
			if rx.changed().await.is_err() {
				std::future::pending::<()>().await;
			}
		}
	}

	/// Waits up to `timeout` for a code.
	pub async fn wait_for_code(&self, timeout: Duration) -> Option<String> {
		tokio::time::timeout(timeout, self.code()).await.ok()
	}
}

/// Running observer attached to a page's event stream.
///
/// Dropping the handle stops the listener task.
pub struct ObserverHandle {
	observer: Arc<RedirectObserver>,
	task: JoinHandle<()>,
}

impl ObserverHandle {
	pub fn observer(&self) -> &RedirectObserver {
		&self.observer
	}

	pub fn captured(&self) -> Option<String> {
		self.observer.captured()
	}

	pub fn state(&self) -> ObserverState {
		self.observer.state()
	}

	pub async fn code(&self) -> String {
		self.observer.code().await
	}

	pub async fn wait_for_code(&self, timeout: Duration) -> Option<String> {
		self.observer.wait_for_code(timeout).await
	}
}

impl Drop for ObserverHandle {
	fn drop(&mut self) {
		self.task.abort();
	}
}
