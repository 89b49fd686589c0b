//! Scripted in-memory browser for driver tests.
//!
//! The mock honours the timeouts it is given (sleeping for the full budget
//! before failing) unless `ignore_timeouts` is set, in which case waits that
//! would fail hang forever and only the driver's own bounds end them.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use codecap::{BrowserBackend, BrowserPage, NavigationEvent, Viewport, WaitUntil};
use codecap_runtime::{Error, Result};
use parking_lot::Mutex;
use tokio::sync::broadcast;

pub const USERNAME: &str = r#"#gigya-login-form input[name="username"]"#;
pub const PASSWORD: &str = r#"#gigya-login-form input[name="password"]"#;
pub const SUBMIT: &str = r#"#gigya-login-form input[type="submit"]"#;
pub const CONSENT: &str = r#"#cvs_from input[type="submit"]"#;

/// Failed loads fired when a selector is clicked, after an optional delay.
/// `{n}` in a URL is replaced by the page's acquisition number.
#[derive(Clone, Default)]
pub struct Redirects {
	pub urls: Vec<String>,
	pub delay: Duration,
}

/// What the mock browser does.
#[derive(Clone, Default)]
pub struct Script {
	pub acquire_error: Option<Arc<dyn Fn() -> Error + Send + Sync>>,
	pub goto_hangs: bool,
	pub missing: HashSet<String>,
	pub on_click: HashMap<String, Redirects>,
	pub click_errors: HashMap<String, Arc<dyn Fn() -> Error + Send + Sync>>,
	pub navigation_after_submit: bool,
	pub panic_on_click: Option<String>,
	pub hanging_clicks: HashSet<String>,
	pub ignore_timeouts: bool,
}

impl Script {
	/// A login page whose consent click fires `mym://callback?code=<code>`.
	pub fn happy(code: &str) -> Self {
		Self::default()
			.with_navigation_after_submit()
			.redirect_on_click(CONSENT, &[&format!("mym://callback?code={code}")])
	}

	pub fn redirect_on_click(mut self, selector: &str, urls: &[&str]) -> Self {
		self.on_click.insert(
			selector.to_string(),
			Redirects {
				urls: urls.iter().map(|u| u.to_string()).collect(),
				delay: Duration::ZERO,
			},
		);
		self
	}

	pub fn redirect_on_click_after(mut self, selector: &str, url: &str, delay: Duration) -> Self {
		self.on_click.insert(
			selector.to_string(),
			Redirects {
				urls: vec![url.to_string()],
				delay,
			},
		);
		self
	}

	pub fn missing(mut self, selector: &str) -> Self {
		self.missing.insert(selector.to_string());
		self
	}

	pub fn click_error(mut self, selector: &str, err: impl Fn() -> Error + Send + Sync + 'static) -> Self {
		self.click_errors.insert(selector.to_string(), Arc::new(err));
		self
	}

	pub fn acquire_error(mut self, err: impl Fn() -> Error + Send + Sync + 'static) -> Self {
		self.acquire_error = Some(Arc::new(err));
		self
	}

	pub fn with_navigation_after_submit(mut self) -> Self {
		self.navigation_after_submit = true;
		self
	}

	pub fn goto_hangs(mut self) -> Self {
		self.goto_hangs = true;
		self
	}

	pub fn panic_on_click(mut self, selector: &str) -> Self {
		self.panic_on_click = Some(selector.to_string());
		self
	}

	/// Clicking `selector` never completes.
	pub fn click_hangs(mut self, selector: &str) -> Self {
		self.hanging_clicks.insert(selector.to_string());
		self
	}

	pub fn ignore_timeouts(mut self) -> Self {
		self.ignore_timeouts = true;
		self
	}
}

/// Counters shared by the backend and every page it hands out.
#[derive(Default)]
pub struct Stats {
	pub acquires: AtomicUsize,
	pub closes: AtomicUsize,
	pub calls: Mutex<Vec<String>>,
}

impl Stats {
	pub fn acquires(&self) -> usize {
		self.acquires.load(Ordering::SeqCst)
	}

	pub fn closes(&self) -> usize {
		self.closes.load(Ordering::SeqCst)
	}

	pub fn calls(&self) -> Vec<String> {
		self.calls.lock().clone()
	}

	fn record(&self, call: String) {
		self.calls.lock().push(call);
	}
}

pub struct MockBackend {
	script: Script,
	pub stats: Arc<Stats>,
}

impl MockBackend {
	pub fn new(script: Script) -> Arc<Self> {
		Arc::new(Self {
			script,
			stats: Arc::new(Stats::default()),
		})
	}
}

#[async_trait]
impl BrowserBackend for MockBackend {
	async fn acquire(&self) -> Result<Box<dyn BrowserPage>> {
		let n = self.stats.acquires.fetch_add(1, Ordering::SeqCst) + 1;
		if let Some(err) = &self.script.acquire_error {
			return Err(err());
		}
		let (tx, _) = broadcast::channel(64);
		Ok(Box::new(MockPage {
			n,
			script: self.script.clone(),
			stats: Arc::clone(&self.stats),
			events: Mutex::new(Some(tx)),
		}))
	}
}

struct MockPage {
	n: usize,
	script: Script,
	stats: Arc<Stats>,
	events: Mutex<Option<broadcast::Sender<NavigationEvent>>>,
}

impl MockPage {
	async fn fail_after(&self, timeout: Duration, err: Error) -> Result<()> {
		if self.script.ignore_timeouts {
			std::future::pending::<()>().await;
		}
		tokio::time::sleep(timeout).await;
		Err(err)
	}

	fn fire(&self, redirects: &Redirects) {
		let Some(tx) = self.events.lock().clone() else {
			return;
		};
		let events: Vec<NavigationEvent> = redirects
			.urls
			.iter()
			.map(|url| NavigationEvent::failed(url.replace("{n}", &self.n.to_string()), "net::ERR_UNKNOWN_URL_SCHEME"))
			.collect();

		if redirects.delay.is_zero() {
			for event in events {
				let _ = tx.send(event);
			}
		} else {
			let delay = redirects.delay;
			tokio::spawn(async move {
				tokio::time::sleep(delay).await;
				for event in events {
					let _ = tx.send(event);
				}
			});
		}
	}
}

#[async_trait]
impl BrowserPage for MockPage {
	async fn set_viewport(&self, viewport: Viewport) -> Result<()> {
		self.stats.record(format!("viewport {}x{}", viewport.width, viewport.height));
		Ok(())
	}

	async fn set_user_agent(&self, user_agent: &str) -> Result<()> {
		self.stats.record(format!("user_agent {user_agent}"));
		Ok(())
	}

	fn navigation_events(&self) -> broadcast::Receiver<NavigationEvent> {
		self.stats.record("subscribe".to_string());
		match self.events.lock().as_ref() {
			Some(tx) => tx.subscribe(),
			None => broadcast::channel(1).1,
		}
	}

	async fn goto(&self, url: &str, _wait_until: WaitUntil, timeout: Duration) -> Result<()> {
		self.stats.record(format!("goto {url}"));
		if self.script.goto_hangs {
			return self
				.fail_after(
					timeout,
					Error::NavigationTimeout {
						url: url.to_string(),
						duration_ms: timeout.as_millis() as u64,
					},
				)
				.await;
		}
		Ok(())
	}

	async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
		self.stats.record(format!("wait {selector}"));
		if self.script.missing.contains(selector) {
			return self
				.fail_after(timeout, Error::Timeout(format!("waiting for selector '{selector}'")))
				.await;
		}
		Ok(())
	}

	async fn type_text(&self, selector: &str, text: &str, delay: Duration) -> Result<()> {
		self.stats.record(format!("type {selector} {text}"));
		tokio::time::sleep(delay * text.chars().count().saturating_sub(1) as u32).await;
		Ok(())
	}

	async fn click(&self, selector: &str) -> Result<()> {
		self.stats.record(format!("click {selector}"));
		if self.script.panic_on_click.as_deref() == Some(selector) {
			panic!("injected fault clicking {selector}");
		}
		if self.script.hanging_clicks.contains(selector) {
			std::future::pending::<()>().await;
		}
		if let Some(err) = self.script.click_errors.get(selector) {
			return Err(err());
		}
		if let Some(redirects) = self.script.on_click.get(selector) {
			self.fire(redirects);
		}
		Ok(())
	}

	async fn wait_for_navigation(&self, _wait_until: WaitUntil, timeout: Duration) -> Result<()> {
		self.stats.record("wait_for_navigation".to_string());
		if self.script.navigation_after_submit {
			return Ok(());
		}
		self.fail_after(timeout, Error::Timeout("waiting for navigation".to_string()))
			.await
	}

	async fn close(&self) -> Result<()> {
		self.stats.record("close".to_string());
		self.stats.closes.fetch_add(1, Ordering::SeqCst);
		self.events.lock().take();
		Ok(())
	}
}
