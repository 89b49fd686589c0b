//! The session driver: one login automation from acquisition to teardown.
//!
//! ```text
//! validate ─► acquire ─► viewport/UA ─► attach observer ─► goto (fatal)
//!     ─► wait form controls (fatal) ─► type credentials ─► click submit
//!     ─► wait navigation (tolerated) ─► consent (absence tolerated)
//!     ─► grace wait for code ─► close (always, exactly once)
//! ```
//!
//! Every step is bounded twice: by the timeout handed to the backend and by a
//! local timer of the same length, so a backend that ignores its timeout still
//! cannot stall a session.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use codecap_protocol::{CaptureRequest, CaptureResponse};
use codecap_runtime::Error as RuntimeError;
use futures::FutureExt;
use futures::future::try_join_all;
use tokio::time::Instant;
use tracing::Instrument;

use crate::browser::{BrowserBackend, BrowserPage};
use crate::error::{CaptureError, Result};
use crate::observer::{ObserverHandle, RedirectObserver};
use crate::profile::ProviderProfile;
use crate::request::SessionRequest;

/// Budget for releasing the browser session.
const CLOSE_BUDGET: Duration = Duration::from_secs(10);

/// Runs capture sessions against a browser backend.
///
/// Cheap to clone; every [`capture`](Self::capture) acquires its own page.
#[derive(Clone)]
pub struct SessionDriver {
	backend: Arc<dyn BrowserBackend>,
	profile: Arc<ProviderProfile>,
}

impl SessionDriver {
	pub fn new(backend: Arc<dyn BrowserBackend>, profile: ProviderProfile) -> Self {
		Self {
			backend,
			profile: Arc::new(profile),
		}
	}

	pub fn profile(&self) -> &ProviderProfile {
		&self.profile
	}

	/// Validates a wire request and runs a session for it.
	///
	/// Invalid input fails with [`CaptureError::InvalidRequest`] before the
	/// backend is touched.
	pub async fn capture_request(&self, body: &CaptureRequest) -> Result<String> {
		let request = SessionRequest::from_wire(body)?;
		self.capture(&request).await
	}

	/// Runs one session and returns the captured authorization code.
	pub async fn capture(&self, request: &SessionRequest) -> Result<String> {
		let span = tracing::info_span!("capture", profile = %self.profile.name);
		self.capture_inner(request).instrument(span).await
	}

	async fn capture_inner(&self, request: &SessionRequest) -> Result<String> {
		let started = Instant::now();
		let acquire_budget = self.profile.timeouts.navigation();

		let page = bounded(acquire_budget, "acquire", self.backend.acquire())
			.await
			.map_err(|err| CaptureError::remote("acquire", err))?;
		tracing::info!(elapsed_ms = elapsed_ms(started), "Browser session acquired");

		let outcome = AssertUnwindSafe(self.drive(page.as_ref(), request, started))
			.catch_unwind()
			.await
			.unwrap_or_else(|panic| Err(CaptureError::Internal(panic_message(panic.as_ref()))));

		match tokio::time::timeout(CLOSE_BUDGET, page.close()).await {
			Ok(Ok(())) => tracing::debug!("Browser session closed"),
			Ok(Err(err)) => tracing::warn!(error = %err, "Failed to close browser session"),
			Err(_) => tracing::warn!("Timed out closing browser session"),
		}

		match &outcome {
			Ok(code) => tracing::info!(
				code_len = code.len(),
				elapsed_ms = elapsed_ms(started),
				"Captured authorization code"
			),
			Err(err) => tracing::warn!(
				kind = err.kind(),
				error = %err,
				elapsed_ms = elapsed_ms(started),
				"Capture failed"
			),
		}
		outcome
	}

	async fn drive(&self, page: &dyn BrowserPage, request: &SessionRequest, started: Instant) -> Result<String> {
		let profile = &*self.profile;
		let timeouts = &profile.timeouts;
		let selectors = &profile.selectors;

		bounded(timeouts.navigation(), "set viewport", page.set_viewport(profile.viewport))
			.await
			.map_err(|err| CaptureError::remote("configure", err))?;
		bounded(timeouts.navigation(), "set user agent", page.set_user_agent(&profile.user_agent))
			.await
			.map_err(|err| CaptureError::remote("configure", err))?;

		// Attach before the first navigation so no redirect is missed.
		let observer = RedirectObserver::attach(profile.redirect.clone(), page.navigation_events());

		let url = request.target_url();
		bounded(timeouts.navigation(), "navigate", page.goto(url, profile.wait_until, timeouts.navigation()))
			.await
			.map_err(|err| {
				if err.is_timeout() {
					CaptureError::NavigationTimeout {
						url: url.to_string(),
						timeout_ms: timeouts.navigation_ms,
					}
				} else {
					CaptureError::remote("navigate", err)
				}
			})?;
		tracing::info!(step = "navigate", elapsed_ms = elapsed_ms(started), "Login page loaded");

		try_join_all(
			[&selectors.username, &selectors.password, &selectors.submit]
				.into_iter()
				.map(|selector| wait_for_control(page, selector, timeouts.form())),
		)
		.await?;
		tracing::info!(step = "form", elapsed_ms = elapsed_ms(started), "Login form found");

		let delay = timeouts.keystroke_delay();
		for (selector, text) in [
			(&selectors.username, request.username()),
			(&selectors.password, request.secret()),
		] {
			let budget = timeouts.form() + delay * text.chars().count() as u32;
			bounded(budget, "type", page.type_text(selector, text, delay))
				.await
				.map_err(|err| control_error(selector, timeouts.form_ms, "type", err))?;
		}

		bounded(timeouts.form(), "submit", page.click(&selectors.submit))
			.await
			.map_err(|err| control_error(&selectors.submit, timeouts.form_ms, "submit", err))?;
		tracing::info!(step = "submit", elapsed_ms = elapsed_ms(started), "Credentials submitted");

		match bounded(
			timeouts.post_submit(),
			"post-submit navigation",
			page.wait_for_navigation(profile.wait_until, timeouts.post_submit()),
		)
		.await
		{
			Ok(()) => tracing::info!(step = "post_submit", elapsed_ms = elapsed_ms(started), "Navigation settled"),
			// The provider may fire the terminal redirect instead of a navigation.
			Err(err) if err.is_timeout() => {
				tracing::debug!(step = "post_submit", elapsed_ms = elapsed_ms(started), "No navigation after submit");
			}
			Err(err) => return Err(CaptureError::remote("post-submit navigation", err)),
		}

		if let Some(consent) = &selectors.consent {
			self.consent(page, consent, &observer, started).await?;
		}

		match observer.wait_for_code(timeouts.grace()).await {
			Some(code) => Ok(code),
			None => Err(CaptureError::CodeNotCaptured),
		}
	}

	/// Clicks the consent control if it shows up. Stops waiting once a code
	/// has been captured.
	async fn consent(&self, page: &dyn BrowserPage, selector: &str, observer: &ObserverHandle, started: Instant) -> Result<()> {
		let budget = self.profile.timeouts.consent();
		tokio::select! {
			biased;
			_ = observer.code() => {
				tracing::debug!(step = "consent", "Code already captured, skipping consent");
				Ok(())
			}
			shown = bounded(budget, "consent", page.wait_for_selector(selector, budget)) => match shown {
				Ok(()) => {
					bounded(budget, "consent click", page.click(selector))
						.await
						.map_err(|err| control_error(selector, self.profile.timeouts.consent_ms, "consent", err))?;
					tracing::info!(step = "consent", elapsed_ms = elapsed_ms(started), "Consent given");
					Ok(())
				}
				Err(err) if err.is_timeout() => {
					tracing::debug!(step = "consent", "Consent control not shown");
					Ok(())
				}
				Err(err) => Err(CaptureError::remote("consent", err)),
			}
		}
	}
}

/// Wire body for a session outcome.
pub fn to_response(outcome: &Result<String>) -> CaptureResponse {
	match outcome {
		Ok(code) => CaptureResponse::success(code.clone()),
		Err(err) => CaptureResponse::failure(err.user_message(), err.status()),
	}
}

async fn wait_for_control(page: &dyn BrowserPage, selector: &str, budget: Duration) -> Result<()> {
	bounded(budget, "form", page.wait_for_selector(selector, budget))
		.await
		.map_err(|err| {
			if err.is_timeout() {
				CaptureError::FormNotFound {
					selector: selector.to_string(),
					timeout_ms: budget.as_millis() as u64,
				}
			} else {
				CaptureError::remote("form", err)
			}
		})
}

fn control_error(selector: &str, timeout_ms: u64, step: &'static str, err: RuntimeError) -> CaptureError {
	match err {
		RuntimeError::ElementNotFound(_) => CaptureError::FormNotFound {
			selector: selector.to_string(),
			timeout_ms,
		},
		other => CaptureError::remote(step, other),
	}
}

/// Awaits `fut`, converting an overrun of `budget` into a timeout error.
async fn bounded<T>(
	budget: Duration,
	what: &str,
	fut: impl Future<Output = codecap_runtime::Result<T>>,
) -> codecap_runtime::Result<T> {
	match tokio::time::timeout(budget, fut).await {
		Ok(result) => result,
		Err(_) => Err(RuntimeError::Timeout(format!("{what} exceeded {}ms", budget.as_millis()))),
	}
}

fn elapsed_ms(started: Instant) -> u64 {
	started.elapsed().as_millis() as u64
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
	if let Some(s) = panic.downcast_ref::<&str>() {
		(*s).to_string()
	} else if let Some(s) = panic.downcast_ref::<String>() {
		s.clone()
	} else {
		"panic in capture session".to_string()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn responses_mirror_outcomes() {
		assert_eq!(to_response(&Ok("ABC".into())), CaptureResponse::success("ABC"));
		assert_eq!(
			to_response(&Err(CaptureError::CodeNotCaptured)),
			CaptureResponse::failure("Code not found after authentication", 422)
		);
	}

	#[test]
	fn element_not_found_becomes_form_not_found() {
		let err = control_error("#submit", 20_000, "submit", RuntimeError::ElementNotFound("#submit".into()));
		assert!(matches!(err, CaptureError::FormNotFound { ref selector, .. } if selector == "#submit"));

		let err = control_error("#submit", 20_000, "submit", RuntimeError::ChannelClosed);
		assert!(matches!(err, CaptureError::RemoteService { step: "submit", .. }));
	}

	#[test]
	fn panic_payloads_are_described() {
		let payload: Box<dyn Any + Send> = Box::new("boom");
		assert_eq!(panic_message(payload.as_ref()), "boom");
		let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
		assert_eq!(panic_message(payload.as_ref()), "bang");
		let payload: Box<dyn Any + Send> = Box::new(7_u8);
		assert_eq!(panic_message(payload.as_ref()), "panic in capture session");
	}

	#[tokio::test(start_paused = true)]
	async fn bounded_cuts_off_hung_futures() {
		let start = Instant::now();
		let result: codecap_runtime::Result<()> =
			bounded(Duration::from_secs(2), "hang", std::future::pending()).await;
		assert!(result.unwrap_err().is_timeout());
		assert!(start.elapsed() < Duration::from_millis(2100));
	}
}
