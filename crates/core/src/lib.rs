//! codecap: authorization-code capture by redirect interception.
//!
//! Some identity providers finish their login flow by redirecting the browser
//! to a custom, non-routable URI (`mym://callback?code=...`). The browser
//! cannot load it, but the attempt is visible on the page's network layer.
//! This crate drives a remote headless browser through the provider's login
//! form and picks the code out of that failed redirect.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐   acquire/goto/type/click   ┌──────────────────┐
//! │  SessionDriver  │ ──────────────────────────► │  BrowserPage     │
//! └────────┬────────┘                             │  (CdpPage)       │
//!          │ awaits code                          └────────┬─────────┘
//! ┌────────▼────────┐     NavigationEvent stream           │
//! │ RedirectObserver│ ◄────────────────────────────────────┘
//! └─────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use codecap::{CdpBackend, ProviderProfile, SessionDriver, SessionRequest};
//! use codecap_runtime::BrowserEndpoint;
//!
//! let endpoint = BrowserEndpoint::parse("wss://chrome.example.com")?.with_token(token);
//! let driver = SessionDriver::new(Arc::new(CdpBackend::new(endpoint)), ProviderProfile::default());
//! let request = SessionRequest::new(login_url, email, password)?;
//! let code = driver.capture(&request).await?;
//! ```

pub mod browser;
pub mod cdp;
pub mod driver;
pub mod error;
pub mod observer;
pub mod profile;
pub mod request;

pub use browser::{BrowserBackend, BrowserPage, NavigationEvent, NavigationOutcome};
pub use cdp::{CdpBackend, CdpPage};
pub use codecap_protocol::{CaptureRequest, CaptureResponse, Viewport, WaitUntil};
pub use driver::{SessionDriver, to_response};
pub use error::{CaptureError, RATE_LIMIT_MESSAGE, Result};
pub use observer::{ObserverHandle, ObserverState, Observation, RedirectMatcher, RedirectObserver};
pub use profile::{DEFAULT_PROFILE, DEFAULT_USER_AGENT, ProfileError, ProviderProfile, Selectors, Timeouts};
pub use request::SessionRequest;
