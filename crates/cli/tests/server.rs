//! Capture endpoint tests against an in-memory browser.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use axum::response::Response;
use codecap::{BrowserBackend, BrowserPage, NavigationEvent, ProviderProfile, SessionDriver, Viewport, WaitUntil};
use codecap_cli::server;
use codecap_runtime::{Error, Result};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tower::ServiceExt;

enum Behaviour {
	/// Fires `mym://callback?code=<code>` as soon as the login page is opened.
	Redirect(&'static str),
	/// Loads the login page but never redirects.
	Silent,
	/// Refuses to hand out a page.
	Refuse(fn() -> Error),
}

struct StubBackend {
	behaviour: Behaviour,
	acquires: AtomicUsize,
	closes: Arc<AtomicUsize>,
}

impl StubBackend {
	fn new(behaviour: Behaviour) -> Arc<Self> {
		Arc::new(Self {
			behaviour,
			acquires: AtomicUsize::new(0),
			closes: Arc::new(AtomicUsize::new(0)),
		})
	}
}

#[async_trait]
impl BrowserBackend for StubBackend {
	async fn acquire(&self) -> Result<Box<dyn BrowserPage>> {
		self.acquires.fetch_add(1, Ordering::SeqCst);
		let redirect = match &self.behaviour {
			Behaviour::Refuse(err) => return Err(err()),
			Behaviour::Redirect(code) => Some(format!("mym://callback?code={code}")),
			Behaviour::Silent => None,
		};
		let (events, _) = broadcast::channel(16);
		Ok(Box::new(StubPage {
			redirect,
			events,
			closes: Arc::clone(&self.closes),
		}))
	}
}

struct StubPage {
	redirect: Option<String>,
	events: broadcast::Sender<NavigationEvent>,
	closes: Arc<AtomicUsize>,
}

#[async_trait]
impl BrowserPage for StubPage {
	async fn set_viewport(&self, _viewport: Viewport) -> Result<()> {
		Ok(())
	}

	async fn set_user_agent(&self, _user_agent: &str) -> Result<()> {
		Ok(())
	}

	fn navigation_events(&self) -> broadcast::Receiver<NavigationEvent> {
		self.events.subscribe()
	}

	async fn goto(&self, _url: &str, _wait_until: WaitUntil, _timeout: Duration) -> Result<()> {
		if let Some(url) = &self.redirect {
			let _ = self.events.send(NavigationEvent::failed(url.clone(), "net::ERR_UNKNOWN_URL_SCHEME"));
		}
		Ok(())
	}

	async fn wait_for_selector(&self, _selector: &str, _timeout: Duration) -> Result<()> {
		Ok(())
	}

	async fn type_text(&self, _selector: &str, _text: &str, _delay: Duration) -> Result<()> {
		Ok(())
	}

	async fn click(&self, _selector: &str) -> Result<()> {
		Ok(())
	}

	async fn wait_for_navigation(&self, _wait_until: WaitUntil, _timeout: Duration) -> Result<()> {
		Ok(())
	}

	async fn close(&self) -> Result<()> {
		self.closes.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}
}

fn app(backend: &Arc<StubBackend>) -> axum::Router {
	let mut profile = ProviderProfile::default();
	profile.timeouts.keystroke_delay_ms = 0;
	profile.timeouts.grace_ms = 50;
	server::router(SessionDriver::new(backend.clone(), profile))
}

fn post(body: impl Into<Body>) -> Request<Body> {
	Request::builder()
		.method(Method::POST)
		.uri("/")
		.header(header::CONTENT_TYPE, "application/json")
		.body(body.into())
		.unwrap()
}

fn valid_body() -> String {
	json!({
		"url": "https://login.example.com/authorize",
		"email": "user@example.com",
		"password": "hunter2",
	})
	.to_string()
}

async fn json_body(response: Response) -> Value {
	let bytes = response.into_body().collect().await.unwrap().to_bytes();
	serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn captured_code_is_returned() {
	let backend = StubBackend::new(Behaviour::Redirect("ABC123"));

	let response = app(&backend).oneshot(post(valid_body())).await.unwrap();

	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(json_body(response).await, json!({ "code": "ABC123" }));
	assert_eq!(backend.acquires.load(Ordering::SeqCst), 1);
	assert_eq!(backend.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_fields_are_rejected_without_a_browser() {
	let backend = StubBackend::new(Behaviour::Redirect("ABC123"));

	for body in [
		json!({ "email": "user@example.com", "password": "pw" }),
		json!({ "url": "https://login.example.com", "password": "pw" }),
		json!({ "url": "https://login.example.com", "email": "user@example.com" }),
		json!({ "url": "https://login.example.com", "email": "", "password": "pw" }),
	] {
		let response = app(&backend).oneshot(post(body.to_string())).await.unwrap();
		assert_eq!(response.status(), StatusCode::BAD_REQUEST);
		assert_eq!(
			json_body(response).await,
			json!({ "error": "Missing required params", "code": 400 })
		);
	}

	assert_eq!(backend.acquires.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unparsable_json_is_a_bad_request() {
	let backend = StubBackend::new(Behaviour::Redirect("ABC123"));

	let response = app(&backend).oneshot(post("{not json")).await.unwrap();

	assert_eq!(response.status(), StatusCode::BAD_REQUEST);
	let body = json_body(response).await;
	assert_eq!(body["code"], 400);
	assert!(!body["error"].as_str().unwrap().is_empty());
	assert_eq!(backend.acquires.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn other_methods_are_refused() {
	let backend = StubBackend::new(Behaviour::Redirect("ABC123"));

	for method in [Method::GET, Method::PUT, Method::DELETE] {
		let request = Request::builder().method(method).uri("/").body(Body::empty()).unwrap();
		let response = app(&backend).oneshot(request).await.unwrap();

		assert_eq!(response.status(), StatusCode::BAD_REQUEST);
		assert_eq!(json_body(response).await, json!({ "error": "Method not allowed" }));
	}
}

#[tokio::test]
async fn preflight_is_answered_with_cors_headers() {
	let backend = StubBackend::new(Behaviour::Redirect("ABC123"));
	let request = Request::builder()
		.method(Method::OPTIONS)
		.uri("/")
		.header(header::ORIGIN, "https://app.example.com")
		.header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
		.header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
		.body(Body::empty())
		.unwrap();

	let response = app(&backend).oneshot(request).await.unwrap();

	assert_eq!(response.status(), StatusCode::OK);
	let headers = response.headers();
	assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
	assert!(headers[header::ACCESS_CONTROL_ALLOW_METHODS].to_str().unwrap().contains("POST"));
	assert!(
		headers[header::ACCESS_CONTROL_ALLOW_HEADERS]
			.to_str()
			.unwrap()
			.eq_ignore_ascii_case("content-type")
	);
	assert_eq!(backend.acquires.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn responses_carry_the_allow_origin_header() {
	let backend = StubBackend::new(Behaviour::Redirect("ABC123"));
	let mut request = post(valid_body());
	request
		.headers_mut()
		.insert(header::ORIGIN, "https://app.example.com".parse().unwrap());

	let response = app(&backend).oneshot(request).await.unwrap();

	assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
}

#[tokio::test]
async fn missing_code_is_unprocessable() {
	let backend = StubBackend::new(Behaviour::Silent);

	let response = app(&backend).oneshot(post(valid_body())).await.unwrap();

	assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
	assert_eq!(
		json_body(response).await,
		json!({ "error": "Code not found after authentication", "code": 422 })
	);
	assert_eq!(backend.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rate_limited_backend_is_normalized() {
	let backend = StubBackend::new(Behaviour::Refuse(|| Error::Rejected {
		status: 429,
		message: "Too Many Requests".into(),
	}));

	let response = app(&backend).oneshot(post(valid_body())).await.unwrap();

	assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
	assert_eq!(json_body(response).await, json!({ "error": "rate limit exceeded", "code": 429 }));
}

#[tokio::test]
async fn unreachable_backend_is_a_bad_gateway() {
	let backend = StubBackend::new(Behaviour::Refuse(|| Error::ConnectionFailed("connection refused".into())));

	let response = app(&backend).oneshot(post(valid_body())).await.unwrap();

	assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
	let body = json_body(response).await;
	assert_eq!(body["code"], 502);
	assert!(body["error"].as_str().unwrap().contains("connection refused"));
}

#[tokio::test]
async fn server_stops_on_shutdown_signal() {
	let backend = StubBackend::new(Behaviour::Silent);
	let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
	let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

	let driver = SessionDriver::new(backend, ProviderProfile::default());
	let handle = tokio::spawn(server::serve(listener, driver, async move {
		let _ = stop_rx.await;
	}));

	stop_tx.send(()).unwrap();
	let result = tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
	assert!(result.is_ok());
}
