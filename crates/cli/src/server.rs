//! HTTP entry point: `POST /` with `{url, email, password}`.
//!
//! Responses are `{"code": ...}` on success and `{"error": ..., "code": <status>}`
//! on failure, with the HTTP status mirroring the failure classification.

use std::future::Future;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use codecap::{CaptureError, CaptureRequest, CaptureResponse, SessionDriver, to_response};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, info};

pub fn router(driver: SessionDriver) -> Router {
	Router::new()
		.route("/", post(capture).fallback(method_not_allowed))
		.layer(cors_layer())
		.with_state(driver)
}

/// Serves until `shutdown` resolves, then drains in-flight sessions.
pub async fn serve(
	listener: TcpListener,
	driver: SessionDriver,
	shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
	axum::serve(listener, router(driver)).with_graceful_shutdown(shutdown).await
}

/// Resolves on Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = signal::ctrl_c().await {
			error!("Failed to install Ctrl+C handler: {e}");
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(mut sig) => {
				sig.recv().await;
			}
			Err(e) => {
				error!("Failed to install SIGTERM handler: {e}");
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => info!("Received Ctrl+C, shutting down"),
		_ = terminate => info!("Received SIGTERM, shutting down"),
	}
}

fn cors_layer() -> CorsLayer {
	CorsLayer::new()
		.allow_origin(Any)
		.allow_methods([Method::POST])
		.allow_headers([header::CONTENT_TYPE])
}

async fn capture(State(driver): State<SessionDriver>, body: Result<Json<CaptureRequest>, JsonRejection>) -> Response {
	let request = match body {
		Ok(Json(request)) => request,
		Err(rejection) => {
			debug!(error = %rejection.body_text(), "Rejected request body");
			return reply(StatusCode::BAD_REQUEST, CaptureResponse::failure(rejection.body_text(), 400));
		}
	};

	// The session runs on its own task so that a client disconnect cannot
	// cancel it between acquire and close.
	let session = tokio::spawn(async move { driver.capture_request(&request).await });
	let outcome = match session.await {
		Ok(outcome) => outcome,
		Err(err) => Err(CaptureError::Internal(err.to_string())),
	};

	let status = match &outcome {
		Ok(_) => StatusCode::OK,
		Err(err) => StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
	};
	reply(status, to_response(&outcome))
}

async fn method_not_allowed() -> Response {
	reply(
		StatusCode::BAD_REQUEST,
		CaptureResponse::Failure {
			error: "Method not allowed".to_string(),
			code: None,
		},
	)
}

fn reply(status: StatusCode, body: CaptureResponse) -> Response {
	(status, Json(body)).into_response()
}
