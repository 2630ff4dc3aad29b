//! HTTP front end
//!
//! One axum router serves both dialects: the EC2 query API on `/` and the
//! Compute REST API under `/compute/v1`. Handlers only decode requests,
//! take the right lock and render the outcome; all semantics live in
//! [`crate::aws`] and [`crate::gcp`].

mod aws;
mod gcp;

use std::time::Instant;

use anyhow::{Context, Result};
use axum::extract::Request;
use axum::http::{StatusCode, Uri};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::core::{Dialect, ErrorEnvelope, ErrorKind};
use crate::gcp::json::error_body;
use crate::state::AppState;

/// Longest request body excerpt written to the debug log
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Truncate a body for logging and drop control characters
pub(crate) fn sanitize_for_log(body: &str) -> String {
    let count = body.chars().count();
    let truncated = if count > MAX_LOG_BODY_LENGTH {
        let head: String = body.chars().take(MAX_LOG_BODY_LENGTH).collect();
        format!("{}... [truncated, {} bytes total]", head, body.len())
    } else {
        body.to_string()
    };
    truncated.replace(|c: char| c.is_control() && c != ' ', "")
}

/// Router for both dialects
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(aws::handle).post(aws::handle))
        .nest("/compute/v1", gcp::routes())
        .fallback(not_found)
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

/// Serve until Ctrl-C
pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    let addr = listener.local_addr().context("Failed to read listener address")?;
    info!("cloudmock listening on http://{}", addr);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let started = Instant::now();

    let response = next.run(request).await;

    let status = response.status();
    let elapsed_ms = started.elapsed().as_millis();
    if status.is_server_error() {
        warn!("{} {} -> {} ({} ms)", method, uri, status, elapsed_ms);
    } else if status.is_client_error() {
        info!("{} {} -> {} ({} ms)", method, uri, status, elapsed_ms);
    } else {
        debug!("{} {} -> {} ({} ms)", method, uri, status, elapsed_ms);
    }
    response
}

async fn not_found(uri: Uri) -> Response {
    let err = ErrorEnvelope::of(
        Dialect::Gcp,
        ErrorKind::NotFound,
        format!("The requested URL {} was not found on this server", uri.path()),
    );
    (StatusCode::NOT_FOUND, Json(error_body(&err))).into_response()
}
