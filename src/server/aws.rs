//! EC2 query endpoint

use axum::body::Bytes;
use axum::extract::{RawQuery, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::aws::query::QueryParams;
use crate::aws::xml::{render_response, serialize_error_response};
use crate::aws::{describe, dispatch, is_read_only};
use crate::core::{Dialect, ErrorEnvelope};
use crate::state::AppState;

use super::sanitize_for_log;

const XML_CONTENT_TYPE: &str = "text/xml;charset=UTF-8";

fn xml(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, XML_CONTENT_TYPE)], body).into_response()
}

/// `GET /?Action=...` or a form-encoded `POST /`
pub(super) async fn handle(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let params = QueryParams::parse(query.as_deref(), &body);
    if !body.is_empty() {
        debug!("EC2 request {}: {}", request_id, sanitize_for_log(&String::from_utf8_lossy(&body)));
    }

    let Some(action) = params.action().map(str::to_string) else {
        let err = ErrorEnvelope::missing_parameter(Dialect::Aws, "Action");
        return xml(
            StatusCode::from_u16(err.http_status).unwrap_or(StatusCode::BAD_REQUEST),
            serialize_error_response(&err, &request_id),
        );
    };

    let outcome = if is_read_only(&action) {
        let ec2 = state.ec2.read().await;
        describe(&ec2, &action, &params)
    } else {
        let mut ec2 = state.ec2.write().await;
        dispatch(&mut ec2, &action, &params)
    };

    match outcome {
        Ok(fields) => xml(StatusCode::OK, render_response(&action, &request_id, &fields)),
        Err(err) => {
            warn!("{} failed: {}", action, err);
            xml(
                StatusCode::from_u16(err.http_status).unwrap_or(StatusCode::BAD_REQUEST),
                serialize_error_response(&err, &request_id),
            )
        }
    }
}
