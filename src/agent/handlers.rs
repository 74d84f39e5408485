use super::activity_log::ActivityLog;
use super::launcher::UriLauncher;
use crate::error::ValidationError;
use axum::{
    body::Bytes,
    extract::{Request, State},
    http::{HeaderValue, Method, StatusCode, Uri, header},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::Value;
use std::sync::Arc;

#[derive(Clone)]
pub struct LoopbackState {
    pub launcher: Arc<dyn UriLauncher>,
    pub log: Arc<ActivityLog>,
}

fn with_cors(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({ "status": "error", "message": message.into() })),
    )
        .into_response()
}

/// Extract the URI from a loopback request body.
pub fn parse_uri(body: &[u8]) -> Result<String, ValidationError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ValidationError::MalformedBody(e.to_string()))?;
    match value.get("uri") {
        Some(Value::String(uri)) if !uri.trim().is_empty() => Ok(uri.clone()),
        _ => Err(ValidationError::MissingUri),
    }
}

/// Outermost middleware: every response, including the body-limit and
/// timeout rejections that never reach [`handle_request`], gets CORS headers
/// and those rejections are written to the activity log.
pub(super) async fn cors_and_record_rejections(
    State(log): State<Arc<ActivityLog>>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let response = next.run(request).await;

    let status = response.status();
    if matches!(
        status,
        StatusCode::PAYLOAD_TOO_LARGE | StatusCode::REQUEST_TIMEOUT
    ) {
        log.record(format!("Error: {method} {path} rejected with {status}"));
    }
    with_cors(response)
}

/// Every method on every path lands here.
pub(super) async fn handle_request(
    State(state): State<LoopbackState>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    match method {
        Method::OPTIONS => StatusCode::OK.into_response(),
        Method::POST => handle_post(&state, uri.path(), &body).await,
        other => {
            state.log.record(format!("{other} {} rejected", uri.path()));
            (
                StatusCode::METHOD_NOT_ALLOWED,
                Json(serde_json::json!({ "error": "Method not allowed. Use POST." })),
            )
                .into_response()
        }
    }
}

async fn handle_post(state: &LoopbackState, path: &str, body: &[u8]) -> Response {
    state.log.record(format!("POST {path}"));
    state
        .log
        .record(format!("Body: {}", String::from_utf8_lossy(body)));

    let uri = match parse_uri(body) {
        Ok(uri) => uri,
        Err(ValidationError::MalformedBody(detail)) => {
            state.log.record(format!("Error: invalid JSON body: {detail}"));
            return error_response(StatusCode::BAD_REQUEST, "Invalid JSON body");
        }
        Err(e) => {
            state.log.record(e.to_string());
            return error_response(StatusCode::BAD_REQUEST, e.to_string());
        }
    };

    state.log.record(format!("Opening URI: {uri}"));
    match state.launcher.open(&uri).await {
        Ok(()) => {
            state.log.record("Screen pop triggered successfully");
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "status": "success",
                    "message": "Screen pop triggered",
                    "timestamp": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                })),
            )
                .into_response()
        }
        Err(e) => {
            state.log.record(format!("Error: {e}"));
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
