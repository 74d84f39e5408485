//! Relay service: accepts mailbox writes over plain HTTP from producers that
//! cannot hold store credentials and forwards them to the durable mailbox.

use crate::error::{ScreenPopError, ValidationError};
use crate::mailbox::{MailboxWriter, RecipientKey, ScreenPopRecord};
use anyhow::{Context, Result};
use axum::{
    Router,
    extract::{State, rejection::JsonRejection},
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Json},
    routing::post,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

pub const MAX_BODY_SIZE: usize = 65_536;
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Clone)]
pub struct RelayState {
    pub writer: Arc<dyn MailboxWriter>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayBody {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
}

pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

pub fn router(writer: Arc<dyn MailboxWriter>) -> Router {
    Router::new()
        .route("/api/data", post(handle_data).options(handle_preflight))
        .with_state(RelayState { writer })
        .layer(cors_layer())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        ))
}

fn error(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<serde_json::Value>) {
    (
        status,
        Json(serde_json::json!({ "status": "error", "message": message.into() })),
    )
}

async fn handle_preflight() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"))],
    )
}

/// Validate the body and append the job; returns the recipient and new id.
async fn store(
    state: &RelayState,
    body: Result<Json<RelayBody>, JsonRejection>,
) -> Result<(RecipientKey, String), ScreenPopError> {
    let Json(body) = body.map_err(|e| ValidationError::MalformedBody(e.body_text()))?;
    let recipient = body
        .username
        .as_deref()
        .and_then(RecipientKey::from_identity)
        .ok_or(ValidationError::Required("username"))?;
    let uri = body
        .uri
        .filter(|uri| !uri.trim().is_empty())
        .ok_or(ValidationError::Required("uri"))?;

    let record = ScreenPopRecord::new(uri, body.phone_number);
    let message_id = state.writer.append(&recipient, &record).await?;
    Ok((recipient, message_id))
}

/// POST /api/data: append one screen pop job for `username`
async fn handle_data(
    State(state): State<RelayState>,
    body: Result<Json<RelayBody>, JsonRejection>,
) -> impl IntoResponse {
    match store(&state, body).await {
        Ok((recipient, message_id)) => {
            tracing::info!(recipient = %recipient, id = %message_id, "relay stored screen pop");
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "status": "success",
                    "messageId": message_id,
                    "timestamp": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                })),
            )
        }
        Err(e) => {
            let status = StatusCode::from_u16(e.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            if status.is_client_error() {
                tracing::warn!(error = %e, "relay rejected request");
            } else {
                tracing::error!(error = %e, "relay write failed");
            }
            error(status, e.public_message())
        }
    }
}

pub async fn run_relay(
    host: &str,
    port: u16,
    writer: Arc<dyn MailboxWriter>,
    shutdown: CancellationToken,
) -> Result<()> {
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid relay address {host}:{port}"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind relay on {addr}"))?;
    run_relay_with_listener(listener, writer, shutdown).await
}

pub async fn run_relay_with_listener(
    listener: tokio::net::TcpListener,
    writer: Arc<dyn MailboxWriter>,
    shutdown: CancellationToken,
) -> Result<()> {
    let local = listener.local_addr()?;
    tracing::info!(addr = %local, writer = writer.name(), "relay listening on POST /api/data");

    axum::serve(listener, router(writer))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    tracing::info!("relay stopped");
    Ok(())
}
