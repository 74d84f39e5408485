use super::handlers::{LoopbackState, cors_and_record_rejections, handle_request};
use super::tls::TlsListener;
use axum::{Router, http::StatusCode, middleware};
use rustls::ServerConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Maximum request body size (64KB)
pub const MAX_BODY_SIZE: usize = 65_536;
/// Request timeout (30s)
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// The loopback contract is path-agnostic: one handler serves every route.
pub fn loopback_router(state: LoopbackState) -> Router {
    let log = Arc::clone(&state.log);
    Router::new()
        .fallback(handle_request)
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        ))
        .layer(middleware::from_fn_with_state(log, cors_and_record_rejections))
}

pub async fn serve_plaintext(listener: TcpListener, router: Router, shutdown: CancellationToken) {
    if let Err(e) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
    {
        tracing::error!(error = %e, "HTTP listener failed");
    }
}

pub async fn serve_tls(
    listener: TcpListener,
    config: Arc<ServerConfig>,
    router: Router,
    shutdown: CancellationToken,
) {
    let listener = TlsListener::new(listener, config);
    if let Err(e) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
    {
        tracing::error!(error = %e, "HTTPS listener failed");
    }
}
