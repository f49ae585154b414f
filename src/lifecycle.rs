//! Per-request bookkeeping wrapped around every route.
//!
//! Each request gets a correlation id and a timer on entry, is authenticated unless it
//! targets the liveness check, and is logged with its status and duration on exit, whether
//! the handler succeeded, failed or panicked.

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::Router;
use serde::Serialize;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::Instrument;
use uuid::Uuid;

use crate::auth::bearer_token;
use crate::errors::{GatewayError, Result, INTERNAL_ERROR_MESSAGE};
use crate::traits::TokenVerifier;

pub const HEALTH_PATH: &str = "/health";
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Error envelope shared by every failing response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Per-request state created on entry and handed to handlers through request extensions.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub correlation_id: Uuid,
    pub started_at: Instant,
    pub method: Method,
    pub path: String,
    pub principal: Option<String>,
}

impl RequestContext {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            started_at: Instant::now(),
            method,
            path: path.into(),
            principal: None,
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        if self.is_client_fault() {
            tracing::warn!(error = %self, "request rejected");
        } else {
            tracing::error!(error = ?self, "request failed");
        }
        error_response(self.status(), self.public_message())
    }
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}

/// Wrap `router` with the request lifecycle. Layers added later run first, so the
/// tracker sees the response the panic guard produces.
pub fn with_lifecycle(router: Router, verifier: Arc<dyn TokenVerifier>) -> Router {
    router
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(middleware::from_fn_with_state(verifier, track_request))
        .layer(TraceLayer::new_for_http())
}

pub async fn track_request(
    State(verifier): State<Arc<dyn TokenVerifier>>,
    mut request: Request,
    next: Next,
) -> Response {
    let mut ctx = RequestContext::new(request.method().clone(), request.uri().path());
    let span = tracing::info_span!(
        "request",
        correlation_id = %ctx.correlation_id,
        method = %ctx.method,
        path = %ctx.path,
    );

    async move {
        let correlation_id = ctx.correlation_id;
        let timer = ctx.clone();

        let mut response = match authenticate(verifier.as_ref(), &request, &ctx.path) {
            Ok(principal) => {
                ctx.principal = principal;
                request.extensions_mut().insert(ctx);
                next.run(request).await
            }
            Err(err) => err.into_response(),
        };

        if let Ok(value) = HeaderValue::from_str(&correlation_id.to_string()) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }

        tracing::info!(
            status = response.status().as_u16(),
            elapsed_ms = timer.elapsed_ms(),
            "request completed"
        );
        response
    }
    .instrument(span)
    .await
}

fn authenticate(
    verifier: &dyn TokenVerifier,
    request: &Request,
    path: &str,
) -> Result<Option<String>> {
    if path == HEALTH_PATH {
        return Ok(None);
    }
    let token = bearer_token(request.headers())?;
    let principal = verifier.verify(token)?;
    tracing::debug!(%principal, "authenticated");
    Ok(Some(principal))
}

/// Turns a caught panic into the generic 500 envelope; the payload only reaches the log.
pub fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    tracing::error!(panic = %panic_message(payload.as_ref()), "handler panicked");
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        INTERNAL_ERROR_MESSAGE.to_string(),
    )
}

pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
