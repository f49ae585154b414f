pub mod api;
pub mod auth;
pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod lifecycle;
pub mod model;
pub mod pipeline;
pub mod registry;
pub mod traits;

pub mod mocks;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::Router;

pub use auth::StaticTokenVerifier;
pub use config::{Config, DEFAULT_MAX_UPLOAD_BYTES};
pub use dispatcher::{Dispatcher, ResultPayload};
pub use errors::{GatewayError, Result};
pub use model::OrtSession;
pub use registry::{Backbone, PipelineKey, TaskSpec};
pub use traits::*;

/// Full HTTP application: every route wrapped in the request lifecycle, with request
/// bodies capped at `max_upload_bytes`.
pub fn build_app(
    spec: Arc<TaskSpec>,
    verifier: Arc<dyn TokenVerifier>,
    max_upload_bytes: usize,
) -> Router {
    let state = api::AppState {
        dispatcher: Dispatcher::new(spec),
    };
    let router = api::create_router(state).layer(DefaultBodyLimit::max(max_upload_bytes));
    lifecycle::with_lifecycle(router, verifier)
}
