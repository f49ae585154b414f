use std::io::{Cursor, Write};

use axum::body::Bytes;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderName, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::{Extension, Router};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::dispatcher::{Dispatcher, ResultPayload};
use crate::errors::{GatewayError, Result};
use crate::lifecycle::{panic_message, RequestContext, HEALTH_PATH};
use crate::registry::{Backbone, PipelineKey};

pub const IMAGE_FIELD: &str = "image";
pub const USE_VIT_FIELD: &str = "useViT";

pub const MASK_ENTRY: &str = "predicted_mask.png";
pub const OVERLAY_ENTRY: &str = "result_image.png";
pub const FLOOD_DETECTED_HEADER: HeaderName = HeaderName::from_static("x-flood-detected");

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
}

/// GET /health response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// POST /classify request body.
#[derive(Debug, Deserialize)]
pub struct ClassifyJsonRequest {
    /// Base64-encoded image bytes.
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default, rename = "useViT")]
    pub use_vit: bool,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(health))
        .route("/classify_crop", post(classify_crop))
        .route("/classify", post(classify_json))
        .route("/colorize", post(colorize))
        .route("/flood_detection", post(flood_detection))
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

/// POST /classify_crop — multipart `image` plus optional `useViT`.
async fn classify_crop(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Response> {
    let form = TaskForm::read(multipart).await?;
    let key = PipelineKey::Classify(Backbone::from_vit_flag(form.use_vit));
    let payload = run_pipeline(&state, ctx, key, form.require_image()?).await?;
    respond(payload)
}

/// POST /classify — JSON body with a base64 image.
async fn classify_json(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    body: std::result::Result<Json<ClassifyJsonRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(request) = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return GatewayError::PayloadTooLarge {
                reason: rejection.body_text(),
            };
        }
        tracing::debug!(%rejection, "unreadable JSON body");
        GatewayError::missing_input(IMAGE_FIELD)
    })?;

    let encoded = request
        .image
        .filter(|image| !image.trim().is_empty())
        .ok_or_else(|| GatewayError::missing_input(IMAGE_FIELD))?;
    let image = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| GatewayError::Decode {
            reason: format!("invalid base64: {e}"),
        })?;

    let key = PipelineKey::Classify(Backbone::from_vit_flag(request.use_vit));
    let payload = run_pipeline(&state, ctx, key, Bytes::from(image)).await?;
    respond(payload)
}

/// POST /colorize — multipart `image`, answers with a PNG.
async fn colorize(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Response> {
    let form = TaskForm::read(multipart).await?;
    let payload =
        run_pipeline(&state, ctx, PipelineKey::Colorize, form.require_image()?).await?;
    respond(payload)
}

/// POST /flood_detection — multipart `image`, answers with a zip of mask and overlay.
async fn flood_detection(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Response> {
    let form = TaskForm::read(multipart).await?;
    let payload =
        run_pipeline(&state, ctx, PipelineKey::FloodSegment, form.require_image()?).await?;
    respond(payload)
}

#[derive(Debug, Default)]
struct TaskForm {
    image: Option<Bytes>,
    use_vit: bool,
}

impl TaskForm {
    async fn read(multipart: std::result::Result<Multipart, MultipartRejection>) -> Result<Self> {
        let mut multipart = multipart.map_err(|rejection| {
            tracing::debug!(%rejection, "request body is not multipart");
            GatewayError::missing_input(IMAGE_FIELD)
        })?;

        let mut form = Self::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| multipart_error("multipart body", e))?
        {
            let name = field.name().map(str::to_owned);
            match name.as_deref() {
                Some(IMAGE_FIELD) => {
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| multipart_error("image field", e))?;
                    form.image = Some(bytes).filter(|bytes| !bytes.is_empty());
                }
                Some(USE_VIT_FIELD) => {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| multipart_error("useViT field", e))?;
                    form.use_vit = parse_flag(&text);
                }
                _ => {}
            }
        }
        Ok(form)
    }

    fn require_image(self) -> Result<Bytes> {
        self.image.ok_or_else(|| GatewayError::missing_input(IMAGE_FIELD))
    }
}

/// A body cut off by the upload limit is reported as such, anything else as malformed.
fn multipart_error(part: &str, err: MultipartError) -> GatewayError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        GatewayError::PayloadTooLarge {
            reason: format!("{part}: {}", err.body_text()),
        }
    } else {
        GatewayError::Decode {
            reason: format!("{part}: {}", err.body_text()),
        }
    }
}

/// `true`, `1`, `yes` and `on` (any case) select the alternate backbone.
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

/// Inference is CPU-bound, so the whole pipeline runs on the blocking pool inside the
/// caller's span.
async fn run_pipeline(
    state: &AppState,
    ctx: RequestContext,
    key: PipelineKey,
    image: Bytes,
) -> Result<ResultPayload> {
    let dispatcher = state.dispatcher.clone();
    let span = tracing::Span::current();

    tokio::task::spawn_blocking(move || {
        span.in_scope(|| dispatcher.dispatch(&ctx, key, &image))
    })
    .await
    .map_err(|err| {
        if err.is_panic() {
            let payload = err.into_panic();
            tracing::error!(
                panic = %panic_message(payload.as_ref()),
                "inference task panicked"
            );
            GatewayError::unexpected("running inference task", "inference task panicked")
        } else {
            GatewayError::unexpected("running inference task", err)
        }
    })?
}

fn respond(payload: ResultPayload) -> Result<Response> {
    let response = match payload {
        ResultPayload::Classification(body) => Json(body).into_response(),
        ResultPayload::Colorized { png } => ([(CONTENT_TYPE, "image/png")], png).into_response(),
        ResultPayload::Flood {
            mask_png,
            overlay_png,
            flood_detected,
        } => {
            let archive = flood_archive(&mask_png, &overlay_png)?;
            (
                [
                    (CONTENT_TYPE, "application/zip"),
                    (
                        CONTENT_DISPOSITION,
                        "attachment; filename=\"flood_result.zip\"",
                    ),
                    (
                        FLOOD_DETECTED_HEADER,
                        if flood_detected { "true" } else { "false" },
                    ),
                ],
                archive,
            )
                .into_response()
        }
    };
    Ok(response)
}

/// Zip holding the binary mask and the outlined overlay.
pub fn flood_archive(mask_png: &[u8], overlay_png: &[u8]) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (entry, bytes) in [(MASK_ENTRY, mask_png), (OVERLAY_ENTRY, overlay_png)] {
        writer
            .start_file(entry, options)
            .map_err(|e| GatewayError::unexpected("writing flood archive", e))?;
        writer
            .write_all(bytes)
            .map_err(|e| GatewayError::unexpected("writing flood archive", e))?;
    }

    let cursor = writer
        .finish()
        .map_err(|e| GatewayError::unexpected("finishing flood archive", e))?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_parse_flag() {
        for value in ["true", "TRUE", "1", "yes", "On", " true "] {
            assert!(parse_flag(value), "{value:?}");
        }
        for value in ["false", "0", "", "no", "vit"] {
            assert!(!parse_flag(value), "{value:?}");
        }
    }

    #[test]
    fn test_flood_archive_entries() -> Result<()> {
        let archive = flood_archive(b"mask", b"overlay")?;
        let mut zip = zip::ZipArchive::new(Cursor::new(archive))
            .map_err(|e| GatewayError::unexpected("reading archive", e))?;
        assert_eq!(zip.len(), 2);

        let mut mask = Vec::new();
        zip.by_name(MASK_ENTRY)
            .map_err(|e| GatewayError::unexpected("reading archive", e))?
            .read_to_end(&mut mask)
            .map_err(|e| GatewayError::unexpected("reading archive", e))?;
        assert_eq!(mask, b"mask");
        assert!(zip.by_name(OVERLAY_ENTRY).is_ok());
        Ok(())
    }
}
