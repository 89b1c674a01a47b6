use axum::extract::{Multipart, State};
use axum::Json;
use serde::Serialize;

use crate::error::ExtractionError;
use crate::models::ExtractionResult;
use crate::pipeline::Strategy;

use super::state::AppState;
use super::upload::save_upload;

#[derive(Debug, Clone, Serialize)]
pub struct HealthData {
    pub status: String,
    pub version: String,
    pub ocr: OcrStatus,
    pub vision: VisionStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct OcrStatus {
    pub languages: String,
    pub live_engines: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct VisionStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// `POST /image/analyze`
///
/// Multipart form with an `image` field, recognized with local OCR.
pub async fn analyze_image(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ExtractionResult>, ExtractionError> {
    analyze(&state, multipart, "image", Strategy::LocalOcr).await
}

/// `POST /image/analyze-openai`
///
/// Multipart form with a `file` field, read by the remote vision model.
pub async fn analyze_image_with_vision(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ExtractionResult>, ExtractionError> {
    analyze(&state, multipart, "file", Strategy::RemoteVision).await
}

async fn analyze(
    state: &AppState,
    mut multipart: Multipart,
    field_name: &str,
    strategy: Strategy,
) -> Result<Json<ExtractionResult>, ExtractionError> {
    let upload = save_upload(&state.config.uploads.dir, &mut multipart, field_name)
        .await
        .map_err(|e| {
            tracing::warn!(%strategy, error = %e, "Upload rejected");
            ExtractionError::new(strategy.failure_message(), e)
        })?;

    let result = state.pipeline.run(strategy, upload.as_ref()).await?;
    Ok(Json(result))
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthData> {
    let vision = state.pipeline.vision();
    let vision_status = VisionStatus {
        status: if vision.is_available() {
            "available".to_string()
        } else {
            "unavailable".to_string()
        },
        model: vision.model().map(str::to_string),
    };

    Json(HealthData {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        ocr: OcrStatus {
            languages: state.pipeline.languages().to_string(),
            live_engines: state.pipeline.ocr().live_engines(),
        },
        vision: vision_status,
    })
}
