use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;

use crate::error::AnalysisError;
use crate::handlers::{AnalysisOutcome, AnalysisWorkflow, MetadataUpdate, SessionSnapshot};
use crate::services::{CameraFrame, UploadedBytes};

/// Camera frames arrive base64 encoded inside JSON.
const TRANSPORT_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Debug, Deserialize)]
pub struct CameraFrameBody {
    pub frame: String,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub outcome: AnalysisOutcome,
    pub session: SessionSnapshot,
}

/// Acquisition and precondition errors rendered as JSON.
pub struct ApiError(AnalysisError);

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_inference_failure() {
            StatusCode::BAD_GATEWAY
        } else if matches!(self.0, AnalysisError::UnsupportedFormat(_)) {
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        } else {
            StatusCode::BAD_REQUEST
        };
        let body = serde_json::json!({
            "error": self.0.user_message(),
            "detail": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

pub fn create_router(workflow: AnalysisWorkflow, max_upload_bytes: usize) -> Router {
    let body_limit = (max_upload_bytes / 3)
        .saturating_mul(4)
        .saturating_add(TRANSPORT_OVERHEAD_BYTES);

    Router::new()
        .route("/session", get(get_session))
        .route("/session/image", delete(clear_image))
        .route("/session/image/camera", post(camera_frame))
        .route("/session/image/upload", post(upload_image))
        .route("/session/metadata", patch(update_metadata))
        .route("/session/metadata/refrigerated/toggle", post(toggle_refrigerated))
        .route("/session/analyze", post(analyze))
        .route("/session/reset", post(reset))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .with_state(workflow)
}

async fn get_session(State(workflow): State<AnalysisWorkflow>) -> Json<SessionSnapshot> {
    Json(workflow.snapshot().await)
}

async fn camera_frame(
    State(workflow): State<AnalysisWorkflow>,
    Json(body): Json<CameraFrameBody>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    log::info!("📷 Camera frame received ({} chars)", body.frame.len());
    let snapshot = workflow.acquire(&CameraFrame::new(body.frame)).await?;
    Ok(Json(snapshot))
}

async fn upload_image(
    State(workflow): State<AnalysisWorkflow>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());
    log::info!("📤 Upload received: {} bytes ({:?})", body.len(), content_type);

    let snapshot = workflow
        .acquire(&UploadedBytes::new(body.to_vec(), content_type))
        .await?;
    Ok(Json(snapshot))
}

async fn clear_image(State(workflow): State<AnalysisWorkflow>) -> Json<SessionSnapshot> {
    Json(workflow.clear_image().await)
}

async fn update_metadata(
    State(workflow): State<AnalysisWorkflow>,
    Json(update): Json<MetadataUpdate>,
) -> Json<SessionSnapshot> {
    Json(workflow.update_metadata(update).await)
}

async fn toggle_refrigerated(State(workflow): State<AnalysisWorkflow>) -> Json<SessionSnapshot> {
    Json(workflow.toggle_refrigerated().await)
}

async fn analyze(State(workflow): State<AnalysisWorkflow>) -> Json<AnalyzeResponse> {
    let outcome = workflow.run_analysis().await;
    log::info!("🔬 Analysis request finished: {:?}", outcome);
    Json(AnalyzeResponse {
        outcome,
        session: workflow.snapshot().await,
    })
}

async fn reset(State(workflow): State<AnalysisWorkflow>) -> Json<SessionSnapshot> {
    Json(workflow.reset().await)
}
