//! HTTP API module - analyze endpoint and result files

mod rate_limit;

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::backend::{analyze_image, GenerativeBackend, ImagePayload};
use crate::error::{AdvisorError, Result};
use crate::images::{validate_upload, UploadStore};
use crate::pipeline::Orchestrator;
use crate::protocol::{AnalyzeResponse, ErrorResponse};
pub use rate_limit::{ClientKey, RateLimiter};

/// Multipart overhead allowed on top of the upload limit
const MULTIPART_SLACK_BYTES: usize = 64 * 1024;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn GenerativeBackend>,
    pub orchestrator: Orchestrator,
    pub uploads: UploadStore,
    pub limiter: Arc<RateLimiter>,
    pub max_upload_bytes: usize,
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    let results = ServeDir::new(state.orchestrator.store().root());
    let body_limit = state.max_upload_bytes + MULTIPART_SLACK_BYTES;

    Router::new()
        .route("/health", get(health_check))
        .route("/", get(root))
        .route("/api/analyze-urban-space", post(analyze_urban_space))
        .nest_service("/results", results)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}

impl IntoResponse for AdvisorError {
    fn into_response(self) -> Response {
        match &self {
            AdvisorError::Validation(msg) => warn!("Rejected upload: {}", msg),
            AdvisorError::RateLimited => warn!("Rate limit exceeded"),
            other => error!("Error processing request: {}", other),
        }
        (self.status(), Json(ErrorResponse::from(&self))).into_response()
    }
}

/// Root endpoint
async fn root() -> impl IntoResponse {
    Json(RootResponse {
        name: "advisord",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
struct RootResponse {
    name: &'static str,
    version: &'static str,
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let results_root = state.orchestrator.store().root();
    match tokio::fs::create_dir_all(results_root).await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy",
                storage: "ok",
            }),
        ),
        Err(e) => {
            warn!("Results directory {:?} unavailable: {}", results_root, e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unhealthy",
                    storage: "error",
                }),
            )
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    storage: &'static str,
}

#[derive(Debug, Deserialize)]
struct AnalyzeParams {
    incremental: Option<String>,
}

/// Uploaded `image` part
struct Upload {
    data: Vec<u8>,
    content_type: Option<String>,
    file_name: Option<String>,
}

/// Analyze an uploaded photo and visualize the recommended improvements
async fn analyze_urban_space(
    State(state): State<AppState>,
    ClientKey(client): ClientKey,
    Query(params): Query<AnalyzeParams>,
    multipart: Multipart,
) -> Result<Json<AnalyzeResponse>> {
    if !state.limiter.consume(&client).await {
        return Err(AdvisorError::RateLimited);
    }

    let incremental = params.incremental.as_deref() == Some("true");
    info!(
        "Incremental visualization: {}",
        if incremental { "enabled" } else { "disabled" }
    );

    let upload = read_image_part(multipart, state.max_upload_bytes).await?;
    let kind = validate_upload(
        upload.data.len(),
        upload.content_type.as_deref(),
        upload.file_name.as_deref(),
        state.max_upload_bytes,
    )?;
    let upload_path = state.uploads.save(&upload.data, kind).await?;

    let image = ImagePayload {
        mime_type: kind.mime().to_string(),
        data: upload.data,
    };

    let result = async {
        let analysis = analyze_image(state.backend.as_ref(), &image).await?;
        let outcome = state
            .orchestrator
            .visualize(&image, &analysis, incremental)
            .await?;
        Ok::<_, AdvisorError>(AnalyzeResponse::new(analysis, outcome))
    }
    .await;

    match result {
        Ok(response) => {
            info!(
                "Returning {} images for {}",
                response.incremental_images.len(),
                response.image_url
            );
            Ok(Json(response))
        }
        Err(e) => {
            state.uploads.discard(&upload_path).await;
            Err(e)
        }
    }
}

/// Pull the `image` part out of the form; other parts are ignored
async fn read_image_part(mut multipart: Multipart, max_bytes: usize) -> Result<Upload> {
    let too_large = || {
        AdvisorError::Validation(format!(
            "file size exceeds {}MB limit",
            max_bytes / (1024 * 1024)
        ))
    };
    let malformed = |e: axum::extract::multipart::MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            too_large()
        } else {
            AdvisorError::Validation(format!("malformed upload: {}", e.body_text()))
        }
    };

    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        if field.name() != Some("image") {
            continue;
        }
        let content_type = field.content_type().map(str::to_string);
        let file_name = field.file_name().map(str::to_string);
        let data = field.bytes().await.map_err(malformed)?;
        return Ok(Upload {
            data: data.to_vec(),
            content_type,
            file_name,
        });
    }

    Err(AdvisorError::Validation("No image uploaded".to_string()))
}
