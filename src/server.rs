// HTTP surface: router, shared state and the analyze endpoint

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{error, info, warn};

use crate::core::config::Config;
use crate::core::errors::{PipelineError, ValidationError};
use crate::core::types::{BatchResponse, Submission, UploadedFile};
use crate::orchestration::{BatchOrchestrator, Validator};
use crate::utils::Metrics;

/// Multipart field carrying the screenshots
pub const FILES_FIELD: &str = "files";

const NOT_CONFIGURED: &str = "vision service credentials not configured";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    validator: Arc<Validator>,
    /// None when no API key is configured
    orchestrator: Option<Arc<BatchOrchestrator>>,
    metrics: Metrics,
}

impl AppState {
    pub fn new(config: Arc<Config>, orchestrator: Option<Arc<BatchOrchestrator>>, metrics: Metrics) -> Self {
        let validator = Arc::new(Validator::new(config.max_files()));
        Self {
            config,
            validator,
            orchestrator,
            metrics,
        }
    }
}

/// Request-level failures. Item failures never end up here.
#[derive(Debug)]
pub enum ApiError {
    Validation(ValidationError),
    Multipart(MultipartError),
    NotConfigured,
    Pipeline(PipelineError),
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err)
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        Self::Pipeline(err)
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self::Multipart(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::Validation(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::Multipart(e) => (e.status(), format!("invalid multipart body: {}", e.body_text())),
            ApiError::NotConfigured => (StatusCode::INTERNAL_SERVER_ERROR, NOT_CONFIGURED.to_string()),
            ApiError::Pipeline(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

/// Build the router with monitoring endpoints
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.server.max_body_bytes;
    let cors = cors_layer(&state.config.server.cors_allowed_origins);

    let router = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/stats", get(stats_endpoint))
        .route("/analyze", post(analyze))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit));

    match cors {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    if origins.is_empty() {
        return None;
    }

    let allow_origin = if origins.iter().any(|origin| origin == "*") {
        AllowOrigin::from(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("Ignoring invalid CORS origin: {}", origin);
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };

    Some(
        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods(Any)
            .allow_headers(Any),
    )
}

async fn root() -> &'static str {
    "SnapSort screenshot product extraction"
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.metrics.record_endpoint_request("/health");
    Json(json!({ "status": "ok" }))
}

/// Prometheus metrics endpoint
async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.to_prometheus(),
    )
}

/// Detailed statistics endpoint (JSON)
async fn stats_endpoint(State(state): State<AppState>) -> Json<serde_json::Value> {
    let snapshot = state.metrics.snapshot();
    Json(json!({
        "metrics": snapshot,
        "vision_configured": state.orchestrator.is_some(),
        "max_concurrency": state.config.max_concurrency(),
        "max_files": state.config.max_files(),
    }))
}

/// Analyze screenshots endpoint
///
/// # Request Format:
/// - multipart/form-data
/// - Field "files": one or more PNG/JPEG screenshots
///
/// # Response:
/// - `{"results": [...]}`, one entry per file in submission order
async fn analyze(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<BatchResponse>, ApiError> {
    let start_time = Instant::now();
    state.metrics.record_endpoint_request("/analyze");

    let submission = read_submission(multipart).await?;
    info!("Received analyze request with {} files", submission.files.len());

    let batch = match state.validator.validate(submission) {
        Ok(batch) => batch,
        Err(e) => {
            warn!("Rejected submission: {}", e);
            state.metrics.record_batch_rejected();
            return Err(e.into());
        }
    };

    let Some(orchestrator) = state.orchestrator.as_ref() else {
        error!("Cannot analyze: {}", NOT_CONFIGURED);
        return Err(ApiError::NotConfigured);
    };

    let response = orchestrator.process_batch(batch).await.map_err(|e| {
        error!("Batch processing failed: {}", e);
        ApiError::from(e)
    })?;

    info!(
        "Request completed in {:.2}s: {} successful, {} failed",
        start_time.elapsed().as_secs_f64(),
        response.successful(),
        response.failed()
    );

    Ok(Json(response))
}

/// Collect every `files` part in form order; other fields are ignored
async fn read_submission(mut multipart: Multipart) -> Result<Submission, ApiError> {
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILES_FIELD) {
            continue;
        }

        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await?;

        files.push(UploadedFile {
            filename,
            content_type,
            bytes,
        });
    }

    Ok(Submission { files })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn state() -> AppState {
        let config = Config::from_source(|_| None).unwrap();
        AppState::new(Arc::new(config), None, Metrics::new())
    }

    #[test]
    fn test_error_status_mapping() {
        let validation = ApiError::from(ValidationError::NoFiles).into_response();
        assert_eq!(validation.status(), StatusCode::BAD_REQUEST);

        let pipeline = ApiError::from(PipelineError::MissingOutcome { index: 0 }).into_response();
        assert_eq!(pipeline.status(), StatusCode::INTERNAL_SERVER_ERROR);

        assert_eq!(
            ApiError::NotConfigured.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_cors_layer_only_when_configured() {
        assert!(cors_layer(&[]).is_none());
        assert!(cors_layer(&["*".to_string()]).is_some());
        assert!(cors_layer(&["https://app.example.com".to_string()]).is_some());
    }

    #[tokio::test]
    async fn test_health_and_root() {
        let app = build_router(state());

        let health = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);

        let root = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(root.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_endpoint_is_prometheus_text() {
        let response = build_router(state())
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; version=0.0.4"
        );
    }
}
