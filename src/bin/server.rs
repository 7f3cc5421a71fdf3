use std::env;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use anyhow::{Context, Result};
use axum::{
    Router,
    body::Body,
    extract::{DefaultBodyLimit, Multipart, State},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use qa_batch_rs::{ApiConfig, PipelineError, QaApiClient, RunDirs, RunParams, run_batch};

/// Server configuration
struct ServerConfig {
    port: u16,
}

impl ServerConfig {
    fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
        }
    }
}

/// Application state shared across all requests
#[derive(Clone)]
struct AppState {
    client: QaApiClient,
    dirs: RunDirs,
    metrics: Arc<Metrics>,
}

/// Server metrics
struct Metrics {
    total_requests: AtomicU64,
    requests_in_flight: AtomicU64,
    start_time: Instant,
}

/// RAII guard for tracking in-flight requests
struct RequestGuard<'a>(&'a AtomicU64);

impl<'a> Drop for RequestGuard<'a> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "server=info,qa_batch_rs=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();

    let api_config = ApiConfig::from_env().context("Incomplete API configuration")?;
    let client = QaApiClient::new(api_config).context("Failed to build HTTP client")?;

    let dirs = RunDirs::from_env();
    dirs.ensure().context("Failed to create run directories")?;

    let app = build_app(client, dirs);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

/// Build the Axum application with routes and middleware
fn build_app(client: QaApiClient, dirs: RunDirs) -> Router {
    let metrics = Arc::new(Metrics {
        total_requests: AtomicU64::new(0),
        requests_in_flight: AtomicU64::new(0),
        start_time: Instant::now(),
    });

    let state = AppState {
        client,
        dirs,
        metrics,
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/upload-file", post(upload_file))
        .route("/api/metrics", get(get_metrics))
        // Spreadsheets routinely exceed the default multipart limit
        .layer(DefaultBodyLimit::max(50 * 1024 * 1024))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// Upload a questions spreadsheet and run the batch over it.
///
/// Multipart fields: `file` (the spreadsheet), `product`, `version`,
/// `app_id`, optional `session_id`. The processed spreadsheet is returned
/// as a download.
async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    state.metrics.total_requests.fetch_add(1, Ordering::Relaxed);
    state
        .metrics
        .requests_in_flight
        .fetch_add(1, Ordering::Relaxed);
    let _guard = RequestGuard(&state.metrics.requests_in_flight);

    let mut file: Option<(String, Vec<u8>)> = None;
    let mut product = None;
    let mut version = None;
    let mut app_id = None;
    let mut session_id = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or("upload.csv").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("failed to read upload: {}", e)))?;
                file = Some((filename, bytes.to_vec()));
            }
            "product" => product = Some(read_text_field(field).await?),
            "version" => version = Some(read_text_field(field).await?),
            "app_id" => app_id = Some(read_text_field(field).await?),
            "session_id" => session_id = Some(read_text_field(field).await?),
            other => tracing::debug!(field = %other, "ignoring unknown form field"),
        }
    }

    // app_id is validated before the uploaded file is touched.
    let app_id = match app_id {
        Some(v) if !v.trim().is_empty() => v,
        _ => {
            return Err(ApiError::BadRequest(
                "app_id is required in the form data".to_string(),
            ));
        }
    };
    if app_id.trim().parse::<i64>().is_err() {
        return Err(ApiError::BadRequest("app_id must be an integer".to_string()));
    }

    let (filename, bytes) =
        file.ok_or_else(|| ApiError::BadRequest("file field is required".to_string()))?;
    let product =
        product.ok_or_else(|| ApiError::BadRequest("product field is required".to_string()))?;
    let version =
        version.ok_or_else(|| ApiError::BadRequest("version field is required".to_string()))?;

    tracing::info!(
        file = %filename,
        product = %product,
        version = %version,
        app_id = %app_id,
        "received upload"
    );

    // Persist the upload next to the run's output artifacts.
    let safe_name = Path::new(&filename)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "upload.csv".to_string());
    let input_path = state.dirs.output.join(&safe_name);
    tokio::fs::write(&input_path, &bytes)
        .await
        .map_err(|e| ApiError::InternalError(format!("failed to persist upload: {}", e)))?;

    let params = RunParams {
        product,
        version,
        app_id,
        session_id,
    };

    let report = run_batch(&state.client, &input_path, &params, &state.dirs)
        .await
        .map_err(ApiError::from)?;

    let out_name = report
        .output_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "processed".to_string());
    let contents = tokio::fs::read(&report.output_path)
        .await
        .map_err(|e| ApiError::InternalError(format!("failed to read output file: {}", e)))?;

    tracing::info!(
        output = %report.output_path.display(),
        answered = report.answered,
        failed = report.failed,
        "batch complete"
    );

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", out_name),
        )
        .body(Body::from(contents))
        .map_err(|e| ApiError::InternalError(e.to_string()))
}

async fn read_text_field(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid form field: {}", e)))
}

/// Get server metrics
async fn get_metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
    Json(MetricsResponse {
        total_requests: state.metrics.total_requests.load(Ordering::Relaxed),
        requests_in_flight: state.metrics.requests_in_flight.load(Ordering::Relaxed),
        uptime_seconds: state.metrics.start_time.elapsed().as_secs(),
    })
}

#[derive(Serialize)]
struct MetricsResponse {
    total_requests: u64,
    requests_in_flight: u64,
    uptime_seconds: u64,
}

/// API error types
enum ApiError {
    BadRequest(String),
    InternalError(String),
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Validation(_) | PipelineError::UnsupportedFormat(_) => {
                ApiError::BadRequest(err.to_string())
            }
            other => ApiError::InternalError(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down gracefully...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}
