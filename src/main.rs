mod config;
mod enrich;
mod http;
mod jobs;
mod llm;
mod metrics;
mod models;
mod pipeline;
mod policy;
mod supabase;
#[cfg(test)]
mod testing;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use config::EnrichConfig;
use enrich::dimensions::{DimensionMatch, extract_dimensions};
use enrich::sanitize::sanitize_description;
use eyre::WrapErr;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use models::{ApiError, EnrichRequest, EnrichResponse};
use pipeline::{Pipeline, PipelineError, PipelineErrorKind};
use policy::DeadlinePolicy;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(target = "enrich.api", "server crashed: {err:?}");
    }
}

async fn run() -> eyre::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = EnrichConfig::from_env();
    if config.store.is_none() || config.text.is_none() {
        warn!(
            target = "enrich.api",
            store = config.store.is_some(),
            text = config.text.is_some(),
            "required credentials missing; enrichment requests will fail with a configuration error"
        );
    }

    let pipeline = Pipeline::from_config(&config);
    let policy = DeadlinePolicy::from_config(&config);
    let (queue, _worker) = jobs::JobQueue::spawn(
        pipeline.clone(),
        policy,
        config.queue_capacity,
        config.job_history,
    );
    let openapi: serde_json::Value = serde_yaml::from_str(include_str!("../docs/openapi.yaml"))
        .unwrap_or(json!({"openapi": "3.0.3"}));
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .wrap_err("failed to install prometheus recorder")?;

    let state = AppState {
        pipeline,
        policy,
        queue,
        openapi: Arc::new(openapi),
        prometheus_handle,
        metrics_key: non_empty_env("METRICS_KEY"),
        docs_key: non_empty_env("OPENAPI_KEY"),
    };

    let app = router(state).layer(axum::extract::DefaultBodyLimit::max(body_limit_from_env()));

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(8000);
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    info!(target = "enrich.api", "listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app.into_make_service())
        .await
        .wrap_err("server error")?;
    Ok(())
}

#[derive(Clone)]
struct AppState {
    pipeline: Pipeline,
    policy: DeadlinePolicy,
    queue: jobs::JobQueue,
    openapi: Arc<serde_json::Value>,
    prometheus_handle: PrometheusHandle,
    metrics_key: Option<String>,
    docs_key: Option<String>,
}

fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .allow_origin(Any);

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/openapi.json", get(openapi_json))
        .route("/enrich", post(enrich_product))
        .nest(
            "/jobs",
            Router::new()
                .route("/enrich", post(enqueue_enrich_job))
                .route("/{id}", get(get_job_status)),
        )
        .nest(
            "/stages",
            Router::new()
                .route("/sanitize", post(stage_sanitize))
                .route("/dimensions", post(stage_dimensions)),
        )
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Health and readiness check.
///
/// - Method: `GET`
/// - Path: `/health`
///
/// Returns a small JSON payload with `status` and `service`.
async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "catalog-enrich-rs",
    }))
}

async fn openapi_json(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    if let Some(key) = &state.docs_key {
        if presented(&headers, "X-Docs-Key") != key.as_str() {
            return Err(AppError::Pipeline(PipelineError::invalid_input(
                "docs",
                "unauthorized",
            )));
        }
    }
    Ok(Json((*state.openapi).clone()))
}

async fn metrics_endpoint(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(secret) = &state.metrics_key {
        if presented(&headers, "X-Metrics-Key") != secret.as_str() {
            return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
        }
    }
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.prometheus_handle.render(),
    )
        .into_response()
}

fn presented<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn body_limit_from_env() -> usize {
    std::env::var("REQUEST_MAX_BYTES")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(256 * 1024)
}

/// Enrich one catalog record.
///
/// - Method: `POST`
/// - Path: `/enrich`
/// - Body: `EnrichRequest`
/// - Response: `EnrichResponse` (derived attributes + per-stage transcript)
async fn enrich_product(
    State(state): State<AppState>,
    Json(payload): Json<EnrichRequest>,
) -> Result<Json<EnrichResponse>, AppError> {
    crate::metrics::inc_requests("/enrich");
    info!(
        target = "enrich.api",
        product_id = %payload.product_id,
        dry_run = payload.dry_run,
        "enrichment invoked",
    );
    let response = state
        .policy
        .run(|| state.pipeline.run(payload.clone()))
        .await?;
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct EnqueueResponse {
    job_id: String,
}

async fn enqueue_enrich_job(
    State(state): State<AppState>,
    Json(payload): Json<EnrichRequest>,
) -> Result<Json<EnqueueResponse>, AppError> {
    crate::metrics::inc_requests("/jobs/enrich");
    let id = state.queue.enqueue(payload).await?;
    Ok(Json(EnqueueResponse {
        job_id: id.to_string(),
    }))
}

async fn get_job_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<jobs::JobInfo>, AppError> {
    let Ok(uuid) = uuid::Uuid::parse_str(&id) else {
        return Err(AppError::Pipeline(PipelineError::invalid_input(
            "jobs",
            "invalid_job_id",
        )));
    };
    match state.queue.get(uuid).await {
        Some(info) => Ok(Json(info)),
        None => Err(AppError::Pipeline(PipelineError::not_found(
            "jobs",
            "unknown job id",
        ))),
    }
}

// -------- Stage endpoints (deterministic text transforms) --------

#[derive(Debug, Deserialize)]
struct SanitizeRequest {
    text: String,
}

#[derive(Debug, Serialize)]
struct SanitizeResponse {
    sanitized: String,
}

async fn stage_sanitize(Json(req): Json<SanitizeRequest>) -> Json<SanitizeResponse> {
    crate::metrics::inc_requests("/stages/sanitize");
    Json(SanitizeResponse {
        sanitized: sanitize_description(&req.text),
    })
}

#[derive(Debug, Deserialize)]
struct DimensionsRequest {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Serialize)]
struct DimensionsResponse {
    dimensions: Option<String>,
    source: Option<&'static str>,
}

async fn stage_dimensions(Json(req): Json<DimensionsRequest>) -> Json<DimensionsResponse> {
    crate::metrics::inc_requests("/stages/dimensions");
    let description = sanitize_description(&req.description);
    let found = extract_dimensions(&req.title, &description);
    Json(DimensionsResponse {
        source: found.as_ref().map(|m: &DimensionMatch| m.source.as_str()),
        dimensions: found.map(|m| m.text),
    })
}

#[derive(Debug)]
enum AppError {
    Pipeline(PipelineError),
}

impl From<PipelineError> for AppError {
    fn from(value: PipelineError) -> Self {
        Self::Pipeline(value)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Pipeline(err) => {
                let status = match err.kind() {
                    PipelineErrorKind::Configuration => StatusCode::INTERNAL_SERVER_ERROR,
                    PipelineErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
                    PipelineErrorKind::NotFound => StatusCode::NOT_FOUND,
                    PipelineErrorKind::Persistence => StatusCode::BAD_GATEWAY,
                    PipelineErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
                    PipelineErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
                };
                if status.is_server_error() {
                    error!(target = "enrich.api", phase = err.phase(), kind = err.kind().as_str(), "{err}");
                } else {
                    warn!(target = "enrich.api", phase = err.phase(), kind = err.kind().as_str(), "{err}");
                }
                let payload = ApiError {
                    success: false,
                    error: err.kind().as_str().to_string(),
                    phase: err.phase().to_string(),
                    detail: Some(err.detail().to_string()),
                };
                (status, Json(payload)).into_response()
            }
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let _ = fmt().with_env_filter(filter).try_init();
}
