use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::error::PipelineError;
use crate::pipeline::{Outcome, Pipeline, SummaryResult};

#[derive(Debug, Deserialize)]
struct SummarizeRequest {
    url: Option<String>,
}

/// Body of every summarize response.
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<SummaryResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_cache: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Envelope {
    pub fn from_result(result: &Result<Outcome, PipelineError>) -> (u16, Self) {
        match result {
            Ok(outcome) => (
                200,
                Self {
                    success: true,
                    data: Some(outcome.result.clone()),
                    from_cache: Some(outcome.from_cache),
                    error: None,
                },
            ),
            Err(e) => (
                e.status_code(),
                Self {
                    success: false,
                    data: None,
                    from_cache: None,
                    error: Some(e.to_string()),
                },
            ),
        }
    }
}

pub fn router(pipeline: Arc<Pipeline>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", post(summarize))
        .route("/summarize", post(summarize))
        .route("/health", get(health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(pipeline)
}

pub async fn serve(pipeline: Arc<Pipeline>, addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Summarizer listening on {}", listener.local_addr()?);
    axum::serve(listener, router(pipeline)).await?;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn summarize(State(pipeline): State<Arc<Pipeline>>, body: Bytes) -> Response {
    let result = match serde_json::from_slice::<SummarizeRequest>(&body) {
        Ok(req) => run_isolated(pipeline, req.url).await,
        Err(_) => Err(PipelineError::InvalidInput("Request body must be a JSON object".into())),
    };
    if let Err(e) = &result {
        warn!(kind = e.kind(), "Summarize request failed: {}", e);
    }
    let (status, envelope) = Envelope::from_result(&result);
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(envelope)).into_response()
}

/// Run on its own task so a panic inside the pipeline becomes an `Internal` error.
async fn run_isolated(pipeline: Arc<Pipeline>, url: Option<String>) -> Result<Outcome, PipelineError> {
    tokio::spawn(async move { pipeline.run(url.as_deref()).await })
        .await
        .unwrap_or_else(|e| Err(join_failure(e)))
}

/// The join error names the panic payload; keep it in the log only.
fn join_failure(e: tokio::task::JoinError) -> PipelineError {
    error!("Pipeline task failed: {}", e);
    PipelineError::Internal("unexpected failure".into())
}

// ── Tests ──
