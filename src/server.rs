//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Service status and domain ids |
//! | `GET`  | `/domains` | Registered domains with display names |
//! | `GET`  | `/health` | Per-domain index readiness |
//! | `POST` | `/retrieve` | Ranked passages for a query |
//! | `POST` | `/query` | Grounded answer with sources and retrieved passages |
//! | `POST` | `/feedback` | Record a thumbs up/down rating |
//! | `POST` | `/admin/reload` | Reload every domain index from disk |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "Query cannot be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `unavailable` (503),
//! `internal` (500). Malformed request bodies (bad JSON, missing `query`,
//! a negative `k`) are `bad_request` too.
//!
//! Generation failures are not HTTP errors: `/query` answers 200 with
//! `confidence = "error"` and the sources that were found.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::Instrument;
use uuid::Uuid;

use clinical_rag_core::{Confidence, RetrievalError, RetrievedPassage, SourceCitation};

use crate::config::Config;
use crate::service::{DomainInfo, HealthReport, QueryService, ServiceError};

/// Starts the HTTP server on `[server].bind` and serves until the process
/// is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let service = Arc::new(QueryService::from_config(config)?);
    let health = service.health();
    if health.status == "unavailable" {
        tracing::warn!("no domain indexes loaded; queries will return 503 until indexes are built");
    }

    let app = router(service);
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "clinical RAG server listening");
    println!("Clinical RAG server listening on http://{}", config.server.bind);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Build the application router around a shared [`QueryService`].
pub fn router(service: Arc<QueryService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_root))
        .route("/domains", get(handle_domains))
        .route("/health", get(handle_health))
        .route("/retrieve", post(handle_retrieve))
        .route("/query", post(handle_query))
        .route("/feedback", post(handle_feedback))
        .route("/admin/reload", post(handle_reload))
        .fallback(handle_not_found)
        .layer(cors)
        .with_state(service)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn unavailable(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::SERVICE_UNAVAILABLE,
        code: "unavailable",
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        match err {
            ServiceError::NotReady => unavailable(message),
            ServiceError::Retrieval(RetrievalError::InvalidInput(_))
            | ServiceError::Retrieval(RetrievalError::UnknownDomain { .. }) => {
                bad_request(message)
            }
            ServiceError::Retrieval(RetrievalError::UnavailableDomain(_)) => unavailable(message),
            ServiceError::Retrieval(RetrievalError::Embedding(_)) => internal(message),
        }
    }
}

// ============ Handlers ============

#[derive(Serialize)]
struct RootResponse {
    status: &'static str,
    message: &'static str,
    domains: Vec<String>,
}

async fn handle_root(State(service): State<Arc<QueryService>>) -> Json<RootResponse> {
    Json(RootResponse {
        status: "online",
        message: "Clinical RAG API is running",
        domains: service.registry().ids(),
    })
}

#[derive(Serialize)]
struct DomainsResponse {
    domains: Vec<DomainInfo>,
}

async fn handle_domains(State(service): State<Arc<QueryService>>) -> Json<DomainsResponse> {
    Json(DomainsResponse {
        domains: service.domains(),
    })
}

async fn handle_health(State(service): State<Arc<QueryService>>) -> Json<HealthReport> {
    Json(service.health())
}

#[derive(Deserialize)]
struct RetrieveRequest {
    query: String,
    #[serde(default)]
    domain: Option<String>,
    #[serde(default)]
    k: Option<usize>,
}

#[derive(Serialize)]
struct RetrieveResponse {
    passages: Vec<RetrievedPassage>,
}

async fn handle_retrieve(
    State(service): State<Arc<QueryService>>,
    payload: Result<Json<RetrieveRequest>, JsonRejection>,
) -> Result<Json<RetrieveResponse>, AppError> {
    let Json(req) = payload?;
    let span = tracing::info_span!("retrieve", request_id = %Uuid::new_v4());
    async move {
        let passages = service
            .retrieve(&req.query, req.domain.as_deref(), req.k)
            .await?;
        Ok::<_, AppError>(Json(RetrieveResponse { passages }))
    }
    .instrument(span)
    .await
}

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
    #[serde(default)]
    domain: Option<String>,
}

#[derive(Serialize)]
struct QueryResponse {
    response: String,
    sources: Vec<SourceCitation>,
    confidence: Confidence,
    retrieved_docs: Vec<RetrievedPassage>,
}

async fn handle_query(
    State(service): State<Arc<QueryService>>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, AppError> {
    let Json(req) = payload?;
    let span = tracing::info_span!("query", request_id = %Uuid::new_v4());
    async move {
        let outcome = service.ask(&req.query, req.domain.as_deref()).await?;
        let result = outcome.answer.into_result();
        Ok::<_, AppError>(Json(QueryResponse {
            response: result.response,
            sources: result.sources,
            confidence: result.confidence,
            retrieved_docs: outcome.retrieved,
        }))
    }
    .instrument(span)
    .await
}

#[derive(Deserialize)]
struct FeedbackRequest {
    query: String,
    #[serde(default)]
    response: String,
    rating: String,
}

#[derive(Serialize)]
struct FeedbackResponse {
    status: &'static str,
    message: &'static str,
}

async fn handle_feedback(
    payload: Result<Json<FeedbackRequest>, JsonRejection>,
) -> Result<Json<FeedbackResponse>, AppError> {
    let Json(req) = payload?;
    if req.rating != "up" && req.rating != "down" {
        return Err(bad_request("rating must be 'up' or 'down'"));
    }
    let preview: String = req.query.chars().take(100).collect();
    tracing::info!(
        rating = %req.rating,
        query = %preview,
        response_chars = req.response.len(),
        "feedback received"
    );
    Ok(Json(FeedbackResponse {
        status: "success",
        message: "Feedback recorded",
    }))
}

async fn handle_not_found(uri: axum::http::Uri) -> AppError {
    not_found(format!("no route for {}", uri.path()))
}

async fn handle_reload(State(service): State<Arc<QueryService>>) -> Json<HealthReport> {
    Json(service.reload().await)
}
