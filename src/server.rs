//! HTTP surface of the query service.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::embedder::Embedder;
use crate::search::{SearchError, SearchRequest, SearchResponse, SearchService};
use crate::vector_store::{CollectionName, CollectionStats, StoreError, VectorStore};

/// Shared per-process state: one embedder and one store handle.
#[derive(Clone)]
pub struct AppState {
    search: SearchService,
    store: Option<Arc<dyn VectorStore>>,
}

impl AppState {
    /// Wires the query service. `store` is `None` when the startup connection failed.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Option<Arc<dyn VectorStore>>,
        collection: CollectionName,
        max_top_k: usize,
    ) -> Self {
        let search = SearchService::new(embedder, store.clone(), collection, max_top_k);
        Self { search, store }
    }

    fn store(&self) -> Result<&Arc<dyn VectorStore>, ApiError> {
        self.store.as_ref().ok_or_else(|| {
            ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "vector store is not connected",
            )
        })
    }
}

/// Error response rendered as `{"detail": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl ApiError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    /// Status code sent to the client.
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, detail = %self.detail, "request failed");
        }
        (self.status, Json(ErrorBody { detail: self.detail })).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(rejection.status(), rejection.body_text())
    }
}

impl From<SearchError> for ApiError {
    fn from(err: SearchError) -> Self {
        let status = match &err {
            SearchError::EmptyQuery => StatusCode::BAD_REQUEST,
            SearchError::Embedding(_) => StatusCode::BAD_GATEWAY,
            SearchError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            SearchError::Failed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

/// Builds the router for `/health`, `/search` and the admin passthroughs.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    Router::new()
        .route("/health", get(health))
        .route("/search", post(search))
        .route("/collections", get(list_collections))
        .route("/collection/{name}/stats", get(collection_stats))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({"status": "healthy"}))
}

async fn search(
    State(state): State<AppState>,
    request: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let Json(request) = request?;
    let response = state.search.search(request).await?;
    Ok(Json(response))
}

async fn list_collections(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let collections = state.store()?.list_collections().await.map_err(|err| {
        let status = match err {
            StoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError::new(status, err.to_string())
    })?;
    Ok(Json(json!({"collections": collections})))
}

async fn collection_stats(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<CollectionStats>, ApiError> {
    let store = state.store()?;
    let name = CollectionName::new(name)
        .map_err(|err| ApiError::new(StatusCode::NOT_FOUND, err.to_string()))?;
    let stats = store.collection_stats(&name).await.map_err(|err| {
        let status = match err {
            StoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            StoreError::Malformed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            StoreError::CollectionNotFound(_) | StoreError::Api { .. } => StatusCode::NOT_FOUND,
        };
        ApiError::new(status, err.to_string())
    })?;
    Ok(Json(stats))
}
