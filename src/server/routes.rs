// REST API routes for the presentation layer
// Searches run in the background; clients follow progress through
// GET /api/session or the /api/events stream.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::AppState;
use crate::ai::system_prompt::SUGGESTED_TOPICS;
use crate::ai::{CatalogMode, KeySource};
use crate::catalog::CatalogEntry;
use crate::error::{CredentialError, SubmitError};
use crate::search::{SearchSession, SearchState};

// ---- Request/Response types ----

#[derive(Deserialize)]
pub struct SearchRequest {
    pub query: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectKeyRequest {
    pub api_key: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub name: String,
    pub version: String,
    pub mode: CatalogMode,
    pub catalog_size: usize,
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_source: Option<KeySource>,
    pub host_key_selection: bool,
    pub state: SearchState,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyStatusResponse {
    pub has_selected_api_key: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<KeySource>,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Error returned by handlers: a status code plus a short message
pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(ErrorResponse { error: self.1 })).into_response()
    }
}

impl From<SubmitError> for ApiError {
    fn from(e: SubmitError) -> Self {
        let status = match e {
            SubmitError::EmptyQuery => StatusCode::BAD_REQUEST,
            SubmitError::Busy | SubmitError::NothingToRetry => StatusCode::CONFLICT,
        };
        ApiError(status, e.to_string())
    }
}

impl From<CredentialError> for ApiError {
    fn from(e: CredentialError) -> Self {
        let status = match e {
            CredentialError::EmptyKey => StatusCode::BAD_REQUEST,
            CredentialError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError(status, e.to_string())
    }
}

// ---- Route registration ----

pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/catalog", get(get_catalog))
        .route("/api/suggestions", get(get_suggestions))
        .route("/api/session", get(get_session))
        .route("/api/search", post(submit_search))
        .route("/api/retry", post(retry_search))
        .route("/api/key", get(get_key_status).post(select_key).delete(forget_key))
}

// ---- Handlers ----

async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        name: "Research Librarian".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        mode: state.mode,
        catalog_size: state.catalog.len(),
        authenticated: state.credentials.has_selected_api_key(),
        key_source: state.credentials.active_source(),
        host_key_selection: state.credentials.host_selection_available(),
        state: state.machine.snapshot().state,
    })
}

async fn get_catalog(State(state): State<Arc<AppState>>) -> Json<Vec<CatalogEntry>> {
    Json(state.catalog.entries().to_vec())
}

async fn get_suggestions() -> Json<Vec<&'static str>> {
    Json(SUGGESTED_TOPICS.to_vec())
}

async fn get_session(State(state): State<Arc<AppState>>) -> Json<SearchSession> {
    Json(state.machine.snapshot())
}

async fn submit_search(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SearchRequest>,
) -> Result<(StatusCode, Json<SearchSession>), ApiError> {
    let query = state.machine.begin(&body.query)?;
    spawn_search(&state, query);
    Ok((StatusCode::ACCEPTED, Json(state.machine.snapshot())))
}

async fn retry_search(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<SearchSession>), ApiError> {
    let query = state.machine.begin_retry()?;
    spawn_search(&state, query);
    Ok((StatusCode::ACCEPTED, Json(state.machine.snapshot())))
}

fn spawn_search(state: &AppState, query: String) {
    let machine = state.machine.clone();
    tokio::spawn(async move {
        machine.run_search(query).await;
    });
}

async fn get_key_status(State(state): State<Arc<AppState>>) -> Json<KeyStatusResponse> {
    Json(KeyStatusResponse {
        has_selected_api_key: state.credentials.has_selected_api_key(),
        source: state.credentials.active_source(),
    })
}

// Key store writes block (keychain IPC), so they run off the runtime thread

async fn select_key(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SelectKeyRequest>,
) -> Result<StatusCode, ApiError> {
    let credentials = state.credentials.clone();
    tokio::task::spawn_blocking(move || credentials.open_select_key(&body.api_key))
        .await
        .map_err(join_error)??;
    Ok(StatusCode::NO_CONTENT)
}

async fn forget_key(State(state): State<Arc<AppState>>) -> Result<StatusCode, ApiError> {
    let credentials = state.credentials.clone();
    tokio::task::spawn_blocking(move || credentials.forget())
        .await
        .map_err(join_error)??;
    Ok(StatusCode::NO_CONTENT)
}

fn join_error(e: tokio::task::JoinError) -> ApiError {
    tracing::error!("Key store task failed: {}", e);
    ApiError(StatusCode::INTERNAL_SERVER_ERROR, "key store task failed".to_string())
}
