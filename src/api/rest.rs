use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::domain::data_source::DataSource;
use crate::domain::error::DataSourceError;
use crate::domain::update_manager::{SourceStatus, UpdateManager};

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<UpdateManager>,
    pub started_at: Instant,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/datasources", get(list_sources).post(save_source))
        .route("/api/v1/datasources/status", get(status))
        .route("/api/v1/datasources/reload", post(reload_all))
        .route(
            "/api/v1/datasources/:id",
            get(get_source).put(put_source).delete(delete_source),
        )
        .route("/api/v1/datasources/:id/reload", post(reload_source))
        .route("/api/v1/nodes/:id/fetch", post(fetch_node))
        .route("/api/v1/nodes/:id/fetch/:source", post(fetch_node_for))
        .with_state(state)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DaemonHealth {
    pub version: String,
    pub uptime_secs: u64,
    pub sources: usize,
}

type ApiError = (StatusCode, String);

fn api_error(e: DataSourceError) -> ApiError {
    let status = match &e {
        DataSourceError::Config(_) => StatusCode::BAD_REQUEST,
        DataSourceError::NotFound(_) => StatusCode::NOT_FOUND,
        DataSourceError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

async fn health(State(state): State<AppState>) -> Json<DaemonHealth> {
    Json(DaemonHealth {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        sources: state.manager.status().len(),
    })
}

async fn list_sources(State(state): State<AppState>) -> Result<Json<Vec<DataSource>>, ApiError> {
    state.manager.get_all().await.map(Json).map_err(api_error)
}

async fn status(State(state): State<AppState>) -> Json<Vec<SourceStatus>> {
    Json(state.manager.status())
}

async fn get_source(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DataSource>, ApiError> {
    match state.manager.get(&id).await.map_err(api_error)? {
        Some(source) => Ok(Json(source)),
        None => Err(api_error(DataSourceError::NotFound(id))),
    }
}

async fn save_source(
    State(state): State<AppState>,
    Json(source): Json<DataSource>,
) -> Result<StatusCode, ApiError> {
    state.manager.save(source).await.map_err(api_error)?;
    Ok(StatusCode::CREATED)
}

async fn put_source(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(source): Json<DataSource>,
) -> Result<StatusCode, ApiError> {
    if source.id != id {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("body id '{}' does not match path id '{}'", source.id, id),
        ));
    }
    state.manager.save(source).await.map_err(api_error)?;
    Ok(StatusCode::OK)
}

async fn delete_source(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.manager.delete(&id).await.map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn reload_all(State(state): State<AppState>) -> StatusCode {
    state.manager.on_user_ask_update_all_nodes();
    StatusCode::ACCEPTED
}

async fn reload_source(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .manager
        .on_user_ask_update_all_nodes_for(&id)
        .map_err(api_error)?;
    Ok(StatusCode::ACCEPTED)
}

async fn fetch_node(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    state.manager.on_user_ask_update_node(&id);
    StatusCode::ACCEPTED
}

async fn fetch_node_for(
    State(state): State<AppState>,
    Path((id, source)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    state
        .manager
        .on_user_ask_update_node_for(&id, &source)
        .map_err(api_error)?;
    Ok(StatusCode::ACCEPTED)
}
