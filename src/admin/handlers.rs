use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;

use crate::endpoints::RouteSummary;
use crate::engine::EngineStatus;
use crate::http::request::X_REQUEST_ID;
use crate::http::response::{ApiError, ErrorKind};
use crate::http::server::AppState;
use crate::snapshot::SnapshotRecord;

#[derive(Serialize)]
pub struct SnapshotList {
    pub count: usize,
    pub keys: Vec<String>,
}

#[derive(Serialize)]
pub struct ReloadResult {
    pub routes: usize,
}

fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

pub async fn health(State(state): State<AppState>) -> Json<EngineStatus> {
    Json(state.engine.status())
}

pub async fn list_routes(State(state): State<AppState>) -> Json<Vec<RouteSummary>> {
    Json(state.engine.routes().summaries())
}

pub async fn list_snapshots(State(state): State<AppState>) -> Json<SnapshotList> {
    let keys = state.engine.snapshots().keys();
    Json(SnapshotList {
        count: keys.len(),
        keys,
    })
}

pub async fn get_snapshot(
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Result<Json<SnapshotRecord>, ApiError> {
    let record = state
        .engine
        .snapshots()
        .get(&key)
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()).with_request_id(request_id(&headers)))?;

    if record.is_new() {
        return Err(ApiError::new(
            StatusCode::NOT_FOUND,
            ErrorKind::NotFound,
            format!("snapshot '{key}' holds no state"),
        )
        .with_request_id(request_id(&headers)));
    }
    Ok(Json(record))
}

pub async fn reload(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ReloadResult>, ApiError> {
    let engine = state.engine.clone();
    let path = state.config.endpoints.path.clone();

    let result = tokio::task::spawn_blocking(move || engine.reload_from(&path))
        .await
        .map_err(|e| ApiError::internal(format!("reload task failed: {e}")))?;

    match result {
        Ok(routes) => Ok(Json(ReloadResult { routes })),
        Err(e) => Err(ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::LoadError,
            e.to_string(),
        )
        .with_request_id(request_id(&headers))),
    }
}
