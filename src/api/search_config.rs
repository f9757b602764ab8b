//! Search configuration endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use crate::store::{ConfigInput, SearchConfiguration};

use super::routes::{internal_error, AppState};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_configs).post(create_config))
        .route("/active", get(get_active))
        .route(
            "/:id",
            get(get_config).put(update_config).delete(delete_config),
        )
        .route("/:id/activate", post(activate_config))
}

fn validate(input: &ConfigInput) -> Result<(), (StatusCode, String)> {
    if input.name.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Name cannot be empty".to_string()));
    }
    if !(0.0..=2.0).contains(&input.temperature) {
        return Err((
            StatusCode::BAD_REQUEST,
            "Temperature must be between 0.0 and 2.0".to_string(),
        ));
    }
    if input.timeout_secs == 0 {
        return Err((
            StatusCode::BAD_REQUEST,
            "Timeout must be positive".to_string(),
        ));
    }
    Ok(())
}

async fn list_configs(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<SearchConfiguration>>, (StatusCode, String)> {
    Ok(Json(state.db.list_configs().map_err(internal_error)?))
}

async fn get_active(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SearchConfiguration>, (StatusCode, String)> {
    Ok(Json(state.db.active_config().map_err(internal_error)?))
}

async fn get_config(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<SearchConfiguration>, (StatusCode, String)> {
    state
        .db
        .get_config(id)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Configuration {id} not found")))
}

async fn create_config(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ConfigInput>,
) -> Result<Json<SearchConfiguration>, (StatusCode, String)> {
    validate(&req)?;
    let id = state.db.insert_config(&req).map_err(internal_error)?;
    tracing::info!(config_id = id, name = %req.name, "created search configuration");
    state
        .db
        .get_config(id)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| internal_error(anyhow::anyhow!("configuration vanished after insert")))
}

async fn update_config(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<ConfigInput>,
) -> Result<Json<SearchConfiguration>, (StatusCode, String)> {
    validate(&req)?;
    if !state.db.update_config(id, &req).map_err(internal_error)? {
        return Err((StatusCode::NOT_FOUND, format!("Configuration {id} not found")));
    }
    state
        .db
        .get_config(id)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Configuration {id} not found")))
}

async fn delete_config(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<(StatusCode, String), (StatusCode, String)> {
    if state.db.delete_config(id).map_err(internal_error)? {
        Ok((StatusCode::OK, format!("Configuration {id} deleted")))
    } else {
        Err((StatusCode::NOT_FOUND, format!("Configuration {id} not found")))
    }
}

/// POST /api/search-config/:id/activate - make this the single active
/// configuration.
async fn activate_config(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<SearchConfiguration>, (StatusCode, String)> {
    if !state.db.activate_config(id).map_err(internal_error)? {
        return Err((StatusCode::NOT_FOUND, format!("Configuration {id} not found")));
    }
    tracing::info!(config_id = id, "activated search configuration");
    state
        .db
        .get_config(id)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Configuration {id} not found")))
}
