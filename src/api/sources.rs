//! Source and manufacturer management endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};

use crate::store::{Manufacturer, NewManufacturer, NewSource, Source};

use super::routes::{internal_error, AppState};

pub fn source_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_sources).post(create_source))
        .route(
            "/:id",
            get(get_source).put(update_source).delete(delete_source),
        )
}

pub fn manufacturer_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_manufacturers).post(create_manufacturer))
        .route(
            "/:id",
            get(get_manufacturer)
                .put(update_manufacturer)
                .delete(delete_manufacturer),
        )
}

fn validate_source(source: &NewSource) -> Result<(), (StatusCode, String)> {
    if source.name.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Name cannot be empty".to_string()));
    }
    if url::Url::parse(&source.url).is_err() {
        return Err((StatusCode::BAD_REQUEST, "Invalid URL format".to_string()));
    }
    Ok(())
}

async fn list_sources(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Source>>, (StatusCode, String)> {
    Ok(Json(state.db.list_sources().map_err(internal_error)?))
}

async fn get_source(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Source>, (StatusCode, String)> {
    state
        .db
        .get_source(id)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Source {id} not found")))
}

async fn create_source(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewSource>,
) -> Result<Json<Source>, (StatusCode, String)> {
    validate_source(&req)?;
    let id = state.db.insert_source(&req).map_err(internal_error)?;
    tracing::info!(source_id = id, name = %req.name, "created source");
    state
        .db
        .get_source(id)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| internal_error(anyhow::anyhow!("source vanished after insert")))
}

async fn update_source(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<NewSource>,
) -> Result<Json<Source>, (StatusCode, String)> {
    validate_source(&req)?;
    if !state.db.update_source(id, &req).map_err(internal_error)? {
        return Err((StatusCode::NOT_FOUND, format!("Source {id} not found")));
    }
    state
        .db
        .get_source(id)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Source {id} not found")))
}

async fn delete_source(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<(StatusCode, String), (StatusCode, String)> {
    if state.db.delete_source(id).map_err(internal_error)? {
        Ok((StatusCode::OK, format!("Source {id} deleted")))
    } else {
        Err((StatusCode::NOT_FOUND, format!("Source {id} not found")))
    }
}

async fn list_manufacturers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Manufacturer>>, (StatusCode, String)> {
    Ok(Json(state.db.list_manufacturers().map_err(internal_error)?))
}

async fn get_manufacturer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Manufacturer>, (StatusCode, String)> {
    state
        .db
        .get_manufacturer(id)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Manufacturer {id} not found")))
}

async fn create_manufacturer(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewManufacturer>,
) -> Result<Json<Manufacturer>, (StatusCode, String)> {
    if req.name.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Name cannot be empty".to_string()));
    }
    let id = state.db.insert_manufacturer(&req).map_err(internal_error)?;
    tracing::info!(manufacturer_id = id, name = %req.name, "created manufacturer");
    state
        .db
        .get_manufacturer(id)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| internal_error(anyhow::anyhow!("manufacturer vanished after insert")))
}

async fn update_manufacturer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<NewManufacturer>,
) -> Result<Json<Manufacturer>, (StatusCode, String)> {
    if req.name.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Name cannot be empty".to_string()));
    }
    if !state
        .db
        .update_manufacturer(id, &req)
        .map_err(internal_error)?
    {
        return Err((StatusCode::NOT_FOUND, format!("Manufacturer {id} not found")));
    }
    state
        .db
        .get_manufacturer(id)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Manufacturer {id} not found")))
}

async fn delete_manufacturer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<(StatusCode, String), (StatusCode, String)> {
    if state.db.delete_manufacturer(id).map_err(internal_error)? {
        Ok((StatusCode::OK, format!("Manufacturer {id} deleted")))
    } else {
        Err((StatusCode::NOT_FOUND, format!("Manufacturer {id} not found")))
    }
}
