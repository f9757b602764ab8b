//! Router assembly and shared application state.

use std::sync::Arc;

use axum::{
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::discovery::DiscoveryEngine;
use crate::store::Database;

use super::auth;
use super::discovery as discovery_api;
use super::news;
use super::search_config;
use super::sources;
use super::types::HealthResponse;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub engine: DiscoveryEngine,
}

/// Map a store-layer error onto a 500 without leaking internals into logs
/// twice.
pub(super) fn internal_error(err: anyhow::Error) -> (StatusCode, String) {
    tracing::error!(error = %err, "request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

/// Start the HTTP server.
pub async fn serve(config: Config, db: Database) -> anyhow::Result<()> {
    let engine = DiscoveryEngine::new(db.clone(), config.credentials.clone());

    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        engine,
    });

    let public_routes = Router::new()
        .route("/api/health", get(health))
        .route("/api/auth/login", post(auth::login))
        .route("/api/news", get(news::list_public))
        .route("/api/news/:id", get(news::get_public));

    let protected_routes = Router::new()
        .nest("/api/admin/news", news::admin_routes())
        .nest("/api/sources", sources::source_routes())
        .nest("/api/manufacturers", sources::manufacturer_routes())
        .nest("/api/search-config", search_config::routes())
        .route("/api/providers", get(discovery_api::list_providers))
        .nest("/api/discovery", discovery_api::routes())
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::require_auth,
        ));

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::clone(&state));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Wait for SIGINT/SIGTERM. An in-flight discovery keeps its ledger rows;
/// only the unfinalized run row marks the interruption.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

/// Health check endpoint.
async fn health(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        dev_mode: state.config.dev_mode,
        auth_required: state.config.auth.auth_required(state.config.dev_mode),
    })
}
