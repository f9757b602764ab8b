//! Discovery endpoints: start, poll, stream, and the run/call ledger.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::discovery::{registry, DiscoveryPhase, ProgressSnapshot, StartError, TargetScope};
use crate::llm::ProviderSelector;
use crate::store::{ApiCallRecord, DiscoveryRun};

use super::routes::{internal_error, AppState};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/start", post(start_discovery))
        .route("/status", get(poll_status))
        .route("/stream", get(stream_progress))
        .route("/runs", get(list_runs))
        .route("/runs/:uuid", get(get_run))
        .route("/runs/:uuid/calls", get(list_calls))
}

// ─────────────────────────────────────────────────────────────────────────────
// Request/Response Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct StartDiscoveryRequest {
    /// "sources" (default), "manufacturers" or "all".
    #[serde(default)]
    pub scope: Option<String>,
    /// Restrict to these source ids; empty/absent means every automatic
    /// source.
    #[serde(default)]
    pub source_ids: Option<Vec<i64>>,
    /// Restrict to these manufacturer ids.
    #[serde(default)]
    pub manufacturer_ids: Option<Vec<i64>>,
    /// Provider selector; unknown values fall back to "auto".
    #[serde(default)]
    pub provider: Option<String>,
}

impl StartDiscoveryRequest {
    fn target_scope(&self) -> TargetScope {
        match self.scope.as_deref().unwrap_or("sources") {
            "manufacturers" => match &self.manufacturer_ids {
                Some(ids) if !ids.is_empty() => TargetScope::Manufacturers(ids.clone()),
                _ => TargetScope::AllManufacturers,
            },
            "all" => TargetScope::Everything,
            _ => match &self.source_ids {
                Some(ids) if !ids.is_empty() => TargetScope::Sources(ids.clone()),
                _ => TargetScope::AllSources,
            },
        }
    }

    fn selector(&self) -> ProviderSelector {
        ProviderSelector::parse(self.provider.as_deref().unwrap_or("auto"))
    }
}

/// Run view with the derived metrics attached.
#[derive(Debug, Serialize)]
pub struct RunResponse {
    #[serde(flatten)]
    pub run: DiscoveryRun,
    pub state: &'static str,
    pub efficiency: f64,
    pub duration_seconds: Option<i64>,
}

impl From<DiscoveryRun> for RunResponse {
    fn from(run: DiscoveryRun) -> Self {
        let state = run.state();
        let efficiency = run.efficiency();
        let duration_seconds = run.duration_seconds();
        Self {
            run,
            state,
            efficiency,
            duration_seconds,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListRunsQuery {
    #[serde(default)]
    limit: Option<usize>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// GET /api/providers - each provider's id, name, cost description and
/// availability.
pub async fn list_providers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<registry::ProviderInfo>>, (StatusCode, String)> {
    let snapshot = state
        .db
        .active_config()
        .map_err(internal_error)?
        .snapshot();
    Ok(Json(registry::list_providers(
        state.engine.credentials(),
        &snapshot,
    )))
}

/// POST /api/discovery/start - kick off a background discovery and return
/// the initial status descriptor.
async fn start_discovery(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartDiscoveryRequest>,
) -> Result<Json<ProgressSnapshot>, (StatusCode, String)> {
    match state.engine.start(req.target_scope(), req.selector()).await {
        Ok(snapshot) => Ok(Json(snapshot)),
        Err(StartError::AlreadyRunning) => Err((
            StatusCode::CONFLICT,
            "A discovery is already running".to_string(),
        )),
        Err(StartError::Store(e)) => Err(internal_error(e)),
    }
}

/// GET /api/discovery/status - the same descriptor shape at any time.
async fn poll_status(State(state): State<Arc<AppState>>) -> Json<ProgressSnapshot> {
    Json(state.engine.hub().snapshot().await)
}

/// GET /api/discovery/stream - progress ticks over SSE until the run
/// completes.
async fn stream_progress(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>> {
    let hub = state.engine.hub();
    let stream = async_stream::stream! {
        loop {
            let snapshot = hub.snapshot().await;
            let done = snapshot.status != DiscoveryPhase::Running;
            let event = Event::default().event("progress").json_data(&snapshot);
            match event {
                Ok(event) => yield Ok(event),
                Err(e) => {
                    tracing::error!(error = %e, "failed to serialize progress event");
                    break;
                }
            }
            if done {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(500)).await;
        }
    };
    Sse::new(stream)
}

async fn list_runs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListRunsQuery>,
) -> Result<Json<Vec<RunResponse>>, (StatusCode, String)> {
    let limit = query.limit.unwrap_or(20).min(200);
    let runs = state.db.list_runs(limit).map_err(internal_error)?;
    Ok(Json(runs.into_iter().map(RunResponse::from).collect()))
}

async fn get_run(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<Uuid>,
) -> Result<Json<RunResponse>, (StatusCode, String)> {
    state
        .db
        .get_run(uuid)
        .map_err(internal_error)?
        .map(|run| Json(RunResponse::from(run)))
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Run {uuid} not found")))
}

async fn list_calls(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<Uuid>,
) -> Result<Json<Vec<ApiCallRecord>>, (StatusCode, String)> {
    let run = state
        .db
        .get_run(uuid)
        .map_err(internal_error)?
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Run {uuid} not found")))?;
    Ok(Json(state.db.list_calls(run.id).map_err(internal_error)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_resolution_from_request_fields() {
        let req = StartDiscoveryRequest {
            scope: None,
            source_ids: None,
            manufacturer_ids: None,
            provider: None,
        };
        assert!(matches!(req.target_scope(), TargetScope::AllSources));

        let req = StartDiscoveryRequest {
            scope: Some("sources".to_string()),
            source_ids: Some(vec![1, 2]),
            manufacturer_ids: None,
            provider: Some("grok".to_string()),
        };
        assert!(matches!(req.target_scope(), TargetScope::Sources(ref ids) if ids == &vec![1, 2]));
        assert_eq!(
            req.selector(),
            ProviderSelector::Explicit(crate::llm::ProviderId::Grok)
        );

        let req = StartDiscoveryRequest {
            scope: Some("manufacturers".to_string()),
            source_ids: None,
            manufacturer_ids: Some(vec![]),
            provider: Some("not-a-provider".to_string()),
        };
        assert!(matches!(req.target_scope(), TargetScope::AllManufacturers));
        // Invalid provider ids silently coerce to auto.
        assert_eq!(req.selector(), ProviderSelector::Auto);

        let req = StartDiscoveryRequest {
            scope: Some("all".to_string()),
            source_ids: None,
            manufacturer_ids: None,
            provider: None,
        };
        assert!(matches!(req.target_scope(), TargetScope::Everything));
    }
}
