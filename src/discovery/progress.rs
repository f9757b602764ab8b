//! In-memory discovery progress.
//!
//! One discovery runs at a time. The hub is the single place the running
//! task reports progress to and the API polls from; claiming it is atomic,
//! so two starts cannot race past each other. Progress does not survive a
//! restart — the persisted ledger does.

use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Lifecycle of the polled status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryPhase {
    Idle,
    Running,
    Completed,
}

/// The descriptor returned by the start and poll operations.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    pub status: DiscoveryPhase,
    pub processed: usize,
    pub total: usize,
    pub percent: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
}

impl ProgressSnapshot {
    fn idle() -> Self {
        Self {
            status: DiscoveryPhase::Idle,
            processed: 0,
            total: 0,
            percent: 0,
            run_id: None,
        }
    }
}

#[derive(Debug)]
struct ProgressState {
    status: DiscoveryPhase,
    processed: usize,
    total: usize,
    run_id: Option<Uuid>,
}

/// Shared progress tracker.
#[derive(Debug)]
pub struct DiscoveryHub {
    state: RwLock<ProgressState>,
}

impl Default for DiscoveryHub {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscoveryHub {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ProgressState {
                status: DiscoveryPhase::Idle,
                processed: 0,
                total: 0,
                run_id: None,
            }),
        }
    }

    /// Claim the hub for a new run. Fails when a run is already in flight.
    pub async fn begin(&self, total: usize, run_id: Uuid) -> bool {
        let mut state = self.state.write().await;
        if state.status == DiscoveryPhase::Running {
            return false;
        }
        *state = ProgressState {
            status: DiscoveryPhase::Running,
            processed: 0,
            total,
            run_id: Some(run_id),
        };
        true
    }

    /// Release a claim that never got its background task (startup failed).
    pub async fn abort(&self) {
        let mut state = self.state.write().await;
        state.status = DiscoveryPhase::Idle;
        state.run_id = None;
    }

    pub async fn tick(&self, processed: usize) {
        let mut state = self.state.write().await;
        state.processed = processed;
    }

    pub async fn finish(&self) {
        let mut state = self.state.write().await;
        state.status = DiscoveryPhase::Completed;
        state.processed = state.total;
    }

    pub async fn snapshot(&self) -> ProgressSnapshot {
        let state = self.state.read().await;
        if state.run_id.is_none() {
            return ProgressSnapshot::idle();
        }
        let percent = if state.total == 0 {
            100
        } else {
            ((state.processed * 100) / state.total).min(100) as u8
        };
        ProgressSnapshot {
            status: state.status,
            processed: state.processed,
            total: state.total,
            percent,
            run_id: state.run_id,
        }
    }
}
