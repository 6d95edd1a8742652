// Poller - Periodic refresh with stale-on-error publishing
use crate::application::tracker_service::{CycleOutcome, EmptyReason, TrackerService};
use crate::domain::snapshot::SelectedSnapshot;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;

/// Last published state of the tracker.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrackerState {
    pub snapshot: Option<SelectedSnapshot>,
    pub empty_reason: Option<EmptyReason>,
    pub last_update_success: bool,
    pub last_error: Option<String>,
    pub last_refreshed_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Default)]
pub struct SnapshotStore {
    state: Arc<RwLock<TrackerState>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn current(&self) -> TrackerState {
        self.state.read().await.clone()
    }

    /// Publish a finished cycle; an empty outcome clears the snapshot.
    pub async fn publish(&self, outcome: CycleOutcome, at: DateTime<Utc>) {
        let mut state = self.state.write().await;
        match outcome {
            CycleOutcome::Snapshot(snapshot) => {
                state.snapshot = Some(snapshot);
                state.empty_reason = None;
            }
            CycleOutcome::Empty(reason) => {
                state.snapshot = None;
                state.empty_reason = Some(reason);
            }
        }
        state.last_update_success = true;
        state.last_error = None;
        state.last_refreshed_at = Some(at);
    }

    /// Record a failed cycle, keeping whatever was published before.
    pub async fn fail(&self, error: String) {
        let mut state = self.state.write().await;
        state.last_update_success = false;
        state.last_error = Some(error);
    }
}

/// Run one cycle and publish its result.
pub async fn refresh(service: &TrackerService, store: &SnapshotStore) {
    let now = Utc::now();
    match service.run_cycle(now).await {
        Ok(outcome) => {
            if let CycleOutcome::Snapshot(snapshot) = &outcome {
                tracing::info!(
                    "Vehicle {} at {} ({} km/h)",
                    snapshot.vehicle_ref,
                    snapshot.location,
                    snapshot.speed
                );
            }
            store.publish(outcome, now).await;
        }
        Err(e) => {
            let message = e.to_string();
            tracing::error!("Update failed: {:#}", anyhow::Error::from(e));
            store.fail(message).await;
        }
    }
}

/// Refresh on a fixed interval, starting immediately.
///
/// Cycles run back to back on this task, so they never overlap; ticks missed
/// by a slow cycle are skipped.
pub async fn run_poller(service: TrackerService, store: SnapshotStore, interval: Duration) {
    tracing::info!("Starting poller, refreshing every {}s", interval.as_secs());

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        refresh(&service, &store).await;
    }
}
