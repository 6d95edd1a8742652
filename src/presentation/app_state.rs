// Application state for HTTP handlers
use crate::application::poller::SnapshotStore;

#[derive(Clone)]
pub struct AppState {
    pub store: SnapshotStore,
    pub route_mkt: String,
}
