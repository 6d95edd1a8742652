// HTTP request handlers
use crate::application::poller::TrackerState;
use crate::domain::snapshot::SelectedSnapshot;
use crate::presentation::app_state::AppState;
use axum::{extract::State, Json};
use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use std::sync::Arc;

const SPEED_UNITS: &str = "km/h";
const DISTANCE_UNITS: &str = "m";
const BEARING_UNITS: &str = "°";

/// Discrete named values; every field is null while no snapshot is published.
#[derive(Debug, Default, Serialize, PartialEq)]
pub struct SensorValues {
    pub location: Option<String>,
    pub speed: Option<f64>,
    pub bearing: Option<f64>,
    pub distance_from_start: Option<f64>,
    pub distance_from_station: Option<f64>,
    pub vehicle_ref: Option<String>,
    pub last_update: Option<DateTime<FixedOffset>>,
    pub available: bool,
}

impl From<Option<&SelectedSnapshot>> for SensorValues {
    fn from(snapshot: Option<&SelectedSnapshot>) -> Self {
        match snapshot {
            Some(s) => Self {
                location: Some(s.location.clone()),
                speed: Some(s.speed),
                bearing: Some(s.bearing),
                distance_from_start: Some(s.distance_from_start),
                distance_from_station: s.distance_from_station,
                vehicle_ref: Some(s.vehicle_ref.clone()),
                last_update: s.last_update,
                available: true,
            },
            None => Self::default(),
        }
    }
}

/// Position view with unit-suffixed attributes for map consumers.
#[derive(Debug, Serialize, PartialEq)]
pub struct TrackerView {
    pub name: String,
    pub source_type: &'static str,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub attributes: Option<TrackerAttributes>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct TrackerAttributes {
    pub vehicle_ref: String,
    pub speed: String,
    pub bearing: String,
    pub distance_from_start: String,
    pub distance_from_station: Option<String>,
    pub last_update: Option<DateTime<FixedOffset>>,
}

impl TrackerView {
    fn new(route_mkt: &str, snapshot: Option<&SelectedSnapshot>) -> Self {
        Self {
            name: format!("Bus {} Position", route_mkt),
            source_type: "gps",
            latitude: snapshot.and_then(SelectedSnapshot::latitude),
            longitude: snapshot.and_then(SelectedSnapshot::longitude),
            attributes: snapshot.map(|s| TrackerAttributes {
                vehicle_ref: s.vehicle_ref.clone(),
                speed: format!("{} {}", s.speed, SPEED_UNITS),
                bearing: format!("{} {}", s.bearing, BEARING_UNITS),
                distance_from_start: format!("{} {}", s.distance_from_start, DISTANCE_UNITS),
                distance_from_station: s
                    .distance_from_station
                    .map(|d| format!("{:.0} {}", d, DISTANCE_UNITS)),
                last_update: s.last_update,
            }),
        }
    }
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Full tracker state including refresh status
pub async fn get_snapshot(State(state): State<Arc<AppState>>) -> Json<TrackerState> {
    Json(state.store.current().await)
}

pub async fn get_sensors(State(state): State<Arc<AppState>>) -> Json<SensorValues> {
    let current = state.store.current().await;
    Json(SensorValues::from(current.snapshot.as_ref()))
}

pub async fn get_tracker(State(state): State<Arc<AppState>>) -> Json<TrackerView> {
    let current = state.store.current().await;
    Json(TrackerView::new(&state.route_mkt, current.snapshot.as_ref()))
}
