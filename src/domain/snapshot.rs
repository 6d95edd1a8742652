// Published snapshot of the selected vehicle
use super::geo::ReferencePoint;
use super::vehicle::VehicleLocationReport;
use chrono::{DateTime, FixedOffset};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectedSnapshot {
    /// "lat,lon" with four decimals each
    pub location: String,
    pub speed: f64,
    pub bearing: f64,
    pub distance_from_start: f64,
    pub distance_from_station: Option<f64>,
    pub vehicle_ref: String,
    pub last_update: Option<DateTime<FixedOffset>>,
}

impl SelectedSnapshot {
    pub fn build(report: &VehicleLocationReport, reference: Option<&ReferencePoint>) -> Self {
        Self {
            location: format_location(report.lat, report.lon),
            speed: report.speed(),
            bearing: report.heading(),
            distance_from_start: report.journey_distance(),
            distance_from_station: reference.map(|r| r.distance_to(report.lat, report.lon)),
            vehicle_ref: report.vehicle_ref.clone(),
            last_update: report.recorded_at_time,
        }
    }

    pub fn latitude(&self) -> Option<f64> {
        self.coordinates().map(|(lat, _)| lat)
    }

    pub fn longitude(&self) -> Option<f64> {
        self.coordinates().map(|(_, lon)| lon)
    }

    fn coordinates(&self) -> Option<(f64, f64)> {
        let (lat, lon) = self.location.split_once(',')?;
        Some((lat.trim().parse().ok()?, lon.trim().parse().ok()?))
    }
}

pub fn format_location(lat: f64, lon: f64) -> String {
    format!("{:.4},{:.4}", lat, lon)
}
