// Live distance from each ride to the reference point, and selection policies
use super::geo::ReferencePoint;
use super::ride::{Ride, RidePartition, select_ride};
use super::vehicle::VehicleLocationReport;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Newest report of a ride with its distance to the reference point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectedRide<'a> {
    pub report: &'a VehicleLocationReport,
    pub distance_m: f64,
}

/// How the active ride is chosen among the rides in a window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Smallest journey distance on the newest report.
    #[default]
    ClosestToJourneyStart,
    /// Smallest live distance to the reference point.
    NearestToReference,
}

/// Distance to `reference` for the newest report of every ride, keyed by ride id.
pub fn project<'a>(
    partition: &'a RidePartition,
    reference: &ReferencePoint,
) -> BTreeMap<&'a str, ProjectedRide<'a>> {
    partition
        .rides()
        .filter_map(|ride| {
            let report = ride.latest()?;
            let distance_m = reference.distance_to(report.lat, report.lon);
            distance_m.is_finite().then_some((
                ride.ride_id,
                ProjectedRide { report, distance_m },
            ))
        })
        .collect()
}

/// Choose the active ride under `policy`.
///
/// `NearestToReference` without a reference point behaves like the default policy.
pub fn select_with_policy<'a>(
    partition: &'a RidePartition,
    policy: SelectionPolicy,
    reference: Option<&ReferencePoint>,
) -> Option<Ride<'a>> {
    match (policy, reference) {
        (SelectionPolicy::NearestToReference, Some(reference)) => {
            let projected = project(partition, reference);
            let (ride_id, _) = projected
                .iter()
                .min_by(|a, b| a.1.distance_m.total_cmp(&b.1.distance_m).then_with(|| a.0.cmp(b.0)))?;
            partition.get(ride_id)
        }
        _ => select_ride(partition),
    }
}
