// Ride partitioning and active-ride selection
use super::vehicle::VehicleLocationReport;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Reports grouped by `ride_id`, each group keeping the relative input order.
///
/// Rides iterate in ascending `ride_id` order, which is also the tie-break order
/// used by selection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RidePartition {
    rides: BTreeMap<String, Vec<VehicleLocationReport>>,
}

/// Borrowed view of one ride inside a partition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ride<'a> {
    pub ride_id: &'a str,
    pub reports: &'a [VehicleLocationReport],
}

impl<'a> Ride<'a> {
    /// The newest report of the ride.
    ///
    /// Reports are expected newest-first, but the order is not trusted: the report
    /// with the latest `recorded_at_time` wins, earlier input position breaks ties and
    /// reports without a timestamp only win when no report has one.
    pub fn latest(&self) -> Option<&'a VehicleLocationReport> {
        let reports: &'a [VehicleLocationReport] = self.reports;
        reports.iter().fold(None, |best: Option<&'a VehicleLocationReport>, report| match best {
            Some(current) if report.recorded_at_time <= current.recorded_at_time => Some(current),
            _ => Some(report),
        })
    }

    /// Journey distance of the newest report, the selection key.
    pub fn start_distance(&self) -> f64 {
        self.latest().map(|r| r.journey_distance()).unwrap_or(0.0)
    }
}

impl RidePartition {
    pub fn is_empty(&self) -> bool {
        self.rides.is_empty()
    }

    /// Number of rides.
    pub fn len(&self) -> usize {
        self.rides.len()
    }

    pub fn total_reports(&self) -> usize {
        self.rides.values().map(Vec::len).sum()
    }

    pub fn get(&self, ride_id: &str) -> Option<Ride<'_>> {
        self.rides.get_key_value(ride_id).map(|(id, reports)| Ride {
            ride_id: id.as_str(),
            reports: reports.as_slice(),
        })
    }

    pub fn rides(&self) -> impl Iterator<Item = Ride<'_>> {
        self.rides.iter().map(|(id, reports)| Ride {
            ride_id: id.as_str(),
            reports: reports.as_slice(),
        })
    }

    pub fn ride_ids(&self) -> impl Iterator<Item = &str> {
        self.rides.keys().map(String::as_str)
    }
}

/// Group reports by ride in a single stable pass.
pub fn partition<I>(reports: I) -> RidePartition
where
    I: IntoIterator<Item = VehicleLocationReport>,
{
    let mut rides: BTreeMap<String, Vec<VehicleLocationReport>> = BTreeMap::new();
    for report in reports {
        rides.entry(report.ride_id.clone()).or_default().push(report);
    }
    RidePartition { rides }
}

/// Pick the ride that has only just begun: the smallest journey distance on its
/// newest report. Equal distances resolve to the lexicographically smallest `ride_id`.
pub fn select_ride(partition: &RidePartition) -> Option<Ride<'_>> {
    partition.rides().min_by(|a, b| compare_by_start_distance(a, b))
}

fn compare_by_start_distance(a: &Ride<'_>, b: &Ride<'_>) -> Ordering {
    a.start_distance()
        .total_cmp(&b.start_distance())
        .then_with(|| a.ride_id.cmp(b.ride_id))
}
