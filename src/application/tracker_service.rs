// Tracker service - One polling cycle from route lookup to snapshot
use crate::application::transit_repository::{RouteQuery, TransitRepository};
use crate::domain::projector::{project, select_with_policy};
use crate::domain::ride::partition;
use crate::domain::snapshot::SelectedSnapshot;
use crate::domain::vehicle::{Route, VehicleLocationReport};
use crate::infrastructure::config::TrackerSettings;
use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Why a cycle finished without a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyReason {
    NoRoutes,
    MissingLineRef,
    NoVehicleLocations,
    NoDistances,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Snapshot(SelectedSnapshot),
    Empty(EmptyReason),
}

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("route lookup failed for route_mkt {route_mkt}")]
    RouteLookup {
        route_mkt: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("vehicle location fetch failed for all {0} line refs")]
    AllSourcesFailed(usize),

    #[error("vehicle location fetch failed for {failed} of {total} line refs and the rest returned nothing")]
    SourcesFailedWithoutData { failed: usize, total: usize },
}

/// Result of fetching one line variant.
#[derive(Debug)]
pub enum SourceOutcome {
    Fetched {
        line_ref: String,
        reports: Vec<VehicleLocationReport>,
    },
    Failed {
        line_ref: String,
        error: anyhow::Error,
    },
}

#[derive(Clone)]
pub struct TrackerService {
    repository: Arc<dyn TransitRepository>,
    settings: TrackerSettings,
}

impl TrackerService {
    pub fn new(repository: Arc<dyn TransitRepository>, settings: TrackerSettings) -> Self {
        Self {
            repository,
            settings,
        }
    }

    /// Run one cycle for the window ending at `now`.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleOutcome, TrackerError> {
        let local_now = now.with_timezone(&self.settings.timezone);
        let end_time = local_now
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(local_now);
        let start_time = end_time - self.settings.window;
        let today = local_now.date_naive();

        tracing::debug!(
            "Cycle for route_mkt {} window {} .. {}, ref point: {:?}",
            self.settings.route_mkt,
            start_time,
            end_time,
            self.settings.reference_point
        );

        let query = RouteQuery {
            route_mkt: self.settings.route_mkt.clone(),
            date_from: today,
            date_to: today,
            filter_name: self.settings.filter_name.clone(),
            direction: self.settings.direction.clone(),
        };

        let routes = self
            .repository
            .get_routes(&query)
            .await
            .map_err(|source| TrackerError::RouteLookup {
                route_mkt: query.route_mkt.clone(),
                source,
            })?;

        if routes.is_empty() {
            tracing::warn!(
                "No routes found for route_mkt={}, date={}, filter_name={:?}, direction={:?}",
                query.route_mkt,
                today,
                query.filter_name,
                query.direction
            );
            return Ok(CycleOutcome::Empty(EmptyReason::NoRoutes));
        }

        let line_refs = distinct_line_refs(&routes);
        if line_refs.is_empty() {
            tracing::error!("None of the {} routes carries a line_ref", routes.len());
            return Ok(CycleOutcome::Empty(EmptyReason::MissingLineRef));
        }

        let sources = self.fetch_sources(&line_refs, start_time, end_time).await;
        let rides = partition(combine_sources(sources)?);

        if rides.is_empty() {
            tracing::warn!("No vehicle locations found");
            return Ok(CycleOutcome::Empty(EmptyReason::NoVehicleLocations));
        }

        tracing::debug!(
            "Unique rides ({}): {:?}, reports: {}",
            rides.len(),
            rides.ride_ids().collect::<Vec<_>>(),
            rides.total_reports()
        );

        let reference = self.settings.reference_point.as_ref();
        if let Some(reference) = reference {
            let distances = project(&rides, reference);
            if distances.is_empty() {
                tracing::warn!("No current distances available");
                return Ok(CycleOutcome::Empty(EmptyReason::NoDistances));
            }
            for (ride_id, projected) in &distances {
                tracing::debug!("Ride {} is {:.0} m from the reference point", ride_id, projected.distance_m);
            }
        }

        let Some(latest) = select_with_policy(&rides, self.settings.selection_policy, reference)
            .and_then(|ride| ride.latest())
        else {
            return Ok(CycleOutcome::Empty(EmptyReason::NoVehicleLocations));
        };

        tracing::debug!(
            "Selected ride {} vehicle {} at {:.0} m from journey start",
            latest.ride_id,
            latest.vehicle_ref,
            latest.journey_distance()
        );

        Ok(CycleOutcome::Snapshot(SelectedSnapshot::build(latest, reference)))
    }

    async fn fetch_sources(
        &self,
        line_refs: &[String],
        start_time: DateTime<Tz>,
        end_time: DateTime<Tz>,
    ) -> Vec<SourceOutcome> {
        let fetches = line_refs.iter().map(|line_ref| async move {
            match self
                .repository
                .get_vehicle_locations(line_ref, start_time, end_time, self.settings.fetch_limit)
                .await
            {
                Ok(reports) => SourceOutcome::Fetched {
                    line_ref: line_ref.clone(),
                    reports,
                },
                Err(error) => SourceOutcome::Failed {
                    line_ref: line_ref.clone(),
                    error,
                },
            }
        });

        join_all(fetches).await
    }
}

/// Distinct line refs in route order.
fn distinct_line_refs(routes: &[Route]) -> Vec<String> {
    let mut line_refs: Vec<String> = Vec::new();
    for line_ref in routes.iter().filter_map(|r| r.line_ref.as_ref()) {
        if !line_refs.contains(line_ref) {
            line_refs.push(line_ref.clone());
        }
    }
    line_refs
}

/// Concatenate reports from every source that succeeded.
///
/// Fails when every source failed, or when some failed and the others returned no reports.
fn combine_sources(sources: Vec<SourceOutcome>) -> Result<Vec<VehicleLocationReport>, TrackerError> {
    let total = sources.len();
    let mut failed = 0;
    let mut reports = Vec::new();

    for source in sources {
        match source {
            SourceOutcome::Fetched { line_ref, reports: fetched } => {
                tracing::debug!("Fetched {} vehicle locations for line_ref {}", fetched.len(), line_ref);
                reports.extend(fetched);
            }
            SourceOutcome::Failed { line_ref, error } => {
                tracing::warn!("Skipping line_ref {}: {:#}", line_ref, error);
                failed += 1;
            }
        }
    }

    if total > 0 && failed == total {
        return Err(TrackerError::AllSourcesFailed(total));
    }
    if failed > 0 && reports.is_empty() {
        return Err(TrackerError::SourcesFailedWithoutData { failed, total });
    }

    Ok(reports)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::geo::ReferencePoint;
    use crate::domain::projector::SelectionPolicy;
    use async_trait::async_trait;
    use chrono::{FixedOffset, TimeZone};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory repository recording the calls it receives.
    #[derive(Default)]
    pub(crate) struct FakeRepository {
        pub routes: Vec<Route>,
        pub fail_routes: bool,
        pub locations: HashMap<String, Vec<VehicleLocationReport>>,
        pub failing_line_refs: Vec<String>,
        pub route_queries: Mutex<Vec<RouteQuery>>,
        pub windows: Mutex<Vec<(String, DateTime<Tz>, DateTime<Tz>)>>,
    }

    #[async_trait]
    impl TransitRepository for FakeRepository {
        async fn get_routes(&self, query: &RouteQuery) -> anyhow::Result<Vec<Route>> {
            self.route_queries.lock().unwrap().push(query.clone());
            if self.fail_routes {
                anyhow::bail!("stride unavailable");
            }
            Ok(self.routes.clone())
        }

        async fn get_vehicle_locations(
            &self,
            line_ref: &str,
            start_time: DateTime<Tz>,
            end_time: DateTime<Tz>,
            _limit: usize,
        ) -> anyhow::Result<Vec<VehicleLocationReport>> {
            self.windows
                .lock()
                .unwrap()
                .push((line_ref.to_string(), start_time, end_time));
            if self.failing_line_refs.iter().any(|l| l == line_ref) {
                anyhow::bail!("timeout fetching {line_ref}");
            }
            Ok(self.locations.get(line_ref).cloned().unwrap_or_default())
        }
    }

    pub(crate) fn settings() -> TrackerSettings {
        TrackerSettings {
            route_mkt: "23056".to_string(),
            filter_name: Some("רדינג".to_string()),
            direction: Some("1".to_string()),
            reference_point: None,
            update_interval: std::time::Duration::from_secs(30),
            window: chrono::Duration::minutes(30),
            timezone: chrono_tz::Israel,
            selection_policy: SelectionPolicy::ClosestToJourneyStart,
            fetch_limit: 100_000,
        }
    }

    pub(crate) fn route(line_ref: &str) -> Route {
        Route::new(Some(line_ref.to_string()), "רדינג-תל אביב יפו".to_string(), Some("1".to_string()))
    }

    pub(crate) fn report(ride: &str, distance: f64, minute: u32) -> VehicleLocationReport {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        VehicleLocationReport::new(ride, format!("bus-{ride}"), 32.0865, 34.7876)
            .with_velocity(30.0)
            .with_bearing(90.0)
            .with_journey_distance(distance)
            .with_recorded_at(tz.with_ymd_and_hms(2025, 2, 19, 10, minute, 0).unwrap())
    }

    pub(crate) fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 19, 8, 12, 34).unwrap()
    }

    fn service(repository: FakeRepository, settings: TrackerSettings) -> (TrackerService, Arc<FakeRepository>) {
        let repository = Arc::new(repository);
        (TrackerService::new(repository.clone(), settings), repository)
    }

    fn snapshot(outcome: CycleOutcome) -> SelectedSnapshot {
        match outcome {
            CycleOutcome::Snapshot(snapshot) => snapshot,
            CycleOutcome::Empty(reason) => panic!("expected a snapshot, got {reason:?}"),
        }
    }

    #[tokio::test]
    async fn test_selects_ride_closest_to_start() {
        let repository = FakeRepository {
            routes: vec![route("7023")],
            locations: HashMap::from([(
                "7023".to_string(),
                vec![report("A", 1500.0, 10), report("B", 300.0, 5), report("A", 1200.0, 8)],
            )]),
            ..Default::default()
        };
        let (service, _) = service(repository, settings());

        let snapshot = snapshot(service.run_cycle(now()).await.unwrap());
        assert_eq!(snapshot.vehicle_ref, "bus-B");
        assert_eq!(snapshot.distance_from_start, 300.0);
        assert_eq!(snapshot.location, "32.0865,34.7876");
        assert_eq!(snapshot.speed, 30.0);
        assert_eq!(snapshot.bearing, 90.0);
        assert_eq!(snapshot.distance_from_station, None);
    }

    #[tokio::test]
    async fn test_query_and_window() {
        let repository = FakeRepository {
            routes: vec![route("7023")],
            ..Default::default()
        };
        let (service, repository) = service(repository, settings());

        let outcome = service.run_cycle(now()).await.unwrap();
        assert_eq!(outcome, CycleOutcome::Empty(EmptyReason::NoVehicleLocations));

        let queries = repository.route_queries.lock().unwrap();
        assert_eq!(queries[0].route_mkt, "23056");
        assert_eq!(queries[0].date_from.to_string(), "2025-02-19");
        assert_eq!(queries[0].date_to, queries[0].date_from);
        assert_eq!(queries[0].filter_name.as_deref(), Some("רדינג"));
        assert_eq!(queries[0].direction.as_deref(), Some("1"));

        // 08:12:34 UTC is 10:12:34 in Israel during February
        let windows = repository.windows.lock().unwrap();
        let (line_ref, start, end) = &windows[0];
        assert_eq!(line_ref, "7023");
        assert_eq!(end.to_rfc3339(), "2025-02-19T10:12:00+02:00");
        assert_eq!(start.to_rfc3339(), "2025-02-19T09:42:00+02:00");
    }

    #[tokio::test]
    async fn test_no_routes_is_empty_result() {
        let (service, _) = service(FakeRepository::default(), settings());
        let outcome = service.run_cycle(now()).await.unwrap();
        assert_eq!(outcome, CycleOutcome::Empty(EmptyReason::NoRoutes));
    }

    #[tokio::test]
    async fn test_routes_without_line_ref() {
        let repository = FakeRepository {
            routes: vec![Route::new(None, "רדינג".to_string(), None)],
            ..Default::default()
        };
        let (service, repository) = service(repository, settings());

        let outcome = service.run_cycle(now()).await.unwrap();
        assert_eq!(outcome, CycleOutcome::Empty(EmptyReason::MissingLineRef));
        assert!(repository.windows.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_route_lookup_failure_is_an_error() {
        let repository = FakeRepository {
            fail_routes: true,
            ..Default::default()
        };
        let (service, _) = service(repository, settings());

        let err = service.run_cycle(now()).await.unwrap_err();
        assert!(matches!(err, TrackerError::RouteLookup { .. }));
        assert_eq!(err.to_string(), "route lookup failed for route_mkt 23056");
    }

    #[tokio::test]
    async fn test_one_failing_line_ref_does_not_abort_others() {
        let repository = FakeRepository {
            routes: vec![route("7023"), route("7024"), route("7023")],
            locations: HashMap::from([("7024".to_string(), vec![report("C", 700.0, 11)])]),
            failing_line_refs: vec!["7023".to_string()],
            ..Default::default()
        };
        let (service, repository) = service(repository, settings());

        let snapshot = snapshot(service.run_cycle(now()).await.unwrap());
        assert_eq!(snapshot.vehicle_ref, "bus-C");
        // Duplicate line refs are fetched once
        assert_eq!(repository.windows.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_reports_from_all_line_refs_are_combined() {
        let repository = FakeRepository {
            routes: vec![route("7023"), route("7024")],
            locations: HashMap::from([
                ("7023".to_string(), vec![report("A", 900.0, 10)]),
                ("7024".to_string(), vec![report("B", 150.0, 9)]),
            ]),
            ..Default::default()
        };
        let (service, _) = service(repository, settings());

        let snapshot = snapshot(service.run_cycle(now()).await.unwrap());
        assert_eq!(snapshot.vehicle_ref, "bus-B");
    }

    #[tokio::test]
    async fn test_all_line_refs_failing_is_an_error() {
        let repository = FakeRepository {
            routes: vec![route("7023"), route("7024")],
            failing_line_refs: vec!["7023".to_string(), "7024".to_string()],
            ..Default::default()
        };
        let (service, _) = service(repository, settings());

        let err = service.run_cycle(now()).await.unwrap_err();
        assert!(matches!(err, TrackerError::AllSourcesFailed(2)));
    }

    #[tokio::test]
    async fn test_failure_with_empty_remaining_sources_is_an_error() {
        let repository = FakeRepository {
            routes: vec![route("7023"), route("7024")],
            failing_line_refs: vec!["7023".to_string()],
            ..Default::default()
        };
        let (service, _) = service(repository, settings());

        let err = service.run_cycle(now()).await.unwrap_err();
        assert!(matches!(err, TrackerError::SourcesFailedWithoutData { failed: 1, total: 2 }));
    }

    #[tokio::test]
    async fn test_reference_point_fills_distance_from_station() {
        let mut settings = settings();
        settings.reference_point = Some(ReferencePoint::new(32.090260, 34.782621));
        let repository = FakeRepository {
            routes: vec![route("7023")],
            locations: HashMap::from([(
                "7023".to_string(),
                vec![report("A", 1500.0, 10), report("B", 300.0, 5)],
            )]),
            ..Default::default()
        };
        let (service, _) = service(repository, settings);

        let snapshot = snapshot(service.run_cycle(now()).await.unwrap());
        assert_eq!(snapshot.vehicle_ref, "bus-B");
        let distance = snapshot.distance_from_station.unwrap();
        assert!(distance > 0.0);
        assert!((distance - ReferencePoint::new(32.090260, 34.782621).distance_to(32.0865, 34.7876)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_nearest_to_reference_policy() {
        let mut settings = settings();
        settings.reference_point = Some(ReferencePoint::new(32.090260, 34.782621));
        settings.selection_policy = SelectionPolicy::NearestToReference;

        let mut far = report("A", 100.0, 10);
        far.lat = 32.2;
        far.lon = 34.9;
        let repository = FakeRepository {
            routes: vec![route("7023")],
            locations: HashMap::from([("7023".to_string(), vec![far, report("B", 4000.0, 10)])]),
            ..Default::default()
        };
        let (service, _) = service(repository, settings);

        let snapshot = snapshot(service.run_cycle(now()).await.unwrap());
        assert_eq!(snapshot.vehicle_ref, "bus-B");
    }

    #[test]
    fn test_distinct_line_refs_keep_order() {
        let routes = vec![route("3"), Route::new(None, String::new(), None), route("1"), route("3")];
        assert_eq!(distinct_line_refs(&routes), vec!["3".to_string(), "1".to_string()]);
    }

    #[test]
    fn test_combine_without_sources() {
        assert!(combine_sources(Vec::new()).unwrap().is_empty());
    }
}
