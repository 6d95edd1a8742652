// Vehicle telemetry and route domain models
use chrono::{DateTime, FixedOffset};

/// One telemetry sample for a vehicle serving a ride.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleLocationReport {
    pub ride_id: String,
    pub vehicle_ref: String,
    pub lat: f64,
    pub lon: f64,
    /// km/h
    pub velocity: Option<f64>,
    /// Degrees clockwise from north
    pub bearing: Option<f64>,
    /// Meters along the scheduled route since the ride began
    pub distance_from_journey_start: Option<f64>,
    pub recorded_at_time: Option<DateTime<FixedOffset>>,
}

impl VehicleLocationReport {
    pub fn new(ride_id: impl Into<String>, vehicle_ref: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            ride_id: ride_id.into(),
            vehicle_ref: vehicle_ref.into(),
            lat,
            lon,
            velocity: None,
            bearing: None,
            distance_from_journey_start: None,
            recorded_at_time: None,
        }
    }

    pub fn with_velocity(mut self, velocity: impl Into<Option<f64>>) -> Self {
        self.velocity = velocity.into();
        self
    }

    pub fn with_bearing(mut self, bearing: impl Into<Option<f64>>) -> Self {
        self.bearing = bearing.into();
        self
    }

    pub fn with_journey_distance(mut self, meters: impl Into<Option<f64>>) -> Self {
        self.distance_from_journey_start = meters.into();
        self
    }

    pub fn with_recorded_at(mut self, recorded_at: impl Into<Option<DateTime<FixedOffset>>>) -> Self {
        self.recorded_at_time = recorded_at.into();
        self
    }

    pub fn speed(&self) -> f64 {
        or_zero(self.velocity)
    }

    pub fn heading(&self) -> f64 {
        or_zero(self.bearing)
    }

    pub fn journey_distance(&self) -> f64 {
        or_zero(self.distance_from_journey_start)
    }
}

fn or_zero(value: Option<f64>) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// A physical line variant under a route market.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub line_ref: Option<String>,
    pub route_long_name: String,
    pub route_direction: Option<String>,
}

impl Route {
    pub fn new(line_ref: Option<String>, route_long_name: String, route_direction: Option<String>) -> Self {
        Self {
            line_ref,
            route_long_name,
            route_direction,
        }
    }

    /// Whether the route passes the optional name and direction filters.
    pub fn matches(&self, filter_name: Option<&str>, direction: Option<&str>) -> bool {
        let name_ok = filter_name
            .filter(|f| !f.is_empty())
            .map(|f| self.route_long_name.contains(f))
            .unwrap_or(true);
        let direction_ok = direction
            .filter(|d| !d.is_empty())
            .map(|d| self.route_direction.as_deref() == Some(d))
            .unwrap_or(true);

        name_ok && direction_ok
    }
}
