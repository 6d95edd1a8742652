// Repository trait for transit telemetry access
use crate::domain::vehicle::{Route, VehicleLocationReport};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;

/// Route lookup parameters for one route market on a service day range.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteQuery {
    pub route_mkt: String,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub filter_name: Option<String>,
    pub direction: Option<String>,
}

#[async_trait]
pub trait TransitRepository: Send + Sync {
    /// Routes of the market, already narrowed by the optional name and direction filters
    async fn get_routes(&self, query: &RouteQuery) -> anyhow::Result<Vec<Route>>;

    /// Vehicle locations for rides of `line_ref` scheduled to start inside the window,
    /// newest first, at most `limit` rows
    async fn get_vehicle_locations(
        &self,
        line_ref: &str,
        start_time: DateTime<Tz>,
        end_time: DateTime<Tz>,
        limit: usize,
    ) -> anyhow::Result<Vec<VehicleLocationReport>>;
}
