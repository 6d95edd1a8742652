// Open-bus Stride API repository implementation
use crate::application::transit_repository::{RouteQuery, TransitRepository};
use crate::domain::vehicle::{Route, VehicleLocationReport};
use crate::infrastructure::config::StrideSettings;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime};
use chrono_tz::Tz;
use serde_json::Value;
use std::time::Duration;

const ROUTES_PATH: &str = "/gtfs_routes/list";
const VEHICLE_LOCATIONS_PATH: &str = "/siri_vehicle_locations/list";
const MAX_ROUTES: usize = 1000;

#[derive(Debug, Clone)]
pub struct StrideRepository {
    base_url: String,
    page_size: usize,
    timezone: Tz,
    client: reqwest::Client,
}

impl StrideRepository {
    pub fn new(settings: &StrideSettings, timezone: Tz) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            page_size: settings.page_size.max(1),
            timezone,
            client,
        })
    }

    fn build_url(&self, path: &str, params: &[(&str, String)]) -> String {
        let query: Vec<String> = params
            .iter()
            .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
            .collect();
        format!("{}{}?{}", self.base_url, path, query.join("&"))
    }

    async fn execute_query(&self, url: &str) -> Result<Vec<Value>> {
        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .context("Failed to send request to Stride API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Stride query failed with status {}: {}", status, body);
        }

        response
            .json::<Vec<Value>>()
            .await
            .context("Failed to parse Stride response")
    }

    /// Fetch up to `limit` rows, one page at a time.
    async fn list(&self, path: &str, params: &[(&str, String)], limit: usize) -> Result<Vec<Value>> {
        let mut rows = Vec::new();

        while rows.len() < limit {
            let page_limit = self.page_size.min(limit - rows.len());
            let mut page_params = params.to_vec();
            page_params.push(("limit", page_limit.to_string()));
            page_params.push(("offset", rows.len().to_string()));

            let url = self.build_url(path, &page_params);
            tracing::debug!("Stride request: {}", url);
            let page = self.execute_query(&url).await?;
            let fetched = page.len();
            rows.extend(page);

            if fetched < page_limit {
                break;
            }
        }

        Ok(rows)
    }
}

#[async_trait]
impl TransitRepository for StrideRepository {
    async fn get_routes(&self, query: &RouteQuery) -> Result<Vec<Route>> {
        let params = [
            ("route_mkt", query.route_mkt.clone()),
            ("date_from", query.date_from.format("%Y-%m-%d").to_string()),
            ("date_to", query.date_to.format("%Y-%m-%d").to_string()),
        ];
        let rows = self.list(ROUTES_PATH, &params, MAX_ROUTES).await?;

        let routes: Vec<Route> = rows
            .iter()
            .map(route_from_row)
            .filter(|r| r.matches(query.filter_name.as_deref(), query.direction.as_deref()))
            .collect();

        tracing::debug!(
            "Found {} of {} routes for route_mkt {}",
            routes.len(),
            rows.len(),
            query.route_mkt
        );
        Ok(routes)
    }

    async fn get_vehicle_locations(
        &self,
        line_ref: &str,
        start_time: DateTime<Tz>,
        end_time: DateTime<Tz>,
        limit: usize,
    ) -> Result<Vec<VehicleLocationReport>> {
        let params = [
            ("siri_routes__line_ref", line_ref.to_string()),
            ("siri_rides__schedualed_start_time_from", start_time.to_rfc3339()),
            ("siri_rides__schedualed_start_time_to", end_time.to_rfc3339()),
            ("order_by", "recorded_at_time desc".to_string()),
        ];
        let rows = self
            .list(VEHICLE_LOCATIONS_PATH, &params, limit)
            .await
            .with_context(|| format!("Failed to fetch vehicle locations for line_ref {}", line_ref))?;

        let reports: Vec<VehicleLocationReport> = rows
            .iter()
            .filter_map(|row| report_from_row(row, self.timezone))
            .collect();

        if reports.len() < rows.len() {
            tracing::debug!(
                "Dropped {} rows without a ride id for line_ref {}",
                rows.len() - reports.len(),
                line_ref
            );
        }
        Ok(reports)
    }
}

fn route_from_row(row: &Value) -> Route {
    Route::new(
        text_field(row, "line_ref"),
        text_field(row, "route_long_name").unwrap_or_default(),
        text_field(row, "route_direction"),
    )
}

/// Decode one location row; rows without a ride id cannot be attributed and are skipped.
fn report_from_row(row: &Value, timezone: Tz) -> Option<VehicleLocationReport> {
    let Some(ride_id) = text_field(row, "siri_ride__id") else {
        tracing::debug!("Skipping vehicle location without siri_ride__id: {}", row);
        return None;
    };

    let report = VehicleLocationReport::new(
        ride_id,
        text_field(row, "siri_ride__vehicle_ref").unwrap_or_default(),
        number_field(row, "lat").unwrap_or(0.0),
        number_field(row, "lon").unwrap_or(0.0),
    )
    .with_velocity(number_field(row, "velocity"))
    .with_bearing(number_field(row, "bearing"))
    .with_journey_distance(number_field(row, "distance_from_journey_start"))
    .with_recorded_at(
        row.get("recorded_at_time")
            .and_then(Value::as_str)
            .and_then(|ts| parse_timestamp(ts, timezone)),
    );

    Some(report)
}

/// Ids arrive as numbers or strings depending on the endpoint.
fn text_field(row: &Value, key: &str) -> Option<String> {
    match row.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number_field(row: &Value, key: &str) -> Option<f64> {
    let value = match row.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    value.filter(|v| v.is_finite())
}

/// RFC 3339, or a naive timestamp taken as UTC, shifted into `timezone`.
fn parse_timestamp(ts: &str, timezone: Tz) -> Option<DateTime<FixedOffset>> {
    let utc = match DateTime::parse_from_rfc3339(ts) {
        Ok(time) => time.to_utc(),
        Err(_) => NaiveDateTime::parse_from_str(ts, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()?
            .and_utc(),
    };
    Some(utc.with_timezone(&timezone).fixed_offset())
}
