use crate::domain::geo::ReferencePoint;
use crate::domain::projector::SelectionPolicy;
use chrono_tz::Tz;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

const MIN_UPDATE_INTERVAL_SECS: u64 = 10;
const MAX_UPDATE_INTERVAL_SECS: u64 = 3600;

// Service area bounds for the reference point
const MIN_LAT: f64 = 29.0;
const MAX_LAT: f64 = 34.0;
const MIN_LON: f64 = 34.0;
const MAX_LON: f64 = 36.0;

#[derive(Debug, Deserialize, Clone)]
pub struct TrackerConfig {
    pub tracker: TrackerSection,
    #[serde(default)]
    pub stride: StrideSettings,
    #[serde(default)]
    pub server: ServerSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrackerSection {
    pub route_mkt: String,
    pub filter_name: Option<String>,
    pub direction: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    #[serde(default = "default_update_interval")]
    pub update_interval_secs: u64,
    #[serde(default = "default_window_minutes")]
    pub window_minutes: u32,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub selection_policy: SelectionPolicy,
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StrideSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for StrideSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            page_size: default_page_size(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

fn default_update_interval() -> u64 {
    30
}

fn default_window_minutes() -> u32 {
    30
}

fn default_timezone() -> String {
    "Israel".to_string()
}

fn default_fetch_limit() -> usize {
    100_000
}

fn default_base_url() -> String {
    "https://open-bus-stride-api.hasadna.org.il".to_string()
}

fn default_page_size() -> usize {
    1000
}

fn default_timeout() -> u64 {
    30
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("route_mkt must be numeric, got {0:?}")]
    InvalidRouteMkt(String),

    #[error("direction must be \"1\" or \"2\", got {0:?}")]
    InvalidDirection(String),

    #[error("update interval must be between 10 and 3600 seconds, got {0}")]
    InvalidUpdateInterval(u64),

    #[error("window must be at least one minute")]
    InvalidWindow,

    #[error("fetch_limit must be at least 1")]
    InvalidFetchLimit,

    #[error("lat must be between 29 and 34, got {0}")]
    InvalidLat(f64),

    #[error("lon must be between 34 and 36, got {0}")]
    InvalidLon(f64),

    #[error("unknown timezone {0:?}")]
    InvalidTimezone(String),
}

/// Validated, immutable settings handed to each polling cycle.
#[derive(Debug, Clone)]
pub struct TrackerSettings {
    pub route_mkt: String,
    pub filter_name: Option<String>,
    pub direction: Option<String>,
    pub reference_point: Option<ReferencePoint>,
    pub update_interval: Duration,
    pub window: chrono::Duration,
    pub timezone: Tz,
    pub selection_policy: SelectionPolicy,
    pub fetch_limit: usize,
}

impl TrackerSection {
    pub fn validate(&self) -> Result<TrackerSettings, ConfigError> {
        let route_mkt = self.route_mkt.trim();
        if route_mkt.is_empty() || !route_mkt.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigError::InvalidRouteMkt(self.route_mkt.clone()));
        }

        let direction = non_empty(&self.direction);
        if let Some(d) = &direction {
            if d != "1" && d != "2" {
                return Err(ConfigError::InvalidDirection(d.clone()));
            }
        }

        if !(MIN_UPDATE_INTERVAL_SECS..=MAX_UPDATE_INTERVAL_SECS).contains(&self.update_interval_secs) {
            return Err(ConfigError::InvalidUpdateInterval(self.update_interval_secs));
        }

        if self.window_minutes == 0 {
            return Err(ConfigError::InvalidWindow);
        }

        if self.fetch_limit == 0 {
            return Err(ConfigError::InvalidFetchLimit);
        }

        if let Some(lat) = self.lat {
            if !(MIN_LAT..=MAX_LAT).contains(&lat) {
                return Err(ConfigError::InvalidLat(lat));
            }
        }
        if let Some(lon) = self.lon {
            if !(MIN_LON..=MAX_LON).contains(&lon) {
                return Err(ConfigError::InvalidLon(lon));
            }
        }
        let reference_point = match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some(ReferencePoint::new(lat, lon)),
            _ => None,
        };

        let timezone: Tz = self
            .timezone
            .parse()
            .map_err(|_| ConfigError::InvalidTimezone(self.timezone.clone()))?;

        Ok(TrackerSettings {
            route_mkt: route_mkt.to_string(),
            filter_name: non_empty(&self.filter_name),
            direction,
            reference_point,
            update_interval: Duration::from_secs(self.update_interval_secs),
            window: chrono::Duration::minutes(i64::from(self.window_minutes)),
            timezone,
            selection_policy: self.selection_policy,
            fetch_limit: self.fetch_limit,
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Load `config/tracker.*`, overridden by `BUS_TRACKER__<SECTION>__<KEY>` variables.
pub fn load_tracker_config() -> anyhow::Result<TrackerConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/tracker").required(false))
        .add_source(
            config::Environment::with_prefix("BUS_TRACKER")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}
