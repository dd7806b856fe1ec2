use std::{env, time::Duration};

use serde::{Deserialize, Serialize};

pub const DEFAULT_API_URL: &str = "http://localhost:5000";
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%-m/%-d/%Y, %-I:%M:%S %p";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the reports backend, without a trailing slash.
    pub api_url: String,
    #[serde(with = "humantime_serde_compat")]
    pub map_refresh_interval: Duration,
    #[serde(with = "humantime_serde_compat")]
    pub request_timeout: Duration,
    pub http_port: u16,
    pub map: MapSettings,
    pub timestamp_format: String,
}

/// Initial viewport and tile source of the map panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapSettings {
    pub center_lat: f64,
    pub center_lon: f64,
    pub zoom: u8,
    pub tile_url: String,
    pub attribution: String,
}

impl Default for MapSettings {
    fn default() -> Self {
        Self {
            center_lat: 12.9721,
            center_lon: 77.5933,
            zoom: 12,
            tile_url: "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
            attribution: "&copy; OpenStreetMap contributors".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            map_refresh_interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            http_port: 8080,
            map: MapSettings::default(),
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let defaults = Config::default();

        let api_url = env_or("PAVERS_API_URL", DEFAULT_API_URL)
            .trim_end_matches('/')
            .to_string();
        let map_refresh_interval = duration_var("MAP_REFRESH_INTERVAL", "30s")?;
        let request_timeout = duration_var("REQUEST_TIMEOUT", "30s")?;
        let http_port = parsed_var("HTTP_PORT", defaults.http_port)?;

        let map = MapSettings {
            center_lat: parsed_var("MAP_CENTER_LAT", defaults.map.center_lat)?,
            center_lon: parsed_var("MAP_CENTER_LON", defaults.map.center_lon)?,
            zoom: parsed_var("MAP_ZOOM", defaults.map.zoom)?,
            tile_url: env_or("MAP_TILE_URL", &defaults.map.tile_url),
            attribution: env_or("MAP_ATTRIBUTION", &defaults.map.attribution),
        };
        let timestamp_format = env_or("TIMESTAMP_FORMAT", DEFAULT_TIMESTAMP_FORMAT);

        let config = Config {
            api_url,
            map_refresh_interval,
            request_timeout,
            http_port,
            map,
            timestamp_format,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_url.is_empty() {
            return Err(ConfigError::InvalidEnvVar(
                "PAVERS_API_URL".to_string(),
                "cannot be empty".to_string(),
            ));
        }
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            return Err(ConfigError::InvalidEnvVar(
                "PAVERS_API_URL".to_string(),
                "must be an http(s) URL".to_string(),
            ));
        }
        if self.map_refresh_interval.is_zero() {
            return Err(ConfigError::InvalidEnvVar(
                "MAP_REFRESH_INTERVAL".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidEnvVar(
                "REQUEST_TIMEOUT".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        if !(-90.0..=90.0).contains(&self.map.center_lat) {
            return Err(ConfigError::InvalidEnvVar(
                "MAP_CENTER_LAT".to_string(),
                "must be within -90..90".to_string(),
            ));
        }
        if !(-180.0..=180.0).contains(&self.map.center_lon) {
            return Err(ConfigError::InvalidEnvVar(
                "MAP_CENTER_LON".to_string(),
                "must be within -180..180".to_string(),
            ));
        }
        if self.timestamp_format.is_empty() {
            return Err(ConfigError::InvalidEnvVar(
                "TIMESTAMP_FORMAT".to_string(),
                "cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn reports_url(&self) -> String {
        format!("{}/reports", self.api_url)
    }

    pub fn report_url(&self) -> String {
        format!("{}/report", self.api_url)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn duration_var(key: &str, default: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(&env_or(key, default))
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

fn parsed_var<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

// Durations travel as humantime strings ("30s") when the config is dumped.
mod humantime_serde_compat {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.map_refresh_interval, Duration::from_secs(30));
        assert_eq!(config.reports_url(), "http://localhost:5000/reports");
        assert_eq!(config.report_url(), "http://localhost:5000/report");
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.api_url = String::new();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.api_url = "localhost:5000".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.map_refresh_interval = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.map.center_lat = 91.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.map.center_lon = -180.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_dump_uses_humantime() {
        let json = serde_json::to_value(Config::default()).unwrap();
        assert_eq!(json["map_refresh_interval"], "30s");

        let back: Config = serde_json::from_value(json).unwrap();
        assert_eq!(back.request_timeout, Duration::from_secs(30));
    }
}
