use crate::adapters::spot_price::{DEFAULT_PRICE_AREA, DEFAULT_SPOT_PRICE_URL};
use crate::app::AppError;

// Matched as substrings of the reported coordinates, so precision matters.
const DEFAULT_HOME_LATITUDE: &str = "55.547";
const DEFAULT_HOME_LONGITUDE: &str = "11.222";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: String,
    pub http_bind: String,
    pub home_latitude: String,
    pub home_longitude: String,
    pub reconcile_interval_secs: u64,
    pub retry_interval_secs: u64,
    pub price_interval_secs: u64,
    pub price_idle_interval_secs: u64,
    pub max_consecutive_failures: u32,
    pub max_price_updates: u32,
    pub battery_capacity_kwh: Option<f64>,
    pub price_area: String,
    pub spot_price_url: String,
    pub tariff_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            db_path: lookup("DB_PATH")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "/var/lib/evcharge/evcharge.db".to_string()),
            http_bind: lookup("HTTP_BIND")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            home_latitude: lookup("HOME_LATITUDE")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_HOME_LATITUDE.to_string()),
            home_longitude: lookup("HOME_LONGITUDE")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_HOME_LONGITUDE.to_string()),
            reconcile_interval_secs: parse_or_default(&lookup, "RECONCILE_INTERVAL_SECS", 1800_u64)?,
            retry_interval_secs: parse_or_default(&lookup, "RETRY_INTERVAL_SECS", 1_u64)?,
            price_interval_secs: parse_or_default(&lookup, "PRICE_INTERVAL_SECS", 5_u64)?,
            price_idle_interval_secs: parse_or_default(&lookup, "PRICE_IDLE_INTERVAL_SECS", 600_u64)?,
            max_consecutive_failures: parse_or_default(&lookup, "MAX_CONSECUTIVE_FAILURES", 10_u32)?,
            max_price_updates: parse_or_default(&lookup, "MAX_PRICE_UPDATES", 5000_u32)?,
            battery_capacity_kwh: parse_optional(&lookup, "BATTERY_CAPACITY_KWH")?,
            price_area: lookup("PRICE_AREA")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_PRICE_AREA.to_string()),
            spot_price_url: lookup("SPOT_PRICE_URL")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_SPOT_PRICE_URL.to_string()),
            tariff_url: lookup("TARIFF_URL")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
        })
    }
}

fn parse_or_default<T, F>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr + Copy,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::config(format!("{key} must be a valid number"))),
        None => Ok(default),
    }
}

fn parse_optional<T, F>(lookup: &F, key: &str) -> Result<Option<T>, AppError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| AppError::config(format!("{key} must be a valid number"))),
        _ => Ok(None),
    }
}
