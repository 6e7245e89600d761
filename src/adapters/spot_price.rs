//! Clients for the external price feeds. Spot prices come from the Danish
//! day-ahead market API keyed by UTC hour and price area; the transport
//! tariff prefers a published feed and falls back to the hardcoded schedule.

use std::time::Duration;

use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::Deserialize;
use thiserror::Error;

use crate::domain::tariff::transport_tariff_fallback;

pub const DEFAULT_SPOT_PRICE_URL: &str = "https://api.energidataservice.dk/dataset/Elspotprices";
pub const DEFAULT_PRICE_AREA: &str = "DK2";

const EUR_TO_DKK: f64 = 7.45;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("price feed request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("no spot price published for {0}")]
    MissingHour(String),
}

pub trait SpotPriceFeed: Send + Sync {
    /// Day-ahead spot price in DKK/kWh for the hour containing `at`.
    fn spot_price_dkk_per_kwh(&self, at: NaiveDateTime) -> Result<f64, FeedError>;
}

pub trait TariffFeed: Send + Sync {
    fn transport_tariff_dkk_per_kwh(&self, at: NaiveDateTime) -> Result<f64, FeedError>;
}

#[derive(Debug, Deserialize)]
struct SpotPriceResponse {
    records: Vec<SpotPriceRecord>,
}

#[derive(Debug, Deserialize)]
struct SpotPriceRecord {
    #[serde(rename = "SpotPriceEUR")]
    spot_price_eur: f64,
}

pub struct ElspotClient {
    base_url: String,
    price_area: String,
    http: reqwest::blocking::Client,
}

impl ElspotClient {
    pub fn new(base_url: &str, price_area: &str) -> Result<Self, FeedError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            price_area: price_area.to_string(),
            http,
        })
    }
}

impl SpotPriceFeed for ElspotClient {
    fn spot_price_dkk_per_kwh(&self, at: NaiveDateTime) -> Result<f64, FeedError> {
        let hour_utc = at.format("%Y-%m-%dT%H:00Z").to_string();
        let filter = format!(
            "{{\"PriceArea\":\"{}\",\"HourUTC\":\"{hour_utc}\"}}",
            self.price_area
        );

        let response: SpotPriceResponse = self
            .http
            .get(&self.base_url)
            .query(&[
                ("offset", "0"),
                ("limit", "1"),
                ("sort", "HourUTC DESC"),
                ("filter", filter.as_str()),
            ])
            .send()?
            .error_for_status()?
            .json()?;

        let record = response
            .records
            .first()
            .ok_or(FeedError::MissingHour(hour_utc))?;

        Ok(record.spot_price_eur * EUR_TO_DKK / 1000.0)
    }
}

#[derive(Debug, Deserialize)]
struct TariffResponse {
    dkk_per_kwh: f64,
}

pub struct RemoteTariffClient {
    url: String,
    http: reqwest::blocking::Client,
}

impl RemoteTariffClient {
    pub fn new(url: &str) -> Result<Self, FeedError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            url: url.to_string(),
            http,
        })
    }
}

impl TariffFeed for RemoteTariffClient {
    fn transport_tariff_dkk_per_kwh(&self, at: NaiveDateTime) -> Result<f64, FeedError> {
        let response: TariffResponse = self
            .http
            .get(&self.url)
            .query(&[("month", at.month().to_string()), ("hour", at.hour().to_string())])
            .send()?
            .error_for_status()?
            .json()?;

        Ok(response.dkk_per_kwh)
    }
}

/// Tariff lookup with the fallback baked in: a remote feed failure or an
/// unconfigured feed both resolve through the hardcoded schedule.
pub struct TariffSource {
    remote: Option<Box<dyn TariffFeed>>,
}

impl TariffSource {
    pub fn new(remote: Option<Box<dyn TariffFeed>>) -> Self {
        Self { remote }
    }

    pub fn fallback_only() -> Self {
        Self { remote: None }
    }

    pub fn transport_tariff(&self, at: NaiveDateTime) -> f64 {
        if let Some(remote) = &self.remote {
            match remote.transport_tariff_dkk_per_kwh(at) {
                Ok(tariff) => return tariff,
                Err(error) => {
                    tracing::debug!(%error, "tariff feed unavailable, using fallback schedule");
                }
            }
        }
        transport_tariff_fallback(at)
    }
}
