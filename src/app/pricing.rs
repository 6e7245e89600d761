//! The price estimator. Walks unpriced hours oldest first, combines the
//! day-ahead spot price with the transport tariff, and persists the VAT
//! inclusive total. A missing spot price stops the walk; the hour stays
//! unpriced until the market data is published.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::adapters::db;
use crate::app::runtime::{PipelineContext, sleep_with_stop};
use crate::app::services::ServiceError;
use crate::domain::session::parse_timestamp;
use crate::domain::tariff::total_price;

const BULK_UPDATE_PAUSE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PriceOutcome {
    Updated { hour_id: i64, price: f64 },
    NothingToPrice,
    SpotUnavailable,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkPriceReport {
    pub updated: usize,
    pub remaining: i64,
}

/// Prices the oldest hour that has a usable amount and no price yet.
pub fn update_one(ctx: &PipelineContext) -> Result<PriceOutcome, ServiceError> {
    let hour = {
        let connection = ctx.lock_connection()?;
        db::next_unpriced_hour(&connection)?
    };
    let Some(hour) = hour else {
        return Ok(PriceOutcome::NothingToPrice);
    };

    let Some(at) = parse_timestamp(&hour.log_timestamp) else {
        tracing::warn!(hour = %hour.log_timestamp, "hour key does not parse, skipping pricing");
        return Ok(PriceOutcome::SpotUnavailable);
    };

    let spot = match ctx.spot_feed.spot_price_dkk_per_kwh(at) {
        Ok(spot) => spot,
        Err(error) => {
            tracing::warn!(hour = %hour.log_timestamp, %error, "spot price unavailable");
            return Ok(PriceOutcome::SpotUnavailable);
        }
    };

    let tariff = ctx.tariff_source.transport_tariff(at);
    let amount = hour.amount.unwrap_or(0.0);
    let price = total_price(spot, tariff, amount);

    {
        let connection = ctx.lock_connection()?;
        db::set_price(&connection, hour.id, price)?;
    }

    tracing::info!(
        hour = %hour.log_timestamp,
        spot,
        tariff,
        amount,
        price,
        "hour priced"
    );

    Ok(PriceOutcome::Updated {
        hour_id: hour.id,
        price,
    })
}

/// Prices hours until none remain, the spot feed runs dry, or the per-run
/// cap is reached. Pauses briefly between rows to stay polite to the feed.
pub fn update_all(ctx: &PipelineContext) -> Result<BulkPriceReport, ServiceError> {
    let mut updated = 0;

    while updated < ctx.settings.max_price_updates as usize {
        match update_one(ctx)? {
            PriceOutcome::Updated { .. } => {
                updated += 1;
                std::thread::sleep(BULK_UPDATE_PAUSE);
            }
            PriceOutcome::NothingToPrice | PriceOutcome::SpotUnavailable => break,
        }
    }

    let remaining = {
        let connection = ctx.lock_connection()?;
        db::count_unpriced_hours(&connection)?
    };

    Ok(BulkPriceReport { updated, remaining })
}

pub fn spawn_price_loop(ctx: Arc<PipelineContext>, stop_flag: Arc<AtomicBool>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        while !stop_flag.load(Ordering::Relaxed) {
            let interval = match update_one(&ctx) {
                Ok(PriceOutcome::Updated { hour_id, price }) => {
                    tracing::debug!(hour_id, price, "price loop updated an hour");
                    ctx.settings.price_interval
                }
                Ok(PriceOutcome::NothingToPrice | PriceOutcome::SpotUnavailable) => {
                    ctx.settings.price_idle_interval
                }
                Err(error) => {
                    tracing::error!(%error, "price loop iteration failed");
                    ctx.settings.price_idle_interval
                }
            };
            sleep_with_stop(interval, &stop_flag);
        }
    })
}
