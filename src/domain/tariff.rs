use chrono::{Datelike, NaiveDateTime, Timelike};

pub const VAT_MULTIPLIER: f64 = 1.25;

/// Hardcoded transport-tariff schedule in DKK/kWh, used whenever the remote
/// tariff feed is unavailable. Six buckets: winter/summer by night, day and
/// peak hours. The values are billing-grade and must not be rounded.
pub fn transport_tariff_fallback(at: NaiveDateTime) -> f64 {
    let winter = matches!(at.month(), 1..=3 | 10..=12);
    match (winter, at.hour()) {
        (_, 0..=5) => 0.1331,
        (true, 6..=16) => 0.3992,
        (true, 17..=20) => 1.1977,
        (true, _) => 0.3992,
        (false, 6..=16) => 0.1996,
        (false, 17..=20) => 0.5190,
        (false, _) => 0.1996,
    }
}

/// Total cost of an hour: spot price plus transport tariff, VAT on top,
/// scaled by the energy drawn.
pub fn total_price(spot_dkk_per_kwh: f64, tariff_dkk_per_kwh: f64, amount_kwh: f64) -> f64 {
    (spot_dkk_per_kwh + tariff_dkk_per_kwh) * VAT_MULTIPLIER * amount_kwh
}
