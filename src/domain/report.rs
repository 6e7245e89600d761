//! Derives reporting aggregates from persisted charge hours. Sessions are
//! not stored; a session is a run of hour rows sharing one odometer value,
//! rebuilt on demand.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::domain::models::ChargeHourRecord;
use crate::domain::session::parse_timestamp;

const EFFICIENCY_MIN_KM: f64 = 150.0;
const EFFICIENCY_MAX_KM: f64 = 550.0;
const EFFICIENCY_MIN_SOC_GAIN: f64 = 20.0;

#[derive(Debug, Clone, PartialEq)]
pub struct ChargeSession {
    pub mileage: Option<i64>,
    pub rows: Vec<ChargeHourRecord>,
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub amount: f64,
    pub price: f64,
    pub position: &'static str,
    pub any_away: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DailyTotal {
    pub kwh: f64,
    pub dkk: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EfficiencyEntry {
    pub estimated_efficiency: Option<f64>,
    pub actual_efficiency: Option<f64>,
    pub soc_gain: f64,
    pub stop_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FooterMetrics {
    pub total_mileage: i64,
    pub total_amount: f64,
    pub estimated_km_per_kwh: f64,
    pub actual_km_per_kwh: f64,
}

/// Partitions hour rows into sessions keyed by mileage, each with
/// min-start/max-stop bounds, sorted by session end ascending.
pub fn group_sessions_by_mileage(rows: &[ChargeHourRecord]) -> Vec<ChargeSession> {
    let mut by_mileage: BTreeMap<Option<i64>, ChargeSession> = BTreeMap::new();

    for row in rows {
        let session = by_mileage
            .entry(row.mileage)
            .or_insert_with(|| ChargeSession {
                mileage: row.mileage,
                rows: Vec::new(),
                start: None,
                end: None,
            });

        let row_start = row.start_at.clone().unwrap_or_else(|| row.log_timestamp.clone());
        let row_stop = row.stop_at.clone().unwrap_or_else(|| row.log_timestamp.clone());

        if session.start.as_deref().is_none_or(|start| row_start.as_str() < start) {
            session.start = Some(row_start);
        }
        if session.end.as_deref().is_none_or(|end| row_stop.as_str() > end) {
            session.end = Some(row_stop);
        }
        session.rows.push(row.clone());
    }

    let mut sessions: Vec<ChargeSession> = by_mileage.into_values().collect();
    // Timestamps are fixed-width "%Y-%m-%d %H:%M:%S"; string order is time order.
    sessions.sort_by(|a, b| {
        let a_key = a.end.as_deref().or(a.start.as_deref()).unwrap_or("");
        let b_key = b.end.as_deref().or(b.start.as_deref()).unwrap_or("");
        a_key.cmp(b_key)
    });
    sessions
}

/// Sums a session's energy and price. Any away row zeroes the price: away
/// charging is not billed to the household.
pub fn session_summary(rows: &[ChargeHourRecord]) -> SessionSummary {
    let amount = round2(rows.iter().filter_map(|row| row.amount).sum());
    let any_away = rows
        .iter()
        .any(|row| row.position.as_deref() != Some("home"));
    let price = if any_away {
        0.0
    } else {
        round2(rows.iter().filter_map(|row| row.price).sum())
    };

    SessionSummary {
        amount,
        price,
        position: if any_away { "away" } else { "home" },
        any_away,
    }
}

/// Per-day energy and cost sums over home rows, keyed by the stop date.
pub fn daily_totals_home(rows: &[ChargeHourRecord]) -> BTreeMap<NaiveDate, DailyTotal> {
    let mut daily = BTreeMap::new();

    for row in rows {
        if row.position.as_deref() != Some("home") {
            continue;
        }
        let Some(date) = row
            .stop_at
            .as_deref()
            .and_then(parse_timestamp)
            .map(|at| at.date())
        else {
            continue;
        };

        let total: &mut DailyTotal = daily.entry(date).or_default();
        total.kwh += row.amount.unwrap_or(0.0);
        total.dkk += row.price.unwrap_or(0.0);
    }

    daily
}

/// Per-session efficiency normalized to a full 0-100% charge:
/// estimated from the car's own range gain, actual from the odometer delta
/// to the previous session. Either is omitted when its inputs are missing
/// or non-positive.
pub fn normalized_efficiency(sessions: &[ChargeSession]) -> Vec<EfficiencyEntry> {
    let mut entries = Vec::with_capacity(sessions.len());
    let mut previous_mileage: Option<i64> = None;

    for session in sessions {
        let soc_values: Vec<i64> = session.rows.iter().filter_map(|row| row.soc).collect();
        let soc_gain = match (soc_values.iter().max(), soc_values.iter().min()) {
            (Some(max), Some(min)) => (max - min) as f64,
            _ => 0.0,
        };

        let charged_range = session.rows.iter().filter_map(|row| row.charged_range).max();
        let start_range = session
            .rows
            .iter()
            .filter_map(|row| row.start_range)
            .filter(|value| *value >= 0)
            .min();
        let range_gain = match (charged_range, start_range) {
            (Some(charged), Some(start)) => (charged - start) as f64,
            _ => 0.0,
        };

        let estimated_efficiency = (soc_gain > 0.0 && range_gain > 0.0)
            .then(|| round2(range_gain / soc_gain * 100.0));

        let actual_efficiency = match (previous_mileage, session.mileage) {
            (Some(previous), Some(current)) if soc_gain > 0.0 && current > previous => {
                Some(round2((current - previous) as f64 / soc_gain * 100.0))
            }
            _ => None,
        };

        entries.push(EfficiencyEntry {
            estimated_efficiency,
            actual_efficiency,
            soc_gain,
            stop_at: session.end.clone(),
        });

        if session.mileage.is_some() {
            previous_mileage = session.mileage;
        }
    }

    entries
}

/// Drops entries outside the plausible efficiency band or with too small a
/// SOC gain to be meaningful.
pub fn filter_efficiency_data(entries: &[EfficiencyEntry]) -> Vec<EfficiencyEntry> {
    entries
        .iter()
        .filter(|entry| {
            entry.soc_gain >= EFFICIENCY_MIN_SOC_GAIN
                && entry.estimated_efficiency.is_some_and(|value| {
                    (EFFICIENCY_MIN_KM..=EFFICIENCY_MAX_KM).contains(&value)
                })
        })
        .cloned()
        .collect()
}

pub fn footer_metrics(sessions: &[ChargeSession]) -> FooterMetrics {
    let mileages: Vec<i64> = sessions.iter().filter_map(|session| session.mileage).collect();
    let total_mileage = match (mileages.iter().max(), mileages.iter().min()) {
        (Some(max), Some(min)) => max - min,
        _ => 0,
    };

    let mut total_amount = 0.0;
    let mut per_session_efficiency = Vec::new();

    for session in sessions {
        let amount: f64 = session.rows.iter().filter_map(|row| row.amount).sum();

        let charged_range = session.rows.iter().filter_map(|row| row.charged_range).max();
        let start_range = session.rows.iter().filter_map(|row| row.start_range).min();
        let range_diff = match (charged_range, start_range) {
            (Some(charged), Some(start)) => (charged - start) as f64,
            _ => 0.0,
        };

        if amount > 0.0 && range_diff > 0.0 {
            per_session_efficiency.push(range_diff / amount);
        }
        total_amount += amount;
    }

    let estimated = if per_session_efficiency.is_empty() {
        0.0
    } else {
        round2(per_session_efficiency.iter().sum::<f64>() / per_session_efficiency.len() as f64)
    };
    let actual = if total_amount > 0.0 {
        round2(total_mileage as f64 / total_amount)
    } else {
        0.0
    };

    FooterMetrics {
        total_mileage,
        total_amount: round2(total_amount),
        estimated_km_per_kwh: estimated,
        actual_km_per_kwh: actual,
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
