use chrono::NaiveDateTime;

/// Assumed charger draw when no power readings cover an hour.
pub const FALLBACK_RATE_KW: f64 = 10.5;

/// Disagreement between integrated and SOC-derived energy above this
/// percentage is logged for operator follow-up.
pub const SOC_DISCREPANCY_WARN_PERCENT: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerReading {
    pub at: NaiveDateTime,
    pub kw: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnergySource {
    PowerIntegration,
    AssumedRate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnergyWarning {
    NegativeDurationClamped,
    NegativePowerClamped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HourEnergyResult {
    pub kwh: f64,
    pub source: EnergySource,
    pub warnings: Vec<EnergyWarning>,
}

/// Integrates piecewise-constant power over `[start, stop]`. Each reading
/// holds until the next one; a seed reading taken before `start` is clipped
/// to the window. With no readings at all the assumed-rate fallback applies.
pub fn compute_hour_kwh(
    start: NaiveDateTime,
    stop: NaiveDateTime,
    readings: &[PowerReading],
) -> HourEnergyResult {
    if stop < start {
        return HourEnergyResult {
            kwh: 0.0,
            source: EnergySource::AssumedRate,
            warnings: vec![EnergyWarning::NegativeDurationClamped],
        };
    }

    if readings.is_empty() {
        return HourEnergyResult {
            kwh: duration_hours(start, stop) * FALLBACK_RATE_KW,
            source: EnergySource::AssumedRate,
            warnings: Vec::new(),
        };
    }

    let mut sorted: Vec<PowerReading> = readings.to_vec();
    sorted.sort_by_key(|reading| reading.at);

    let mut total_kwh = 0.0;
    let mut warnings = Vec::new();

    for (index, reading) in sorted.iter().enumerate() {
        if reading.at >= stop {
            break;
        }

        let segment_start = reading.at.max(start);
        let segment_stop = match sorted.get(index + 1) {
            Some(next) => next.at.min(stop),
            None => stop,
        };
        if segment_stop <= segment_start {
            continue;
        }

        let kw = if reading.kw < 0.0 {
            if !warnings.contains(&EnergyWarning::NegativePowerClamped) {
                warnings.push(EnergyWarning::NegativePowerClamped);
            }
            0.0
        } else {
            reading.kw
        };

        total_kwh += kw * duration_hours(segment_start, segment_stop);
    }

    HourEnergyResult {
        kwh: total_kwh.max(0.0),
        source: EnergySource::PowerIntegration,
        warnings,
    }
}

pub fn duration_hours(start: NaiveDateTime, stop: NaiveDateTime) -> f64 {
    (stop - start).num_seconds() as f64 / 3600.0
}

/// Energy implied by the SOC delta over an hour, given usable capacity.
pub fn soc_energy_kwh(soc_start: i64, soc_end: i64, capacity_kwh: f64) -> f64 {
    (soc_end - soc_start) as f64 / 100.0 * capacity_kwh
}

/// Relative disagreement between the stored amount and the SOC-derived
/// estimate, in percent of the stored amount.
pub fn soc_discrepancy_percent(amount_kwh: f64, soc_kwh: f64) -> f64 {
    (amount_kwh - soc_kwh).abs() / amount_kwh.max(0.0001) * 100.0
}
