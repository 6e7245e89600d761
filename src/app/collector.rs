//! The write path of the pipeline: turning raw telemetry into charge events
//! (`find_charges`), charge events into hour rows (`process_event`), and
//! hour rows into energy amounts (`compute_amount`).

use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde_json::Value;
use thiserror::Error;

use crate::adapters::db::{self, DbError};
use crate::domain::energy::{
    self, EnergySource, EnergyWarning, HourEnergyResult, PowerReading,
    SOC_DISCREPANCY_WARN_PERCENT,
};
use crate::domain::models::{ChargeEventRecord, ChargeHourRecord, EventKind, NewChargeEventRecord};
use crate::domain::session::{
    SessionState, classify_position, format_timestamp, hour_bucket, hour_close_key, hour_row_key,
    parse_timestamp,
};
use crate::domain::telemetry::{
    charging_state_event, extract_f64_token, extract_i64_token, extract_mileage, extract_position,
};
use crate::domain::vehicle_event::VehicleEvent;

/// Upper bound on events materialized per finder pass; the scan resumes
/// from the newest stored event next time.
const FINDER_BATCH_CAP: usize = 500;

const EPOCH_TIMESTAMP: &str = "1970-01-01 00:00:00";

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("database operation failed: {0}")]
    Db(#[from] DbError),
    #[error("unparseable event timestamp: {0}")]
    BadTimestamp(String),
}

#[derive(Debug, Clone)]
pub struct HomePosition {
    pub latitude: String,
    pub longitude: String,
}

/// Stores an incoming cloud event payload into the raw log, plus derived
/// telemetry lines when the event is charging related. Returns whether the
/// event fed the charge pipeline.
pub fn ingest_event(
    connection: &Connection,
    received_at: NaiveDateTime,
    payload: &Value,
) -> Result<bool, DbError> {
    let timestamp = format_timestamp(received_at);
    db::insert_raw_log(connection, &timestamp, &payload.to_string())?;

    let event = VehicleEvent::from_payload(payload);
    if !event.is_charging_related() {
        tracing::debug!(
            event_type = event.event_type.as_deref().unwrap_or("unknown"),
            name = event.name.as_deref().unwrap_or("unknown"),
            "ignoring non-charging event"
        );
        return Ok(false);
    }

    let soc_text = event
        .soc
        .map(format_number)
        .unwrap_or_else(|| "None".to_string());
    db::insert_raw_log(
        connection,
        &timestamp,
        &format!("Charging event detected. SOC={soc_text}"),
    )?;

    if let Some(mileage) = event.mileage {
        db::insert_raw_log(
            connection,
            &timestamp,
            &format!("Vehicle health fetched, mileage: {mileage}"),
        )?;
    }

    if let (Some(latitude), Some(longitude)) = (&event.latitude, &event.longitude) {
        db::insert_raw_log(
            connection,
            &timestamp,
            &format!("Vehicle positions fetched: lat: {latitude}, lng: {longitude}"),
        )?;
    }

    let mut parts = Vec::new();
    if let Some(phase) = event.charging_phase {
        parts.push(format!("state={}", phase.marker()));
    }
    if let Some(kw) = event.charge_power_kw {
        parts.push(format!("charge_power_in_kw={}", format_number(kw)));
    }
    if let Some(soc) = event.soc {
        parts.push(format!("state_of_charge_in_percent={}", format_number(soc)));
    }
    if let Some(range) = event.charged_range {
        parts.push(format!("charged_range={range}"));
    }
    if let Some(soc) = event.soc {
        parts.push(format!("soc={}", format_number(soc)));
    }
    if !parts.is_empty() {
        db::insert_raw_log(
            connection,
            &timestamp,
            &format!("Charging data fetched: {}", parts.join(", ")),
        )?;
    }

    Ok(true)
}

/// Scans the raw log for charging-state transitions newer than the latest
/// stored charge event and materializes them as events, enriched with the
/// freshest position and mileage lines of the same hour.
pub fn find_charges(connection: &Connection) -> Result<usize, DbError> {
    let mut last = db::latest_event_timestamp(connection)?
        .unwrap_or_else(|| EPOCH_TIMESTAMP.to_string());
    let mut inserted = 0;

    while let Some(row) = db::next_charging_state_log_after(connection, &last)? {
        last = row.log_timestamp.clone();

        let Some(kind) = charging_state_event(&row.log_message) else {
            continue;
        };

        let hour = hour_bucket(&row.log_timestamp);
        let (pos_lat, pos_lon) = match &hour {
            Some(hour) => db::last_position_log_in_hour(connection, hour)?
                .and_then(|log| extract_position(&log.log_message))
                .map(|(lat, lon)| (Some(lat), Some(lon)))
                .unwrap_or((None, None)),
            None => (None, None),
        };
        let mileage = match &hour {
            Some(hour) => db::last_mileage_log_in_hour(connection, hour)?
                .and_then(|log| extract_mileage(&log.log_message)),
            None => None,
        };

        let new_event = NewChargeEventRecord {
            event_timestamp: row.log_timestamp.clone(),
            pos_lat,
            pos_lon,
            charged_range: extract_i64_token(&row.log_message, "charged_range"),
            mileage,
            event_type: kind.as_str().to_string(),
            soc: extract_i64_token(&row.log_message, "soc"),
        };
        let event_id = db::insert_charge_event(connection, &new_event)?;

        tracing::info!(
            event_id,
            event_type = new_event.event_type,
            event_timestamp = %new_event.event_timestamp,
            "charge event materialized"
        );

        inserted += 1;
        if inserted >= FINDER_BATCH_CAP {
            tracing::warn!(cap = FINDER_BATCH_CAP, "finder batch cap reached");
            break;
        }
    }

    Ok(inserted)
}

/// Applies one charge event to its hour row and links the event. The state
/// argument carries the open-charge tracking across calls.
pub fn process_event(
    connection: &Connection,
    state: &mut SessionState,
    home: &HomePosition,
    event: &ChargeEventRecord,
) -> Result<(), CollectorError> {
    let hour = hour_bucket(&event.event_timestamp)
        .ok_or_else(|| CollectorError::BadTimestamp(event.event_timestamp.clone()))?;
    let hour_key = hour_row_key(&hour);

    let hour_id = db::locate_charge_hour(connection, &hour_key)?;
    let position = classify_position(
        &home.latitude,
        &home.longitude,
        event.pos_lat.as_deref(),
        event.pos_lon.as_deref(),
    );

    // Carry-over: a charge that ran past an hour boundary closes the old
    // hour at :59:59 and continues in a fresh row opened at :00:00.
    if state.still_going && state.last_hour.as_deref() != Some(hour.as_str()) {
        if let Some(last_hour) = state.last_hour.clone() {
            db::close_charge_hour(connection, &hour_row_key(&last_hour), &hour_close_key(&last_hour))?;
            tracing::info!(
                closed_hour = %last_hour,
                new_hour = %hour,
                "charge carried over an hour boundary"
            );
        }
        if !db::is_hour_started(connection, &hour_key)? {
            db::start_charge_hour(connection, &hour_key, &hour_key)?;
        }
    }

    match EventKind::parse(&event.event_type) {
        Some(EventKind::Start) => {
            if !db::is_hour_started(connection, &hour_key)? {
                db::start_charge_hour(connection, &hour_key, &event.event_timestamp)?;
            }
            db::apply_event_snapshot(
                connection,
                hour_id,
                position,
                event.charged_range,
                event.mileage,
                event.soc,
            )?;
            state.still_going = true;
        }
        Some(EventKind::Stop) => {
            if !db::is_hour_started(connection, &hour_key)? {
                tracing::warn!(hour = %hour, "stop event without a matching start, backfilling");
                db::start_charge_hour(connection, &hour_key, &hour_key)?;
            }
            let updated = db::apply_stop_event(
                connection,
                hour_id,
                position,
                event.charged_range,
                event.mileage,
                event.soc,
                &event.event_timestamp,
            )?;
            if updated == 0 {
                tracing::debug!(hour = %hour, "hour already closed, duplicate stop ignored");
            }
            state.still_going = false;
        }
        None => {
            db::apply_event_snapshot(
                connection,
                hour_id,
                position,
                event.charged_range,
                event.mileage,
                event.soc,
            )?;
        }
    }

    state.last_hour = Some(hour);
    db::link_event(connection, event.id, hour_id)?;

    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub enum AmountOutcome {
    Computed(HourEnergyResult),
    MissingBounds,
}

/// Estimates an hour's energy from power readings in the raw log, falling
/// back to the flat assumed rate. Does not persist; callers decide.
pub fn compute_amount(
    connection: &Connection,
    hour: &ChargeHourRecord,
    battery_capacity_kwh: Option<f64>,
) -> Result<AmountOutcome, DbError> {
    let (Some(start_text), Some(stop_text)) = (hour.start_at.as_deref(), hour.stop_at.as_deref())
    else {
        return Ok(AmountOutcome::MissingBounds);
    };
    let (Some(start), Some(stop)) = (parse_timestamp(start_text), parse_timestamp(stop_text))
    else {
        return Ok(AmountOutcome::MissingBounds);
    };

    let mut readings = Vec::new();
    if let Some(seed) = db::last_power_reading_at_or_before(connection, start_text)?
        && let Some(reading) = to_power_reading(&seed.log_timestamp, &seed.log_message)
    {
        readings.push(reading);
    }
    for row in db::power_readings_between(connection, start_text, stop_text)? {
        if let Some(reading) = to_power_reading(&row.log_timestamp, &row.log_message) {
            readings.push(reading);
        }
    }

    let result = energy::compute_hour_kwh(start, stop, &readings);

    for warning in &result.warnings {
        match warning {
            EnergyWarning::NegativeDurationClamped => {
                tracing::warn!(
                    hour = %hour.log_timestamp,
                    start = %start_text,
                    stop = %stop_text,
                    "stop precedes start, clamping amount to zero"
                );
            }
            EnergyWarning::NegativePowerClamped => {
                tracing::warn!(hour = %hour.log_timestamp, "negative power reading clamped");
            }
        }
    }

    if result.source == EnergySource::AssumedRate && result.warnings.is_empty() {
        tracing::info!(
            hour = %hour.log_timestamp,
            kwh = result.kwh,
            "no power readings in window, using assumed-rate fallback"
        );
    }

    if let Some(capacity) = battery_capacity_kwh {
        verify_against_soc(connection, hour, start_text, stop_text, result.kwh, capacity)?;
    }

    Ok(AmountOutcome::Computed(result))
}

// Observability only: the SOC cross-check never changes the stored amount.
fn verify_against_soc(
    connection: &Connection,
    hour: &ChargeHourRecord,
    start_text: &str,
    stop_text: &str,
    amount_kwh: f64,
    capacity_kwh: f64,
) -> Result<(), DbError> {
    let soc_at = |timestamp: &str| -> Result<Option<i64>, DbError> {
        Ok(db::last_soc_reading_at_or_before(connection, timestamp)?
            .and_then(|row| extract_i64_token(&row.log_message, "state_of_charge_in_percent")))
    };

    if let (Some(soc_start), Some(soc_end)) = (soc_at(start_text)?, soc_at(stop_text)?) {
        let soc_kwh = energy::soc_energy_kwh(soc_start, soc_end, capacity_kwh);
        let discrepancy = energy::soc_discrepancy_percent(amount_kwh, soc_kwh);
        tracing::info!(
            hour = %hour.log_timestamp,
            amount_kwh,
            soc_kwh,
            discrepancy_percent = discrepancy,
            "soc cross-check"
        );
        if discrepancy > SOC_DISCREPANCY_WARN_PERCENT {
            tracing::warn!(
                hour = %hour.log_timestamp,
                amount_kwh,
                soc_kwh,
                discrepancy_percent = discrepancy,
                "soc-derived energy disagrees with integrated amount"
            );
        }
    }

    Ok(())
}

/// Most recent `charged_range=` value at or before the hour's start, used
/// to backfill `start_range`.
pub fn lookup_start_range(
    connection: &Connection,
    hour: &ChargeHourRecord,
) -> Result<Option<i64>, DbError> {
    let reference = hour.start_at.as_deref().unwrap_or(&hour.log_timestamp);
    Ok(db::last_range_reading_at_or_before(connection, reference)?
        .and_then(|row| extract_i64_token(&row.log_message, "charged_range")))
}

fn to_power_reading(timestamp: &str, message: &str) -> Option<PowerReading> {
    let at = parse_timestamp(timestamp)?;
    let kw = extract_f64_token(message, "charge_power_in_kw")?;
    Some(PowerReading { at, kw })
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDateTime;
    use serde_json::json;

    use super::{
        AmountOutcome, HomePosition, compute_amount, find_charges, ingest_event, lookup_start_range,
        process_event,
    };
    use crate::adapters::db;
    use crate::domain::energy::EnergySource;
    use crate::domain::models::{ChargeEventRecord, NewChargeEventRecord};
    use crate::domain::session::SessionState;
    use crate::test_support::open_test_connection;

    fn home() -> HomePosition {
        HomePosition {
            latitude: "55.547".to_string(),
            longitude: "11.222".to_string(),
        }
    }

    fn at(value: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").expect("test timestamp parses")
    }

    fn event(id: i64, timestamp: &str, event_type: &str) -> ChargeEventRecord {
        ChargeEventRecord {
            id,
            event_timestamp: timestamp.to_string(),
            pos_lat: Some("55.54789".to_string()),
            pos_lon: Some("11.22201".to_string()),
            charged_range: Some(210),
            mileage: Some(48233),
            event_type: event_type.to_string(),
            soc: Some(55),
            charge_id: None,
        }
    }

    fn stored_event(connection: &rusqlite::Connection, timestamp: &str, event_type: &str) -> ChargeEventRecord {
        let id = db::insert_charge_event(
            connection,
            &NewChargeEventRecord {
                event_timestamp: timestamp.to_string(),
                pos_lat: Some("55.54789".to_string()),
                pos_lon: Some("11.22201".to_string()),
                charged_range: Some(210),
                mileage: Some(48233),
                event_type: event_type.to_string(),
                soc: Some(55),
            },
        )
        .expect("insert should succeed");
        let mut record = event(id, timestamp, event_type);
        record.id = id;
        record
    }

    #[test]
    fn start_event_opens_the_hour_at_the_event_timestamp() {
        let connection = open_test_connection("start_event_opens_the_hour");
        let mut state = SessionState::new();

        let start = stored_event(&connection, "2025-03-01 10:50:00", "start");
        process_event(&connection, &mut state, &home(), &start).expect("processing should succeed");

        let hour = db::get_charge_hour_by_key(&connection, "2025-03-01 10:00:00")
            .expect("query should succeed")
            .expect("hour should exist");
        assert_eq!(hour.start_at.as_deref(), Some("2025-03-01 10:50:00"));
        assert_eq!(hour.stop_at, None);
        assert_eq!(hour.position.as_deref(), Some("home"));
        assert!(state.still_going);
        assert_eq!(state.last_hour.as_deref(), Some("2025-03-01 10"));

        let linked: Option<i64> = connection
            .query_row(
                "SELECT charge_id FROM charge_events WHERE id = ?1",
                [start.id],
                |row| row.get(0),
            )
            .expect("link should be readable");
        assert_eq!(linked, Some(hour.id));
    }

    #[test]
    fn carry_over_closes_old_hour_and_opens_new_one() {
        let connection = open_test_connection("carry_over_closes_old_hour");
        let mut state = SessionState::new();

        let start = stored_event(&connection, "2025-03-01 10:50:00", "start");
        process_event(&connection, &mut state, &home(), &start).expect("processing should succeed");

        let next = stored_event(&connection, "2025-03-01 11:05:00", "stop");
        process_event(&connection, &mut state, &home(), &next).expect("processing should succeed");

        let old_hour = db::get_charge_hour_by_key(&connection, "2025-03-01 10:00:00")
            .expect("query should succeed")
            .expect("old hour should exist");
        assert_eq!(old_hour.stop_at.as_deref(), Some("2025-03-01 10:59:59"));

        let new_hour = db::get_charge_hour_by_key(&connection, "2025-03-01 11:00:00")
            .expect("query should succeed")
            .expect("new hour should exist");
        assert_eq!(new_hour.start_at.as_deref(), Some("2025-03-01 11:00:00"));
        assert_eq!(new_hour.stop_at.as_deref(), Some("2025-03-01 11:05:00"));
        assert!(!state.still_going);
    }

    #[test]
    fn stop_without_start_backfills_top_of_hour() {
        let connection = open_test_connection("stop_without_start_backfills");
        let mut state = SessionState::new();

        let stop = stored_event(&connection, "2025-03-01 10:40:00", "stop");
        process_event(&connection, &mut state, &home(), &stop).expect("processing should succeed");

        let hour = db::get_charge_hour_by_key(&connection, "2025-03-01 10:00:00")
            .expect("query should succeed")
            .expect("hour should exist");
        assert_eq!(hour.start_at.as_deref(), Some("2025-03-01 10:00:00"));
        assert_eq!(hour.stop_at.as_deref(), Some("2025-03-01 10:40:00"));
    }

    #[test]
    fn away_position_is_classified_from_event_coordinates() {
        let connection = open_test_connection("away_position_is_classified");
        let mut state = SessionState::new();

        let mut start = stored_event(&connection, "2025-03-01 10:50:00", "start");
        start.pos_lat = Some("56.100".to_string());
        process_event(&connection, &mut state, &home(), &start).expect("processing should succeed");

        let hour = db::get_charge_hour_by_key(&connection, "2025-03-01 10:00:00")
            .expect("query should succeed")
            .expect("hour should exist");
        assert_eq!(hour.position.as_deref(), Some("away"));
    }

    #[test]
    fn finder_materializes_events_from_charging_state_lines() {
        let connection = open_test_connection("finder_materializes_events");

        db::insert_raw_log(
            &connection,
            "2025-03-01 10:45:00",
            "Vehicle positions fetched: lat: 55.54789, lng: 11.22201",
        )
        .expect("insert should succeed");
        db::insert_raw_log(
            &connection,
            "2025-03-01 10:46:00",
            "Vehicle health fetched, mileage: 48233",
        )
        .expect("insert should succeed");
        db::insert_raw_log(
            &connection,
            "2025-03-01 10:50:00",
            "Charging data fetched: state=ChargingState.CHARGING, charge_power_in_kw=7.2, state_of_charge_in_percent=50, charged_range=180, soc=50",
        )
        .expect("insert should succeed");
        db::insert_raw_log(
            &connection,
            "2025-03-01 11:40:00",
            "Charging data fetched: state=ChargingState.READY_FOR_CHARGING, charge_power_in_kw=0, state_of_charge_in_percent=80, charged_range=250, soc=80",
        )
        .expect("insert should succeed");

        let inserted = find_charges(&connection).expect("finder should succeed");
        assert_eq!(inserted, 2);

        let first = db::next_unlinked_event(&connection)
            .expect("query should succeed")
            .expect("event should exist");
        assert_eq!(first.event_type, "start");
        assert_eq!(first.event_timestamp, "2025-03-01 10:50:00");
        assert_eq!(first.pos_lat.as_deref(), Some("55.54789"));
        assert_eq!(first.mileage, Some(48233));
        assert_eq!(first.charged_range, Some(180));
        assert_eq!(first.soc, Some(50));

        // A second pass resumes from the newest event and finds nothing new.
        let inserted = find_charges(&connection).expect("finder should succeed");
        assert_eq!(inserted, 0);
    }

    #[test]
    fn amount_uses_power_integration_when_readings_exist() {
        let connection = open_test_connection("amount_uses_power_integration");

        let hour_id = db::locate_charge_hour(&connection, "2025-03-01 10:00:00")
            .expect("locate should succeed");
        db::start_charge_hour(&connection, "2025-03-01 10:00:00", "2025-03-01 10:00:00")
            .expect("start should succeed");
        db::close_charge_hour(&connection, "2025-03-01 10:00:00", "2025-03-01 11:00:00")
            .expect("close should succeed");

        db::insert_raw_log(
            &connection,
            "2025-03-01 10:00:00",
            "Charging data fetched: charge_power_in_kw=5.0",
        )
        .expect("insert should succeed");
        db::insert_raw_log(
            &connection,
            "2025-03-01 10:30:00",
            "Charging data fetched: charge_power_in_kw=15.0",
        )
        .expect("insert should succeed");

        let hour = db::get_charge_hour(&connection, hour_id)
            .expect("query should succeed")
            .expect("hour should exist");
        let outcome = compute_amount(&connection, &hour, None).expect("compute should succeed");

        let AmountOutcome::Computed(result) = outcome else {
            panic!("expected a computed amount");
        };
        assert_eq!(result.source, EnergySource::PowerIntegration);
        assert!((result.kwh - 10.0).abs() < 1e-9);
    }

    #[test]
    fn amount_falls_back_to_assumed_rate_without_readings() {
        let connection = open_test_connection("amount_falls_back_to_assumed_rate");

        let hour_id = db::locate_charge_hour(&connection, "2025-03-01 10:00:00")
            .expect("locate should succeed");
        db::start_charge_hour(&connection, "2025-03-01 10:00:00", "2025-03-01 10:00:00")
            .expect("start should succeed");
        db::close_charge_hour(&connection, "2025-03-01 10:00:00", "2025-03-01 11:00:00")
            .expect("close should succeed");

        let hour = db::get_charge_hour(&connection, hour_id)
            .expect("query should succeed")
            .expect("hour should exist");
        let outcome = compute_amount(&connection, &hour, None).expect("compute should succeed");

        let AmountOutcome::Computed(result) = outcome else {
            panic!("expected a computed amount");
        };
        assert_eq!(result.source, EnergySource::AssumedRate);
        assert!((result.kwh - 10.5).abs() < 1e-9);
    }

    #[test]
    fn amount_is_missing_bounds_without_stop() {
        let connection = open_test_connection("amount_is_missing_bounds_without_stop");

        let hour_id = db::locate_charge_hour(&connection, "2025-03-01 10:00:00")
            .expect("locate should succeed");
        db::start_charge_hour(&connection, "2025-03-01 10:00:00", "2025-03-01 10:00:00")
            .expect("start should succeed");

        let hour = db::get_charge_hour(&connection, hour_id)
            .expect("query should succeed")
            .expect("hour should exist");
        let outcome = compute_amount(&connection, &hour, None).expect("compute should succeed");

        assert_eq!(outcome, AmountOutcome::MissingBounds);
    }

    #[test]
    fn start_range_comes_from_latest_prior_range_reading() {
        let connection = open_test_connection("start_range_from_prior_reading");

        let hour_id = db::locate_charge_hour(&connection, "2025-03-01 10:00:00")
            .expect("locate should succeed");
        db::start_charge_hour(&connection, "2025-03-01 10:00:00", "2025-03-01 10:05:00")
            .expect("start should succeed");

        db::insert_raw_log(
            &connection,
            "2025-03-01 09:30:00",
            "Charging data fetched: charged_range=170, soc=45",
        )
        .expect("insert should succeed");
        db::insert_raw_log(
            &connection,
            "2025-03-01 10:04:00",
            "Charging data fetched: charged_range=175, soc=46",
        )
        .expect("insert should succeed");
        db::insert_raw_log(
            &connection,
            "2025-03-01 10:30:00",
            "Charging data fetched: charged_range=200, soc=60",
        )
        .expect("insert should succeed");

        let hour = db::get_charge_hour(&connection, hour_id)
            .expect("query should succeed")
            .expect("hour should exist");
        let range = lookup_start_range(&connection, &hour).expect("lookup should succeed");

        assert_eq!(range, Some(175));
    }

    #[test]
    fn ingest_writes_raw_payload_and_derived_lines() {
        let connection = open_test_connection("ingest_writes_raw_payload");

        let fed = ingest_event(
            &connection,
            at("2025-03-01 10:50:00"),
            &json!({
                "event_type": "service-event",
                "topic": "CHARGING",
                "data": {
                    "state": "Charging",
                    "charge_power_in_kw": 7.2,
                    "soc": 55,
                    "charged_range": 210,
                    "mileage": 48233,
                    "latitude": "55.54789",
                    "longitude": "11.22201",
                },
            }),
        )
        .expect("ingest should succeed");
        assert!(fed);

        let count = db::count_raw_logs(&connection).expect("count should work");
        assert_eq!(count, 5);

        let marker = db::next_charging_state_log_after(&connection, "2025-03-01 00:00:00")
            .expect("query should succeed")
            .expect("charging line should exist");
        assert!(marker.log_message.contains("state=ChargingState.CHARGING"));
        assert!(marker.log_message.contains("charge_power_in_kw=7.2"));
        assert!(marker.log_message.contains("charged_range=210"));
        assert!(marker.log_message.contains("soc=55"));
    }

    #[test]
    fn ingest_ignores_unrelated_events() {
        let connection = open_test_connection("ingest_ignores_unrelated_events");

        let fed = ingest_event(
            &connection,
            at("2025-03-01 10:50:00"),
            &json!({ "event_type": "service-event", "topic": "ODOMETER" }),
        )
        .expect("ingest should succeed");

        assert!(!fed);
        assert_eq!(db::count_raw_logs(&connection).expect("count should work"), 1);
    }
}
