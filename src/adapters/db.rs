use rusqlite::{Connection, Row, params};
use thiserror::Error;

use crate::domain::models::{ChargeEventRecord, ChargeHourRecord, NewChargeEventRecord, RawLogRecord};
use crate::domain::telemetry::{CHARGING_DATA_PREFIX, POSITION_PREFIX};

pub const LATEST_SCHEMA_VERSION: u32 = 1;

const MIGRATIONS: &[(u32, &str)] = &[(
    1,
    r#"
CREATE TABLE IF NOT EXISTS rawlogs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    log_timestamp TEXT NOT NULL,
    log_message TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_rawlogs_log_timestamp
ON rawlogs (log_timestamp);

CREATE TABLE IF NOT EXISTS charge_hours (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    log_timestamp TEXT NOT NULL UNIQUE,
    start_at TEXT,
    stop_at TEXT,
    position TEXT,
    charged_range INTEGER,
    start_range INTEGER,
    mileage INTEGER,
    soc INTEGER,
    amount REAL,
    price REAL
);

CREATE TABLE IF NOT EXISTS charge_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_timestamp TEXT NOT NULL,
    pos_lat TEXT,
    pos_lon TEXT,
    charged_range INTEGER,
    mileage INTEGER,
    event_type TEXT NOT NULL,
    soc INTEGER,
    charge_id INTEGER REFERENCES charge_hours (id)
);

CREATE INDEX IF NOT EXISTS idx_charge_events_unlinked
ON charge_events (charge_id, event_timestamp);
"#,
)];

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database operation failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("unsupported schema version {current}; latest supported is {latest}")]
    UnsupportedSchemaVersion { current: u32, latest: u32 },
}

pub fn open_connection(path: &str) -> Result<Connection, DbError> {
    Connection::open(path).map_err(DbError::from)
}

pub fn run_migrations(connection: &mut Connection) -> Result<(), DbError> {
    let current_version = schema_version(connection)?;

    if current_version > LATEST_SCHEMA_VERSION {
        return Err(DbError::UnsupportedSchemaVersion {
            current: current_version,
            latest: LATEST_SCHEMA_VERSION,
        });
    }

    let transaction = connection.transaction()?;

    for (version, sql) in MIGRATIONS {
        if *version > current_version {
            transaction.execute_batch(sql)?;
            transaction.pragma_update(None, "user_version", version)?;
        }
    }

    transaction.commit()?;

    Ok(())
}

pub fn schema_version(connection: &Connection) -> Result<u32, DbError> {
    let version = connection.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

// ---- rawlogs ----

pub fn insert_raw_log(
    connection: &Connection,
    log_timestamp: &str,
    log_message: &str,
) -> Result<i64, DbError> {
    connection.execute(
        "INSERT INTO rawlogs (log_timestamp, log_message) VALUES (?1, ?2)",
        params![log_timestamp, log_message],
    )?;
    Ok(connection.last_insert_rowid())
}

pub fn count_raw_logs(connection: &Connection) -> Result<i64, DbError> {
    let count = connection.query_row("SELECT COUNT(*) FROM rawlogs", [], |row| row.get(0))?;
    Ok(count)
}

pub fn latest_raw_log_timestamp(connection: &Connection) -> Result<Option<String>, DbError> {
    let latest = connection.query_row("SELECT MAX(log_timestamp) FROM rawlogs", [], |row| {
        row.get(0)
    })?;
    Ok(latest)
}

fn first_raw_log(
    connection: &Connection,
    sql: &str,
    parameters: &[&dyn rusqlite::ToSql],
) -> Result<Option<RawLogRecord>, DbError> {
    let mut statement = connection.prepare(sql)?;
    let mut rows = statement.query(parameters)?;
    if let Some(row) = rows.next()? {
        return Ok(Some(RawLogRecord {
            log_timestamp: row.get(0)?,
            log_message: row.get(1)?,
        }));
    }
    Ok(None)
}

/// Seed point for power integration: the newest power reading taken at or
/// before the window start.
pub fn last_power_reading_at_or_before(
    connection: &Connection,
    timestamp: &str,
) -> Result<Option<RawLogRecord>, DbError> {
    first_raw_log(
        connection,
        &format!(
            "SELECT log_timestamp, log_message FROM rawlogs
             WHERE log_timestamp <= ?1
               AND log_message LIKE '{CHARGING_DATA_PREFIX}%'
               AND log_message LIKE '%charge_power_in_kw=%'
             ORDER BY log_timestamp DESC, id DESC
             LIMIT 1"
        ),
        &[&timestamp],
    )
}

pub fn power_readings_between(
    connection: &Connection,
    start_exclusive: &str,
    stop_inclusive: &str,
) -> Result<Vec<RawLogRecord>, DbError> {
    let mut statement = connection.prepare(&format!(
        "SELECT log_timestamp, log_message FROM rawlogs
         WHERE log_timestamp > ?1 AND log_timestamp <= ?2
           AND log_message LIKE '{CHARGING_DATA_PREFIX}%'
           AND log_message LIKE '%charge_power_in_kw=%'
         ORDER BY log_timestamp ASC, id ASC"
    ))?;

    let rows = statement.query_map(params![start_exclusive, stop_inclusive], |row| {
        Ok(RawLogRecord {
            log_timestamp: row.get(0)?,
            log_message: row.get(1)?,
        })
    })?;

    let mut readings = Vec::new();
    for row in rows {
        readings.push(row?);
    }
    Ok(readings)
}

pub fn last_soc_reading_at_or_before(
    connection: &Connection,
    timestamp: &str,
) -> Result<Option<RawLogRecord>, DbError> {
    first_raw_log(
        connection,
        &format!(
            "SELECT log_timestamp, log_message FROM rawlogs
             WHERE log_timestamp <= ?1
               AND log_message LIKE '{CHARGING_DATA_PREFIX}%'
               AND log_message LIKE '%state_of_charge_in_percent=%'
             ORDER BY log_timestamp DESC, id DESC
             LIMIT 1"
        ),
        &[&timestamp],
    )
}

/// Latest `charged_range=` reading at or before a timestamp, used to
/// backfill `start_range`.
pub fn last_range_reading_at_or_before(
    connection: &Connection,
    timestamp: &str,
) -> Result<Option<RawLogRecord>, DbError> {
    first_raw_log(
        connection,
        &format!(
            "SELECT log_timestamp, log_message FROM rawlogs
             WHERE log_timestamp <= ?1
               AND log_message LIKE '{CHARGING_DATA_PREFIX}%'
               AND log_message LIKE '%charged_range=%'
             ORDER BY log_timestamp DESC, id DESC
             LIMIT 1"
        ),
        &[&timestamp],
    )
}

/// Oldest charging-state transition line strictly after a timestamp; the
/// finder walks these forward one at a time.
pub fn next_charging_state_log_after(
    connection: &Connection,
    timestamp: &str,
) -> Result<Option<RawLogRecord>, DbError> {
    first_raw_log(
        connection,
        "SELECT log_timestamp, log_message FROM rawlogs
         WHERE log_timestamp > ?1
           AND (log_message LIKE '%ChargingState.CHARGING%'
                OR log_message LIKE '%ChargingState.READY_FOR_CHARGING%')
         ORDER BY log_timestamp ASC, id ASC
         LIMIT 1",
        &[&timestamp],
    )
}

pub fn last_position_log_in_hour(
    connection: &Connection,
    hour: &str,
) -> Result<Option<RawLogRecord>, DbError> {
    let from = format!("{hour}:00:00");
    let to = format!("{hour}:59:59");
    first_raw_log(
        connection,
        &format!(
            "SELECT log_timestamp, log_message FROM rawlogs
             WHERE log_timestamp >= ?1 AND log_timestamp <= ?2
               AND log_message LIKE '{POSITION_PREFIX}%'
             ORDER BY log_timestamp DESC, id DESC
             LIMIT 1"
        ),
        &[&from, &to],
    )
}

pub fn last_mileage_log_in_hour(
    connection: &Connection,
    hour: &str,
) -> Result<Option<RawLogRecord>, DbError> {
    let from = format!("{hour}:00:00");
    let to = format!("{hour}:59:59");
    first_raw_log(
        connection,
        "SELECT log_timestamp, log_message FROM rawlogs
         WHERE log_timestamp >= ?1 AND log_timestamp <= ?2
           AND log_message LIKE '%mileage:%'
         ORDER BY log_timestamp DESC, id DESC
         LIMIT 1",
        &[&from, &to],
    )
}

// ---- charge events ----

pub fn insert_charge_event(
    connection: &Connection,
    new_event: &NewChargeEventRecord,
) -> Result<i64, DbError> {
    connection.execute(
        "INSERT INTO charge_events
         (event_timestamp, pos_lat, pos_lon, charged_range, mileage, event_type, soc)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            new_event.event_timestamp,
            new_event.pos_lat,
            new_event.pos_lon,
            new_event.charged_range,
            new_event.mileage,
            new_event.event_type,
            new_event.soc,
        ],
    )?;
    Ok(connection.last_insert_rowid())
}

pub fn count_charge_events(connection: &Connection) -> Result<i64, DbError> {
    let count = connection.query_row("SELECT COUNT(*) FROM charge_events", [], |row| row.get(0))?;
    Ok(count)
}

pub fn latest_event_timestamp(connection: &Connection) -> Result<Option<String>, DbError> {
    let latest = connection.query_row(
        "SELECT MAX(event_timestamp) FROM charge_events",
        [],
        |row| row.get(0),
    )?;
    Ok(latest)
}

fn map_charge_event(row: &Row<'_>) -> rusqlite::Result<ChargeEventRecord> {
    Ok(ChargeEventRecord {
        id: row.get(0)?,
        event_timestamp: row.get(1)?,
        pos_lat: row.get(2)?,
        pos_lon: row.get(3)?,
        charged_range: row.get(4)?,
        mileage: row.get(5)?,
        event_type: row.get(6)?,
        soc: row.get(7)?,
        charge_id: row.get(8)?,
    })
}

pub fn next_unlinked_event(connection: &Connection) -> Result<Option<ChargeEventRecord>, DbError> {
    let mut statement = connection.prepare(
        "SELECT id, event_timestamp, pos_lat, pos_lon, charged_range, mileage, event_type, soc, charge_id
         FROM charge_events
         WHERE charge_id IS NULL
         ORDER BY event_timestamp ASC, id ASC
         LIMIT 1",
    )?;

    let mut rows = statement.query([])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(map_charge_event(row)?));
    }
    Ok(None)
}

pub fn link_event(connection: &Connection, event_id: i64, hour_id: i64) -> Result<(), DbError> {
    connection.execute(
        "UPDATE charge_events SET charge_id = ?1 WHERE id = ?2",
        params![hour_id, event_id],
    )?;
    Ok(())
}

// ---- charge hours ----

fn map_charge_hour(row: &Row<'_>) -> rusqlite::Result<ChargeHourRecord> {
    Ok(ChargeHourRecord {
        id: row.get(0)?,
        log_timestamp: row.get(1)?,
        start_at: row.get(2)?,
        stop_at: row.get(3)?,
        position: row.get(4)?,
        charged_range: row.get(5)?,
        start_range: row.get(6)?,
        mileage: row.get(7)?,
        soc: row.get(8)?,
        amount: row.get(9)?,
        price: row.get(10)?,
    })
}

const CHARGE_HOUR_COLUMNS: &str = "id, log_timestamp, start_at, stop_at, position, charged_range, start_range, mileage, soc, amount, price";

fn first_charge_hour(
    connection: &Connection,
    sql: &str,
    parameters: &[&dyn rusqlite::ToSql],
) -> Result<Option<ChargeHourRecord>, DbError> {
    let mut statement = connection.prepare(sql)?;
    let mut rows = statement.query(parameters)?;
    if let Some(row) = rows.next()? {
        return Ok(Some(map_charge_hour(row)?));
    }
    Ok(None)
}

fn charge_hour_id_by_key(connection: &Connection, hour_key: &str) -> Result<Option<i64>, DbError> {
    let mut statement =
        connection.prepare("SELECT id FROM charge_hours WHERE log_timestamp = ?1")?;
    let mut rows = statement.query(params![hour_key])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(row.get(0)?));
    }
    Ok(None)
}

/// Select-or-insert of the hour row keyed by `<hour>:00:00`. A losing racer
/// hits the UNIQUE constraint and re-selects instead of failing.
pub fn locate_charge_hour(connection: &Connection, hour_key: &str) -> Result<i64, DbError> {
    if let Some(id) = charge_hour_id_by_key(connection, hour_key)? {
        return Ok(id);
    }

    let inserted = connection.execute(
        "INSERT INTO charge_hours (log_timestamp) VALUES (?1)",
        params![hour_key],
    );

    match inserted {
        Ok(_) => Ok(connection.last_insert_rowid()),
        Err(rusqlite::Error::SqliteFailure(error, _))
            if error.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            charge_hour_id_by_key(connection, hour_key)?
                .ok_or_else(|| DbError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
        }
        Err(error) => Err(DbError::Sqlite(error)),
    }
}

pub fn get_charge_hour(
    connection: &Connection,
    id: i64,
) -> Result<Option<ChargeHourRecord>, DbError> {
    first_charge_hour(
        connection,
        &format!("SELECT {CHARGE_HOUR_COLUMNS} FROM charge_hours WHERE id = ?1"),
        &[&id],
    )
}

pub fn get_charge_hour_by_key(
    connection: &Connection,
    hour_key: &str,
) -> Result<Option<ChargeHourRecord>, DbError> {
    first_charge_hour(
        connection,
        &format!("SELECT {CHARGE_HOUR_COLUMNS} FROM charge_hours WHERE log_timestamp = ?1"),
        &[&hour_key],
    )
}

pub fn is_hour_started(connection: &Connection, hour_key: &str) -> Result<bool, DbError> {
    let started = connection.query_row(
        "SELECT COUNT(*) FROM charge_hours WHERE log_timestamp = ?1 AND start_at IS NOT NULL",
        params![hour_key],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(started > 0)
}

pub fn start_charge_hour(
    connection: &Connection,
    hour_key: &str,
    start_at: &str,
) -> Result<(), DbError> {
    connection.execute(
        "UPDATE charge_hours SET start_at = ?1 WHERE log_timestamp = ?2 AND start_at IS NULL",
        params![start_at, hour_key],
    )?;
    Ok(())
}

/// Closes an hour a charge ran past. Not gated on amount; the `stop_at IS
/// NULL` guard keeps already-closed hours untouched.
pub fn close_charge_hour(
    connection: &Connection,
    hour_key: &str,
    stop_at: &str,
) -> Result<(), DbError> {
    connection.execute(
        "UPDATE charge_hours SET stop_at = ?1 WHERE log_timestamp = ?2 AND stop_at IS NULL",
        params![stop_at, hour_key],
    )?;
    Ok(())
}

/// Writes the stop-event snapshot and closes the hour. Returns the number of
/// updated rows: zero means the hour was already closed and the stop event
/// is a duplicate.
pub fn apply_stop_event(
    connection: &Connection,
    hour_id: i64,
    position: &str,
    charged_range: Option<i64>,
    mileage: Option<i64>,
    soc: Option<i64>,
    stop_at: &str,
) -> Result<usize, DbError> {
    let updated = connection.execute(
        "UPDATE charge_hours
         SET position = ?1, charged_range = ?2, mileage = ?3, soc = ?4, stop_at = ?5
         WHERE id = ?6 AND stop_at IS NULL",
        params![position, charged_range, mileage, soc, stop_at, hour_id],
    )?;
    Ok(updated)
}

pub fn apply_event_snapshot(
    connection: &Connection,
    hour_id: i64,
    position: &str,
    charged_range: Option<i64>,
    mileage: Option<i64>,
    soc: Option<i64>,
) -> Result<(), DbError> {
    connection.execute(
        "UPDATE charge_hours
         SET position = ?1, charged_range = ?2, mileage = ?3, soc = ?4
         WHERE id = ?5",
        params![position, charged_range, mileage, soc, hour_id],
    )?;
    Ok(())
}

/// Earliest closed hour still missing an amount. Open hours (`stop_at`
/// NULL) are not candidates; a charge in progress gets its amount once the
/// stop event closes the row.
pub fn next_hour_missing_amount(
    connection: &Connection,
) -> Result<Option<ChargeHourRecord>, DbError> {
    first_charge_hour(
        connection,
        &format!(
            "SELECT {CHARGE_HOUR_COLUMNS} FROM charge_hours
             WHERE amount IS NULL AND stop_at IS NOT NULL
             ORDER BY log_timestamp ASC
             LIMIT 1"
        ),
        &[],
    )
}

pub fn set_amount(connection: &Connection, hour_id: i64, amount: f64) -> Result<(), DbError> {
    connection.execute(
        "UPDATE charge_hours SET amount = ?1 WHERE id = ?2",
        params![amount, hour_id],
    )?;
    Ok(())
}

pub fn mark_amount_unrecoverable(connection: &Connection, hour_id: i64) -> Result<(), DbError> {
    set_amount(connection, hour_id, -1.0)
}

pub fn next_hour_missing_start_range(
    connection: &Connection,
) -> Result<Option<ChargeHourRecord>, DbError> {
    first_charge_hour(
        connection,
        &format!(
            "SELECT {CHARGE_HOUR_COLUMNS} FROM charge_hours
             WHERE start_range IS NULL
             ORDER BY log_timestamp ASC
             LIMIT 1"
        ),
        &[],
    )
}

pub fn set_start_range(
    connection: &Connection,
    hour_id: i64,
    start_range: i64,
) -> Result<(), DbError> {
    connection.execute(
        "UPDATE charge_hours SET start_range = ?1 WHERE id = ?2",
        params![start_range, hour_id],
    )?;
    Ok(())
}

pub fn mark_start_range_unrecoverable(
    connection: &Connection,
    hour_id: i64,
) -> Result<(), DbError> {
    set_start_range(connection, hour_id, -1)
}

pub fn hours_with_negative_amount(
    connection: &Connection,
) -> Result<Vec<ChargeHourRecord>, DbError> {
    let mut statement = connection.prepare(&format!(
        "SELECT {CHARGE_HOUR_COLUMNS} FROM charge_hours
         WHERE amount < 0
         ORDER BY log_timestamp ASC"
    ))?;

    let rows = statement.query_map([], |row| map_charge_hour(row))?;

    let mut hours = Vec::new();
    for row in rows {
        hours.push(row?);
    }
    Ok(hours)
}

pub fn hour_ids_with_negative_price(connection: &Connection) -> Result<Vec<i64>, DbError> {
    let mut statement =
        connection.prepare("SELECT id FROM charge_hours WHERE price < 0 ORDER BY log_timestamp")?;
    let rows = statement.query_map([], |row| row.get(0))?;

    let mut ids = Vec::new();
    for row in rows {
        ids.push(row?);
    }
    Ok(ids)
}

pub fn clear_price(connection: &Connection, hour_id: i64) -> Result<(), DbError> {
    connection.execute(
        "UPDATE charge_hours SET price = NULL WHERE id = ?1",
        params![hour_id],
    )?;
    Ok(())
}

/// Earliest hour that has a usable amount but no price yet. The -1 amount
/// sentinel is excluded; pricing it would only manufacture a negative price.
pub fn next_unpriced_hour(connection: &Connection) -> Result<Option<ChargeHourRecord>, DbError> {
    first_charge_hour(
        connection,
        &format!(
            "SELECT {CHARGE_HOUR_COLUMNS} FROM charge_hours
             WHERE amount IS NOT NULL AND amount >= 0 AND price IS NULL
             ORDER BY log_timestamp ASC
             LIMIT 1"
        ),
        &[],
    )
}

pub fn count_unpriced_hours(connection: &Connection) -> Result<i64, DbError> {
    let count = connection.query_row(
        "SELECT COUNT(*) FROM charge_hours WHERE amount IS NOT NULL AND amount >= 0 AND price IS NULL",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn set_price(connection: &Connection, hour_id: i64, price: f64) -> Result<(), DbError> {
    connection.execute(
        "UPDATE charge_hours SET price = ?1 WHERE id = ?2",
        params![price, hour_id],
    )?;
    Ok(())
}

pub fn count_charge_hours(connection: &Connection) -> Result<i64, DbError> {
    let count = connection.query_row("SELECT COUNT(*) FROM charge_hours", [], |row| row.get(0))?;
    Ok(count)
}

/// Hours that stopped within the window. A carry-over hour belongs to the
/// month its charge ended in; hours still open are not reported.
pub fn month_hours(
    connection: &Connection,
    from_inclusive: &str,
    to_exclusive: &str,
) -> Result<Vec<ChargeHourRecord>, DbError> {
    let mut statement = connection.prepare(&format!(
        "SELECT {CHARGE_HOUR_COLUMNS} FROM charge_hours
         WHERE stop_at IS NOT NULL AND stop_at >= ?1 AND stop_at < ?2
         ORDER BY stop_at ASC"
    ))?;

    let rows = statement.query_map(params![from_inclusive, to_exclusive], |row| {
        map_charge_hour(row)
    })?;

    let mut hours = Vec::new();
    for row in rows {
        hours.push(row?);
    }
    Ok(hours)
}

pub fn recent_charge_hours(
    connection: &Connection,
    limit: u32,
) -> Result<Vec<ChargeHourRecord>, DbError> {
    let mut statement = connection.prepare(&format!(
        "SELECT {CHARGE_HOUR_COLUMNS} FROM charge_hours
         ORDER BY log_timestamp DESC
         LIMIT ?1"
    ))?;

    let rows = statement.query_map(params![i64::from(limit)], |row| map_charge_hour(row))?;

    let mut hours = Vec::new();
    for row in rows {
        hours.push(row?);
    }
    Ok(hours)
}
