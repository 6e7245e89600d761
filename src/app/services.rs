use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use thiserror::Error;

use crate::adapters::db;
use crate::adapters::db::DbError;
use crate::domain::models::ChargeHourRecord;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("database lock poisoned")]
    DbLockPoisoned,
    #[error("database operation failed: {0}")]
    Database(#[from] DbError),
}

/// Read-side queries backing the HTTP surface.
pub trait ChargeQueryHandler {
    fn count_raw_logs(&self) -> Result<i64, ServiceError>;
    fn count_charge_events(&self) -> Result<i64, ServiceError>;
    fn count_charge_hours(&self) -> Result<i64, ServiceError>;
    fn count_unpriced_hours(&self) -> Result<i64, ServiceError>;
    fn latest_raw_log_timestamp(&self) -> Result<Option<String>, ServiceError>;
    fn recent_charge_hours(&self, limit: u32) -> Result<Vec<ChargeHourRecord>, ServiceError>;
    fn month_hours(
        &self,
        from_inclusive: &str,
        to_exclusive: &str,
    ) -> Result<Vec<ChargeHourRecord>, ServiceError>;
    fn get_schema_version(&self) -> Result<u32, ServiceError>;
}

#[derive(Clone)]
pub struct SqliteChargeService {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteChargeService {
    pub fn new(connection: Arc<Mutex<Connection>>) -> Self {
        Self { connection }
    }

    fn with_connection<T>(
        &self,
        op: impl FnOnce(&Connection) -> Result<T, DbError>,
    ) -> Result<T, ServiceError> {
        let connection = self
            .connection
            .lock()
            .map_err(|_| ServiceError::DbLockPoisoned)?;
        op(&connection).map_err(ServiceError::from)
    }
}

impl ChargeQueryHandler for SqliteChargeService {
    fn count_raw_logs(&self) -> Result<i64, ServiceError> {
        self.with_connection(db::count_raw_logs)
    }

    fn count_charge_events(&self) -> Result<i64, ServiceError> {
        self.with_connection(db::count_charge_events)
    }

    fn count_charge_hours(&self) -> Result<i64, ServiceError> {
        self.with_connection(db::count_charge_hours)
    }

    fn count_unpriced_hours(&self) -> Result<i64, ServiceError> {
        self.with_connection(db::count_unpriced_hours)
    }

    fn latest_raw_log_timestamp(&self) -> Result<Option<String>, ServiceError> {
        self.with_connection(db::latest_raw_log_timestamp)
    }

    fn recent_charge_hours(&self, limit: u32) -> Result<Vec<ChargeHourRecord>, ServiceError> {
        self.with_connection(|connection| db::recent_charge_hours(connection, limit))
    }

    fn month_hours(
        &self,
        from_inclusive: &str,
        to_exclusive: &str,
    ) -> Result<Vec<ChargeHourRecord>, ServiceError> {
        self.with_connection(|connection| db::month_hours(connection, from_inclusive, to_exclusive))
    }

    fn get_schema_version(&self) -> Result<u32, ServiceError> {
        self.with_connection(db::schema_version)
    }
}
