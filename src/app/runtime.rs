use std::sync::{
    Arc, Mutex, MutexGuard,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use rusqlite::Connection;

use crate::adapters::api::{ApiState, configure_common_routes, configure_report_routes, configure_service_routes};
use crate::adapters::spot_price::{ElspotClient, RemoteTariffClient, SpotPriceFeed, TariffSource};
use crate::app::collector::HomePosition;
use crate::app::config::AppConfig;
use crate::app::error::AppError;
use crate::app::pricing::spawn_price_loop;
use crate::app::reconcile::spawn_reconcile_loop;
use crate::app::services::{ServiceError, SqliteChargeService};
use crate::domain::session::SessionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Collector, pricing, and report surface in one process.
    Combined,
    /// Collector and pricing loops plus the operational endpoints.
    Service,
    /// Read-only report surface, no background work.
    Report,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub home: HomePosition,
    pub battery_capacity_kwh: Option<f64>,
    pub reconcile_interval: Duration,
    pub retry_interval: Duration,
    pub price_interval: Duration,
    pub price_idle_interval: Duration,
    pub max_consecutive_failures: u32,
    pub max_price_updates: u32,
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            home: HomePosition {
                latitude: config.home_latitude.clone(),
                longitude: config.home_longitude.clone(),
            },
            battery_capacity_kwh: config.battery_capacity_kwh,
            reconcile_interval: Duration::from_secs(config.reconcile_interval_secs),
            retry_interval: Duration::from_secs(config.retry_interval_secs),
            price_interval: Duration::from_secs(config.price_interval_secs),
            price_idle_interval: Duration::from_secs(config.price_idle_interval_secs),
            max_consecutive_failures: config.max_consecutive_failures,
            max_price_updates: config.max_price_updates,
        }
    }
}

/// Shared state of the background pipeline. The session state mutex keeps
/// event processing serialized: the builder's carry-over logic depends on
/// events being applied one at a time, oldest first.
pub struct PipelineContext {
    connection: Arc<Mutex<Connection>>,
    session_state: Mutex<SessionState>,
    pub settings: PipelineSettings,
    pub spot_feed: Box<dyn SpotPriceFeed>,
    pub tariff_source: TariffSource,
}

impl PipelineContext {
    pub fn new(
        connection: Arc<Mutex<Connection>>,
        settings: PipelineSettings,
        spot_feed: Box<dyn SpotPriceFeed>,
        tariff_source: TariffSource,
    ) -> Self {
        Self {
            connection,
            session_state: Mutex::new(SessionState::new()),
            settings,
            spot_feed,
            tariff_source,
        }
    }

    pub fn connection_handle(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.connection)
    }

    pub fn lock_connection(&self) -> Result<MutexGuard<'_, Connection>, ServiceError> {
        self.connection.lock().map_err(|_| ServiceError::DbLockPoisoned)
    }

    pub fn lock_session_state(&self) -> Result<MutexGuard<'_, SessionState>, ServiceError> {
        self.session_state
            .lock()
            .map_err(|_| ServiceError::DbLockPoisoned)
    }
}

/// Sleeps in short steps so a stop request is honored promptly.
pub fn sleep_with_stop(duration: Duration, stop_flag: &AtomicBool) {
    let step = Duration::from_millis(200);
    let mut remaining = duration;

    while !remaining.is_zero() && !stop_flag.load(Ordering::Relaxed) {
        let chunk = remaining.min(step);
        std::thread::sleep(chunk);
        remaining -= chunk;
    }
}

pub fn run(config: AppConfig, mode: RunMode) -> Result<(), AppError> {
    let mut connection =
        crate::adapters::db::open_connection(&config.db_path).map_err(AppError::database_init)?;
    crate::adapters::db::run_migrations(&mut connection).map_err(AppError::database_init)?;

    let shared_connection = Arc::new(Mutex::new(connection));
    let queries = SqliteChargeService::new(Arc::clone(&shared_connection));

    let stop_flag = Arc::new(AtomicBool::new(false));
    let mut worker_handles = Vec::new();

    let pipeline = if mode == RunMode::Report {
        None
    } else {
        let spot_feed = ElspotClient::new(&config.spot_price_url, &config.price_area)
            .map_err(AppError::runtime)?;
        let tariff_source = match &config.tariff_url {
            Some(url) => {
                let remote = RemoteTariffClient::new(url).map_err(AppError::runtime)?;
                TariffSource::new(Some(Box::new(remote)))
            }
            None => TariffSource::fallback_only(),
        };

        let ctx = Arc::new(PipelineContext::new(
            Arc::clone(&shared_connection),
            PipelineSettings::from_config(&config),
            Box::new(spot_feed),
            tariff_source,
        ));

        worker_handles.push(spawn_reconcile_loop(Arc::clone(&ctx), Arc::clone(&stop_flag)));
        worker_handles.push(spawn_price_loop(Arc::clone(&ctx), Arc::clone(&stop_flag)));

        Some(ctx)
    };

    let api_state = ApiState { queries, pipeline };

    tracing::info!(bind = %config.http_bind, mode = ?mode, "http server starting");

    let server_result = actix_web::rt::System::new().block_on(async move {
        HttpServer::new(move || {
            let mut app = App::new()
                .wrap(Cors::permissive())
                .app_data(web::Data::new(api_state.clone()))
                .configure(configure_common_routes);
            if matches!(mode, RunMode::Combined | RunMode::Service) {
                app = app.configure(configure_service_routes);
            }
            if matches!(mode, RunMode::Combined | RunMode::Report) {
                app = app.configure(configure_report_routes);
            }
            app
        })
        .bind(&config.http_bind)?
        .run()
        .await
    });

    stop_flag.store(true, Ordering::Relaxed);
    for handle in worker_handles {
        if handle.join().is_err() {
            return Err(AppError::runtime("worker thread panicked"));
        }
    }

    server_result.map_err(AppError::runtime)
}
