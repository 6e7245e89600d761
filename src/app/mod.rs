pub mod collector;
pub mod config;
pub mod error;
pub mod logging;
pub mod pricing;
pub mod reconcile;
pub mod runtime;
pub mod services;

pub use error::AppError;

use crate::app::config::AppConfig;
use crate::app::runtime::RunMode;

/// Combined mode: collector, pricing, and report surface in one process.
pub fn run() -> Result<(), AppError> {
    boot(RunMode::Combined)
}

pub fn run_service() -> Result<(), AppError> {
    boot(RunMode::Service)
}

pub fn run_report() -> Result<(), AppError> {
    boot(RunMode::Report)
}

fn boot(mode: RunMode) -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    logging::init()?;

    let config = AppConfig::from_env()?;
    tracing::info!(
        db_path = %config.db_path,
        bind = %config.http_bind,
        price_area = %config.price_area,
        mode = ?mode,
        "starting up"
    );

    runtime::run(config, mode)
}
