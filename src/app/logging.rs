use tracing_subscriber::{EnvFilter, fmt};

use crate::app::AppError;

// The feed clients chatter at debug; keep their internals quiet unless
// RUST_LOG asks for them.
const DEFAULT_DIRECTIVES: &str = "info,hyper=warn,reqwest=warn";

pub fn init() -> Result<(), AppError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(AppError::logging_init)
}
