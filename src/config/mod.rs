pub mod settings;

pub use settings::Config;

use crate::error::NewsroomError;
use std::sync::Arc;

/// Loads `.env` (if present) and the process environment into a validated,
/// shareable `Config`.
pub fn load_config() -> Result<Arc<Config>, NewsroomError> {
    dotenv::dotenv().ok(); // Load .env file if present, ignore errors

    let config = Config::from_env();
    config.validate().map_err(NewsroomError::ConfigError)?;
    config.validate_and_log();

    Ok(Arc::new(config))
}
