pub mod config;
pub mod error;
pub mod files;
pub mod gateway;
pub mod logging;
pub mod session;
pub mod state;
pub mod status;
pub mod tabs;

#[cfg(test)]
pub mod test_utils;

pub use error::{AppError, AppResult};
pub use state::AppState;

use std::sync::Arc;

/// Create and wire the application core. Must run inside a tokio
/// runtime; the returned state owns every manager.
pub fn create_core() -> AppResult<Arc<AppState>> {
    // Initialize config directory first
    let config_dir = config::get_config_dir()?;
    std::fs::create_dir_all(&config_dir)?;

    logging::init_tracing();
    logging::init_log_manager();

    tracing::info!("Skiff config dir: {:?}", config_dir);

    let state = AppState::new()?;

    tracing::info!("Skiff initialized successfully");

    Ok(state)
}
