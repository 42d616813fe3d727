mod config;
pub mod database;
pub mod json_store;
pub mod store;

pub use config::{
    Config, NotificationsConfig, RechargeConfig, StoreBackend, StoreConfig, SweeperConfig,
};
pub use database::SqliteStore;
pub use json_store::JsonFileStore;
pub use store::{update_record, RecordStore, MAX_CAS_ATTEMPTS};

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::error::ConfigError;

/// Returns `~/.config/recharge[-dev]/` based on RECHARGE_ENV.
///
/// Set RECHARGE_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the data directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("RECHARGE_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("recharge-dev")
    } else {
        base_dir.join("recharge")
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(e.to_string()))?;
    Ok(dir)
}

/// Open the record store selected by `config`.
///
/// # Errors
/// Returns an error if the SQLite database cannot be opened. The JSON store
/// opens lazily and never fails here.
pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn RecordStore>, crate::CoreError> {
    let path = match &config.path {
        Some(p) => PathBuf::from(p),
        None => data_dir()?.join(config.backend.default_file_name()),
    };
    debug!(backend = ?config.backend, path = %path.display(), "opening record store");
    let store: Arc<dyn RecordStore> = match config.backend {
        StoreBackend::Json => Arc::new(JsonFileStore::new(path)),
        StoreBackend::Sqlite => Arc::new(SqliteStore::open_at(&path)?),
    };
    Ok(store)
}
