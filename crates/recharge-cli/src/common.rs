//! Shared setup for commands.

use std::sync::Arc;

use recharge_core::{open_store, Config, RecordStore, StatusReporter, TimerController};

pub type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Loaded config plus the store it points at.
pub struct Context {
    pub config: Config,
    pub store: Arc<dyn RecordStore>,
}

impl Context {
    pub fn load() -> CliResult<Self> {
        let config = Config::load()?;
        let store = open_store(&config.store)?;
        Ok(Self { config, store })
    }

    pub fn controller(&self) -> TimerController {
        TimerController::new(self.store.clone(), self.config.settings())
    }

    pub fn reporter(&self) -> StatusReporter {
        StatusReporter::new(self.store.clone())
    }
}
