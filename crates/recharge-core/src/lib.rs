//! # Recharge Core Library
//!
//! This library tracks a depletable, time-regenerating resource ("energy")
//! for many users. Users report their current amount; the engine works out
//! when they will be full and tells them once it happens. Any front end
//! (the bundled CLI, a chat bot) is a thin layer over the same library.
//!
//! ## Architecture
//!
//! - **Recharge Engine**: pure amount/time calculator, a controller for
//!   reports and settings, a read-only status reporter, and a periodic
//!   sweeper that commits completions and notifies once
//! - **Storage**: versioned per-user records in a JSON file or SQLite, plus
//!   TOML-based configuration
//! - **Integrations**: notification channels (Discord webhook, log)
//!
//! ## Key Components
//!
//! - [`TimerController`]: validates reports and writes records
//! - [`StatusReporter`]: status snapshots
//! - [`Sweeper`]: reconciliation loop
//! - [`RecordStore`]: per-key compare-and-swap storage contract
//! - [`Config`]: Application configuration management
//! - [`NotificationChannel`]: Trait for completion delivery

pub mod display;
pub mod error;
pub mod integrations;
pub mod recharge;
pub mod storage;

pub use error::{ConfigError, CoreError, NotificationError, StoreError, ValidationError};
pub use integrations::{channel_from_config, DiscordWebhookChannel, LogChannel, NotificationChannel};
pub use recharge::{
    RechargeSettings, RechargeStatus, StatusReporter, StatusSnapshot, SweepReport, Sweeper,
    TimerController, UserRechargeRecord,
};
pub use storage::{open_store, Config, JsonFileStore, RecordStore, SqliteStore};
