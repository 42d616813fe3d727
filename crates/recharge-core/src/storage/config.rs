//! TOML-based application configuration.
//!
//! Stores:
//! - Recharge defaults (capacity, rate, display time zone)
//! - Sweeper period and notification timeout
//! - Record store backend and location
//! - Notification destination
//!
//! Configuration is stored at `~/.config/recharge/config.toml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::error::ConfigError;
use crate::recharge::{RechargeSettings, MAX_CAPACITY_LIMIT};

/// Recharge defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RechargeConfig {
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u32,
    #[serde(default = "default_rate_minutes")]
    pub rate_minutes: u32,
    #[serde(default = "default_timezone")]
    pub default_timezone: String,
}

/// Reconciliation sweeper configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_notify_timeout_secs")]
    pub notify_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Json,
    Sqlite,
}

impl StoreBackend {
    pub fn default_file_name(self) -> &'static str {
        match self {
            StoreBackend::Json => "records.json",
            StoreBackend::Sqlite => "recharge.db",
        }
    }
}

/// Record store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,
    /// Overrides the file inside the data directory.
    #[serde(default)]
    pub path: Option<String>,
}

/// Notification configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationsConfig {
    /// Discord webhook to post completions to. Log only when unset.
    #[serde(default)]
    pub discord_webhook_url: Option<String>,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/recharge/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub recharge: RechargeConfig,
    #[serde(default)]
    pub sweeper: SweeperConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

// Default functions
fn default_max_capacity() -> u32 {
    100
}
fn default_rate_minutes() -> u32 {
    30
}
fn default_timezone() -> String {
    "America/Sao_Paulo".into()
}
fn default_interval_secs() -> u64 {
    60
}
fn default_notify_timeout_secs() -> u64 {
    10
}
fn default_backend() -> StoreBackend {
    StoreBackend::Json
}

impl Default for RechargeConfig {
    fn default() -> Self {
        Self {
            max_capacity: default_max_capacity(),
            rate_minutes: default_rate_minutes(),
            default_timezone: default_timezone(),
        }
    }
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            notify_timeout_secs: default_notify_timeout_secs(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: None,
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() || key.is_empty() {
            return Err(ConfigError::UnknownKey(key.to_string()));
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current
                    .as_object_mut()
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
                // Unset optional fields serialize as null, so every known
                // key is present here.
                let existing = obj
                    .get(part)
                    .cloned()
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;

                let new_value = match existing {
                    serde_json::Value::Number(_) => value
                        .parse::<u64>()
                        .map(|n| serde_json::Value::Number(n.into()))
                        .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?,
                    serde_json::Value::Bool(_) => value
                        .parse::<bool>()
                        .map(serde_json::Value::Bool)
                        .map_err(|_| invalid(format!("cannot parse '{value}' as bool")))?,
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        return Err(invalid("cannot replace a whole section".into()))
                    }
                    _ if value.is_empty() && Self::is_optional_string_key(key) => {
                        serde_json::Value::Null
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current
                .get_mut(part)
                .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
        }

        Err(ConfigError::UnknownKey(key.to_string()))
    }

    fn is_optional_string_key(key: &str) -> bool {
        matches!(key, "store.path" | "notifications.discord_webhook_url")
    }

    /// Location of the config file.
    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or return (and write) the default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed or is
    /// invalid, or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Same as [`Config::load`] for an explicit file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    /// Persist to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| save_failed(e.to_string()))?;
        }
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key, validating the result. Does not save.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the resulting config is invalid. `self` is unchanged on error.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config =
            serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        if self.recharge.max_capacity == 0 || self.recharge.max_capacity > MAX_CAPACITY_LIMIT {
            return Err(invalid(
                "recharge.max_capacity",
                format!("must be between 1 and {MAX_CAPACITY_LIMIT}"),
            ));
        }
        if self.recharge.rate_minutes == 0 {
            return Err(invalid("recharge.rate_minutes", "must be positive".into()));
        }
        if self.recharge.default_timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(invalid(
                "recharge.default_timezone",
                format!("unknown time zone '{}'", self.recharge.default_timezone),
            ));
        }
        if self.sweeper.interval_secs == 0 {
            return Err(invalid("sweeper.interval_secs", "must be positive".into()));
        }
        if self.sweeper.notify_timeout_secs == 0 {
            return Err(invalid("sweeper.notify_timeout_secs", "must be positive".into()));
        }
        Ok(())
    }

    pub fn settings(&self) -> RechargeSettings {
        RechargeSettings {
            default_max_capacity: self.recharge.max_capacity,
            rate_minutes: self.recharge.rate_minutes,
            default_timezone: self.recharge.default_timezone.clone(),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweeper.interval_secs)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.sweeper.notify_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.recharge.max_capacity, 100);
        assert_eq!(parsed.recharge.rate_minutes, 30);
        assert_eq!(parsed.store.backend, StoreBackend::Json);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: Config = toml::from_str("[sweeper]\ninterval_secs = 5\n").unwrap();
        assert_eq!(parsed.sweeper.interval_secs, 5);
        assert_eq!(parsed.sweeper.notify_timeout_secs, 10);
        assert_eq!(parsed.recharge.default_timezone, "America/Sao_Paulo");
        assert!(parsed.notifications.discord_webhook_url.is_none());
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("recharge.max_capacity").as_deref(), Some("100"));
        assert_eq!(cfg.get("store.backend").as_deref(), Some("json"));
        assert_eq!(
            cfg.get("recharge.default_timezone").as_deref(),
            Some("America/Sao_Paulo")
        );
        assert!(cfg.get("recharge.missing_key").is_none());
    }

    #[test]
    fn set_updates_number_and_enum() {
        let mut cfg = Config::default();
        cfg.set("sweeper.interval_secs", "15").unwrap();
        cfg.set("store.backend", "sqlite").unwrap();
        assert_eq!(cfg.sweeper.interval_secs, 15);
        assert_eq!(cfg.store.backend, StoreBackend::Sqlite);
    }

    #[test]
    fn set_creates_and_clears_optional_strings() {
        let mut cfg = Config::default();
        cfg.set(
            "notifications.discord_webhook_url",
            "https://discord.com/api/webhooks/1/abc",
        )
        .unwrap();
        assert!(cfg.notifications.discord_webhook_url.is_some());
        cfg.set("notifications.discord_webhook_url", "").unwrap();
        assert!(cfg.notifications.discord_webhook_url.is_none());
    }

    #[test]
    fn unset_store_path_can_be_set_and_saved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut cfg = Config::default();
        assert_eq!(cfg.get("store.path").as_deref(), Some("null"));

        cfg.set("store.path", "/data/records.json").unwrap();
        cfg.save_to(&path).unwrap();
        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.store.path.as_deref(), Some("/data/records.json"));
    }

    #[test]
    fn set_rejects_unknown_key_and_bad_values() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.set("recharge.nonexistent", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(cfg.set("recharge.rate_minutes", "thirty").is_err());
        assert!(cfg.set("recharge.rate_minutes", "0").is_err());
        assert!(cfg.set("store.backend", "postgres").is_err());
        assert!(cfg.set("recharge.default_timezone", "Mars/Olympus").is_err());
        assert!(cfg.set("recharge", "1").is_err());
        // Unchanged after failures.
        assert_eq!(cfg.recharge.rate_minutes, 30);
    }

    #[test]
    fn load_from_writes_default_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg.sweeper.interval_secs, 60);
        assert!(path.exists());
    }

    #[test]
    fn load_from_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[recharge]\nrate_minutes = 0\n").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn settings_follow_recharge_section() {
        let mut cfg = Config::default();
        cfg.recharge.max_capacity = 120;
        cfg.recharge.default_timezone = "UTC".into();
        let s = cfg.settings();
        assert_eq!(s.default_max_capacity, 120);
        assert_eq!(s.rate_minutes, 30);
        assert_eq!(s.default_timezone, "UTC");
        assert_eq!(cfg.sweep_interval(), Duration::from_secs(60));
    }
}
