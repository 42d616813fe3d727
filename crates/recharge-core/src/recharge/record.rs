use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RechargeStatus {
    /// No timer was ever set.
    Idle,
    /// Timer active, `finish_at` is set.
    Recharging,
    /// Capacity reached, no active timer.
    Full,
}

impl RechargeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RechargeStatus::Idle => "idle",
            RechargeStatus::Recharging => "recharging",
            RechargeStatus::Full => "full",
        }
    }
}

impl std::str::FromStr for RechargeStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(RechargeStatus::Idle),
            "recharging" => Ok(RechargeStatus::Recharging),
            "full" => Ok(RechargeStatus::Full),
            other => Err(ValidationError::InvalidValue {
                field: "status".into(),
                message: format!("unknown status '{other}'"),
            }),
        }
    }
}

/// System-wide defaults applied to records created on first contact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RechargeSettings {
    pub default_max_capacity: u32,
    pub rate_minutes: u32,
    pub default_timezone: String,
}

impl Default for RechargeSettings {
    fn default() -> Self {
        Self {
            default_max_capacity: 100,
            rate_minutes: 30,
            default_timezone: "America/Sao_Paulo".into(),
        }
    }
}

/// Per-user recharge state, the durable source of truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRechargeRecord {
    pub max_capacity: u32,
    /// Minutes to regenerate one unit.
    pub recharge_rate_minutes: u32,
    /// IANA zone name, display only.
    pub timezone: String,
    pub status: RechargeStatus,
    /// Present iff `status == Recharging`.
    #[serde(default)]
    pub finish_at: Option<DateTime<Utc>>,
    /// Opaque handle owned by the presentation layer.
    #[serde(default)]
    pub last_panel_message: Option<String>,
    /// Store revision. 0 means never written.
    #[serde(default)]
    pub version: u64,
}

impl UserRechargeRecord {
    /// A fresh `Idle` record built from the system defaults.
    pub fn new(settings: &RechargeSettings) -> Self {
        Self {
            max_capacity: settings.default_max_capacity,
            recharge_rate_minutes: settings.rate_minutes,
            timezone: settings.default_timezone.clone(),
            status: RechargeStatus::Idle,
            finish_at: None,
            last_panel_message: None,
            version: 0,
        }
    }

    pub fn is_recharging(&self) -> bool {
        self.status == RechargeStatus::Recharging
    }

    /// Recharging and past its finish instant.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_recharging() && self.finish_at.is_some_and(|at| at <= now)
    }

    pub fn mark_full(&mut self) {
        self.status = RechargeStatus::Full;
        self.finish_at = None;
    }

    pub fn mark_recharging(&mut self, finish_at: DateTime<Utc>) {
        self.status = RechargeStatus::Recharging;
        self.finish_at = Some(finish_at);
    }

    /// Unit length in seconds.
    pub fn unit_secs(&self) -> u64 {
        u64::from(self.recharge_rate_minutes).saturating_mul(60)
    }

    /// Checks the `finish_at` / `status` pairing and positive bounds.
    pub fn check_invariants(&self) -> Result<(), ValidationError> {
        if self.max_capacity == 0 {
            return Err(ValidationError::CapacityOutOfRange {
                capacity: 0,
                limit: super::MAX_CAPACITY_LIMIT,
            });
        }
        if self.recharge_rate_minutes == 0 {
            return Err(ValidationError::ZeroRate);
        }
        if self.is_recharging() != self.finish_at.is_some() {
            return Err(ValidationError::InvalidValue {
                field: "finish_at".into(),
                message: format!(
                    "finish_at must be set exactly when recharging (status {})",
                    self.status.as_str()
                ),
            });
        }
        Ok(())
    }
}
