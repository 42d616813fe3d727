//! Timer controller: turns user reports and settings changes into records.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use super::calculator::time_to_full;
use super::record::{RechargeSettings, UserRechargeRecord};
use super::MAX_CAPACITY_LIMIT;
use crate::error::{Result, ValidationError};
use crate::storage::{update_record, RecordStore};

/// Validates reports and configuration changes and writes them through the
/// store with read-merge-CAS, one user at a time.
#[derive(Clone)]
pub struct TimerController {
    store: Arc<dyn RecordStore>,
    settings: RechargeSettings,
}

fn check_user_id(user_id: &str) -> Result<(), ValidationError> {
    if user_id.trim().is_empty() {
        return Err(ValidationError::EmptyUserId);
    }
    Ok(())
}

impl TimerController {
    pub fn new(store: Arc<dyn RecordStore>, settings: RechargeSettings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> &RechargeSettings {
        &self.settings
    }

    fn blank_record(&self) -> UserRechargeRecord {
        UserRechargeRecord::new(&self.settings)
    }

    /// Record the user's current amount, starting a new recharge cycle.
    ///
    /// `carry_secs` is the time left on the unit currently regenerating.
    ///
    /// # Errors
    /// `InvalidInput` when `amount` exceeds the user's capacity or the carry
    /// exceeds one unit (the store is not touched), `StoreUnavailable` when
    /// persistence fails.
    pub fn report(
        &self,
        user_id: &str,
        amount: u32,
        carry_secs: Option<u32>,
    ) -> Result<UserRechargeRecord> {
        self.report_at(user_id, amount, carry_secs, Utc::now())
    }

    /// [`TimerController::report`] at an explicit instant.
    pub fn report_at(
        &self,
        user_id: &str,
        amount: u32,
        carry_secs: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<UserRechargeRecord> {
        check_user_id(user_id)?;
        let stored = update_record(&*self.store, user_id, |current| {
            let mut record = current.unwrap_or_else(|| self.blank_record());
            record.recharge_rate_minutes = self.settings.rate_minutes;
            let remaining = time_to_full(
                amount,
                record.max_capacity,
                record.recharge_rate_minutes,
                carry_secs,
            )?;
            if remaining <= Duration::zero() {
                record.mark_full();
            } else {
                record.mark_recharging(now + remaining);
            }
            Ok(record)
        })?;
        info!(
            user_id,
            amount,
            carry_secs = ?carry_secs,
            status = stored.status.as_str(),
            finish_at = ?stored.finish_at,
            "recharge reported"
        );
        Ok(stored)
    }

    /// Change the user's capacity.
    ///
    /// An active timer keeps the current amount and the progress on the
    /// unit in flight: `finish_at` moves by the capacity delta times the
    /// rate, but never to before `now`. A timer that is already due is left
    /// alone. Completion is always the sweeper's to commit and announce.
    pub fn set_max_capacity(&self, user_id: &str, capacity: u32) -> Result<UserRechargeRecord> {
        self.set_max_capacity_at(user_id, capacity, Utc::now())
    }

    pub fn set_max_capacity_at(
        &self,
        user_id: &str,
        capacity: u32,
        now: DateTime<Utc>,
    ) -> Result<UserRechargeRecord> {
        check_user_id(user_id)?;
        if capacity == 0 || capacity > MAX_CAPACITY_LIMIT {
            return Err(ValidationError::CapacityOutOfRange {
                capacity,
                limit: MAX_CAPACITY_LIMIT,
            }
            .into());
        }
        let stored = update_record(&*self.store, user_id, |current| {
            let mut record = current.unwrap_or_else(|| self.blank_record());
            let previous = record.max_capacity;
            record.max_capacity = capacity;
            let pending = record
                .finish_at
                .filter(|at| record.is_recharging() && *at > now);
            if let Some(finish_at) = pending {
                let delta_units = i64::from(capacity) - i64::from(previous);
                let unit_secs = i64::from(record.recharge_rate_minutes) * 60;
                let shifted = finish_at + Duration::seconds(delta_units * unit_secs);
                record.finish_at = Some(shifted.max(now));
            }
            Ok(record)
        })?;
        debug!(user_id, capacity, status = stored.status.as_str(), "capacity updated");
        Ok(stored)
    }

    /// Change the zone used to display this user's instants.
    pub fn set_timezone(&self, user_id: &str, timezone: &str) -> Result<UserRechargeRecord> {
        check_user_id(user_id)?;
        let tz = crate::display::parse_timezone(timezone)?;
        let stored = update_record(&*self.store, user_id, |current| {
            let mut record = current.unwrap_or_else(|| self.blank_record());
            record.timezone = tz.name().to_string();
            Ok(record)
        })?;
        debug!(user_id, timezone = %stored.timezone, "timezone updated");
        Ok(stored)
    }

    /// Remember (or forget) the presentation layer's last rendered message.
    pub fn set_panel_message(
        &self,
        user_id: &str,
        handle: Option<String>,
    ) -> Result<UserRechargeRecord> {
        check_user_id(user_id)?;
        update_record(&*self.store, user_id, |current| {
            let mut record = current.unwrap_or_else(|| self.blank_record());
            record.last_panel_message = handle.clone();
            Ok(record)
        })
    }

    /// Every stored record, for administrative inspection.
    pub fn list(&self) -> Result<Vec<(String, UserRechargeRecord)>> {
        Ok(self.store.list()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::recharge::RechargeStatus;
    use crate::storage::SqliteStore;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn controller() -> (TimerController, Arc<dyn RecordStore>) {
        let store: Arc<dyn RecordStore> = Arc::new(SqliteStore::open_memory().unwrap());
        (
            TimerController::new(store.clone(), RechargeSettings::default()),
            store,
        )
    }

    #[test]
    fn report_starts_recharge() {
        let (ctl, _) = controller();
        let rec = ctl.report_at("u", 45, None, t0()).unwrap();
        assert_eq!(rec.status, RechargeStatus::Recharging);
        assert_eq!(rec.finish_at, Some(t0() + Duration::minutes(1650)));
        assert_eq!(rec.version, 1);
    }

    #[test]
    fn report_at_capacity_is_full() {
        let (ctl, _) = controller();
        let rec = ctl.report_at("u", 100, None, t0()).unwrap();
        assert_eq!(rec.status, RechargeStatus::Full);
        assert!(rec.finish_at.is_none());
    }

    #[test]
    fn zero_carry_on_last_unit_is_full() {
        let (ctl, _) = controller();
        let rec = ctl.report_at("u", 99, Some(0), t0()).unwrap();
        assert_eq!(rec.status, RechargeStatus::Full);
    }

    #[test]
    fn report_with_carry() {
        let (ctl, _) = controller();
        let rec = ctl.report_at("u", 58, Some(125), t0()).unwrap();
        assert_eq!(rec.finish_at, Some(t0() + Duration::seconds(73_925)));
    }

    #[test]
    fn over_capacity_is_rejected_without_write() {
        let (ctl, store) = controller();
        ctl.report_at("u", 10, None, t0()).unwrap();
        let before = store.get("u").unwrap().unwrap();

        let err = ctl.report_at("u", 101, None, t0()).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidInput(ValidationError::AmountOutOfRange { amount: 101, .. })
        ));
        let err = ctl.report_at("u", 10, Some(1801), t0()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));

        assert_eq!(store.get("u").unwrap().unwrap(), before);
    }

    #[test]
    fn invalid_first_report_creates_nothing() {
        let (ctl, store) = controller();
        assert!(ctl.report_at("u", 500, None, t0()).is_err());
        assert!(store.get("u").unwrap().is_none());
        assert!(ctl.report_at("  ", 5, None, t0()).is_err());
    }

    #[test]
    fn report_uses_user_capacity_and_keeps_settings() {
        let (ctl, _) = controller();
        ctl.set_max_capacity_at("u", 120, t0()).unwrap();
        ctl.set_timezone("u", "Europe/Lisbon").unwrap();
        ctl.set_panel_message("u", Some("panel-9".into())).unwrap();

        let rec = ctl.report_at("u", 110, None, t0()).unwrap();
        assert_eq!(rec.max_capacity, 120);
        assert_eq!(rec.timezone, "Europe/Lisbon");
        assert_eq!(rec.last_panel_message.as_deref(), Some("panel-9"));
        assert_eq!(rec.finish_at, Some(t0() + Duration::minutes(300)));
    }

    #[test]
    fn capacity_change_shifts_active_timer() {
        let (ctl, _) = controller();
        let rec = ctl.report_at("u", 90, None, t0()).unwrap();
        let finish = rec.finish_at.unwrap();

        let raised = ctl.set_max_capacity_at("u", 110, t0()).unwrap();
        assert_eq!(raised.finish_at, Some(finish + Duration::minutes(300)));

        let lowered = ctl.set_max_capacity_at("u", 95, t0()).unwrap();
        assert_eq!(lowered.finish_at, Some(finish - Duration::minutes(150)));

        let below_current = ctl.set_max_capacity_at("u", 90, t0()).unwrap();
        assert_eq!(below_current.status, RechargeStatus::Recharging);
        assert_eq!(below_current.finish_at, Some(t0()));
        assert!(below_current.is_due(t0()));
    }

    #[test]
    fn capacity_change_leaves_due_timer_alone() {
        let (ctl, _) = controller();
        let rec = ctl.report_at("u", 99, None, t0()).unwrap();
        let due = rec.finish_at.unwrap();
        let later = due + Duration::minutes(1);

        let raised = ctl.set_max_capacity_at("u", 101, later).unwrap();
        assert_eq!(raised.status, RechargeStatus::Recharging);
        assert_eq!(raised.finish_at, Some(due));
        assert_eq!(raised.max_capacity, 101);
    }

    #[test]
    fn capacity_change_never_completes_full_record() {
        let (ctl, _) = controller();
        ctl.report_at("u", 100, None, t0()).unwrap();
        let raised = ctl.set_max_capacity_at("u", 120, t0()).unwrap();
        assert_eq!(raised.status, RechargeStatus::Full);
        assert!(raised.finish_at.is_none());
    }

    #[test]
    fn capacity_limits() {
        let (ctl, _) = controller();
        assert!(ctl.set_max_capacity("u", 0).is_err());
        assert!(ctl.set_max_capacity("u", MAX_CAPACITY_LIMIT + 1).is_err());
        let rec = ctl.set_max_capacity("u", 1).unwrap();
        assert_eq!(rec.status, RechargeStatus::Idle);
    }

    #[test]
    fn timezone_must_be_known() {
        let (ctl, store) = controller();
        assert!(matches!(
            ctl.set_timezone("u", "Atlantis/Capital"),
            Err(CoreError::InvalidInput(ValidationError::UnknownTimezone(_)))
        ));
        assert!(store.get("u").unwrap().is_none());
        assert_eq!(ctl.set_timezone("u", "UTC").unwrap().timezone, "UTC");
    }
}
