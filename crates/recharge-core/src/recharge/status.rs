use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::calculator::{amount_now, time_until_next_unit};
use super::record::{RechargeStatus, UserRechargeRecord};
use crate::error::{CoreError, Result};
use crate::storage::RecordStore;

/// What a user sees when asking for their status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub user_id: String,
    pub status: RechargeStatus,
    /// `None` while idle: nothing was ever reported.
    pub amount: Option<u32>,
    pub max_capacity: u32,
    pub finish_at: Option<DateTime<Utc>>,
    pub remaining_secs: Option<i64>,
    /// Seconds until the next unit completes.
    pub next_unit_secs: Option<i64>,
    pub timezone: String,
    pub at: DateTime<Utc>,
}

impl StatusSnapshot {
    /// Project a record at `now`.
    ///
    /// A recharging record past its finish instant is reported as full even
    /// if the sweeper has not committed the transition yet.
    pub fn from_record(user_id: &str, record: &UserRechargeRecord, now: DateTime<Utc>) -> Self {
        let mut snap = Self {
            user_id: user_id.to_string(),
            status: record.status,
            amount: None,
            max_capacity: record.max_capacity,
            finish_at: None,
            remaining_secs: None,
            next_unit_secs: None,
            timezone: record.timezone.clone(),
            at: now,
        };
        match (record.status, record.finish_at) {
            (RechargeStatus::Recharging, Some(finish_at)) if finish_at > now => {
                let rate = record.recharge_rate_minutes;
                snap.amount = Some(amount_now(finish_at, record.max_capacity, rate, now));
                snap.finish_at = Some(finish_at);
                snap.remaining_secs = Some((finish_at - now).num_seconds());
                snap.next_unit_secs =
                    time_until_next_unit(finish_at, rate, now).map(|d| d.num_seconds());
            }
            (RechargeStatus::Idle, _) => {}
            _ => {
                snap.status = RechargeStatus::Full;
                snap.amount = Some(record.max_capacity);
            }
        }
        snap
    }

    pub fn is_full(&self) -> bool {
        self.status == RechargeStatus::Full
    }
}

/// Read-only view over the store.
#[derive(Clone)]
pub struct StatusReporter {
    store: Arc<dyn RecordStore>,
}

impl StatusReporter {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Status of `user_id` at `now`. Never writes.
    ///
    /// # Errors
    /// `NotFound` when the user has no record.
    pub fn status_of(&self, user_id: &str, now: DateTime<Utc>) -> Result<StatusSnapshot> {
        let record = self
            .store
            .get(user_id)?
            .ok_or_else(|| CoreError::not_found(user_id))?;
        Ok(StatusSnapshot::from_record(user_id, &record, now))
    }

    /// Status of every stored user at `now`.
    pub fn all(&self, now: DateTime<Utc>) -> Result<Vec<StatusSnapshot>> {
        Ok(self
            .store
            .list()?
            .iter()
            .map(|(id, rec)| StatusSnapshot::from_record(id, rec, now))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recharge::{RechargeSettings, TimerController};
    use crate::storage::SqliteStore;
    use chrono::Duration;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn setup() -> (TimerController, StatusReporter, Arc<dyn RecordStore>) {
        let store: Arc<dyn RecordStore> = Arc::new(SqliteStore::open_memory().unwrap());
        (
            TimerController::new(store.clone(), RechargeSettings::default()),
            StatusReporter::new(store.clone()),
            store,
        )
    }

    #[test]
    fn unknown_user_is_not_found() {
        let (_, reporter, _) = setup();
        assert!(matches!(
            reporter.status_of("ghost", t0()),
            Err(CoreError::NotFound { .. })
        ));
    }

    #[test]
    fn recharging_snapshot() {
        let (ctl, reporter, _) = setup();
        ctl.report_at("u", 45, None, t0()).unwrap();

        let snap = reporter.status_of("u", t0() + Duration::minutes(45)).unwrap();
        assert_eq!(snap.status, RechargeStatus::Recharging);
        assert_eq!(snap.amount, Some(46));
        assert_eq!(snap.remaining_secs, Some(1605 * 60));
        assert_eq!(snap.next_unit_secs, Some(15 * 60));
        assert_eq!(snap.finish_at, Some(t0() + Duration::minutes(1650)));
    }

    #[test]
    fn past_finish_reads_as_full_before_sweep() {
        let (ctl, reporter, store) = setup();
        ctl.report_at("u", 45, None, t0()).unwrap();

        let snap = reporter.status_of("u", t0() + Duration::minutes(1650)).unwrap();
        assert_eq!(snap.status, RechargeStatus::Full);
        assert_eq!(snap.amount, Some(100));
        assert!(snap.finish_at.is_none());
        // The store still holds the active timer.
        assert_eq!(
            store.get("u").unwrap().unwrap().status,
            RechargeStatus::Recharging
        );
    }

    #[test]
    fn idle_has_no_amount() {
        let (ctl, reporter, _) = setup();
        ctl.set_timezone("u", "UTC").unwrap();
        let snap = reporter.status_of("u", t0()).unwrap();
        assert_eq!(snap.status, RechargeStatus::Idle);
        assert_eq!(snap.amount, None);
    }

    #[test]
    fn status_is_idempotent_and_read_only() {
        let (ctl, reporter, store) = setup();
        ctl.report_at("u", 10, Some(90), t0()).unwrap();
        let version = store.get("u").unwrap().unwrap().version;

        let now = t0() + Duration::minutes(7);
        let a = reporter.status_of("u", now).unwrap();
        let b = reporter.status_of("u", now).unwrap();
        assert_eq!(a, b);
        assert_eq!(store.get("u").unwrap().unwrap().version, version);
    }
}
