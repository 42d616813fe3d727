//! Reconciliation sweeper.
//!
//! One periodic pass over every record. A recharging record whose finish
//! instant has passed is committed as `Full` first and only then offered to
//! the notification channel, so each completion is delivered at most once
//! no matter how delivery goes. Store calls run on the blocking pool.
//!
//! ## Usage
//!
//! ```ignore
//! let sweeper = Sweeper::new(store, channel, period, notify_timeout);
//! let shutdown = CancellationToken::new();
//! sweeper.run(shutdown.clone()).await; // until shutdown.cancel()
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{NotificationError, Result, StoreError};
use crate::integrations::NotificationChannel;
use crate::storage::RecordStore;

/// Outcome of one sweeper tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Records looked at.
    pub scanned: usize,
    /// Users moved to `Full` this tick.
    pub completed: Vec<String>,
    pub notified: usize,
    pub failed_notifications: usize,
    /// Due records that changed after the snapshot and were left alone.
    pub conflicts: usize,
}

pub struct Sweeper {
    store: Arc<dyn RecordStore>,
    channel: Arc<dyn NotificationChannel>,
    period: Duration,
    notify_timeout: Duration,
}

impl Sweeper {
    pub fn new(
        store: Arc<dyn RecordStore>,
        channel: Arc<dyn NotificationChannel>,
        period: Duration,
        notify_timeout: Duration,
    ) -> Self {
        Self {
            store,
            channel,
            period,
            notify_timeout,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Run one reconciliation pass at `now`.
    ///
    /// # Errors
    /// `StoreUnavailable` if the snapshot or a transition write fails. The
    /// rest of the tick is abandoned; records already committed stay
    /// committed and the remainder is picked up next tick.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let records = self.with_store(|store| store.list()).await?;
        let mut report = SweepReport {
            scanned: records.len(),
            ..SweepReport::default()
        };

        for (user_id, mut record) in records {
            if !record.is_due(now) {
                continue;
            }
            let expected = record.version;
            let max_capacity = record.max_capacity;
            record.mark_full();
            if let Err(e) = record.check_invariants() {
                error!(user_id = %user_id, error = %e, "due record is malformed, not completing it");
                continue;
            }

            let key = user_id.clone();
            let committed = self
                .with_store(move |store| store.compare_and_swap(&key, Some(expected), record))
                .await?;
            if committed.is_none() {
                debug!(user_id = %user_id, "record changed since snapshot, skipping");
                report.conflicts += 1;
                continue;
            }
            info!(user_id = %user_id, max_capacity, "recharge complete");

            match self.deliver(&user_id, max_capacity).await {
                Ok(()) => report.notified += 1,
                Err(e) => {
                    warn!(
                        user_id = %user_id,
                        channel = self.channel.name(),
                        error = %e,
                        "completion notification failed, not retrying"
                    );
                    report.failed_notifications += 1;
                }
            }
            report.completed.push(user_id);
        }

        Ok(report)
    }

    /// Run a store call on the blocking pool so file and SQLite I/O never
    /// stall the runtime driving notification timeouts.
    async fn with_store<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: FnOnce(&dyn RecordStore) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || op(&*store))
            .await
            .map_err(|e| StoreError::Background(e.to_string()))?
    }

    async fn deliver(&self, user_id: &str, max_capacity: u32) -> Result<(), NotificationError> {
        match tokio::time::timeout(self.notify_timeout, self.channel.notify(user_id, max_capacity))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(NotificationError::Timeout {
                timeout_secs: self.notify_timeout.as_secs(),
            }),
        }
    }

    /// Tick every `period` until `shutdown` is cancelled.
    ///
    /// Tick failures are logged and the loop carries on. Cancellation is only
    /// observed between ticks.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            period_secs = self.period.as_secs(),
            channel = self.channel.name(),
            backend = self.store.backend(),
            "sweeper started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match self.tick(Utc::now()).await {
                Ok(report) if !report.completed.is_empty() || report.conflicts > 0 => {
                    info!(
                        completed = report.completed.len(),
                        notified = report.notified,
                        failed = report.failed_notifications,
                        conflicts = report.conflicts,
                        "sweep finished"
                    );
                }
                Ok(report) => debug!(scanned = report.scanned, "sweep finished, nothing due"),
                Err(e) => error!(error = %e, "sweep aborted, retrying next tick"),
            }
        }

        info!("sweeper stopped");
    }

    /// Spawn [`Sweeper::run`] on the current runtime.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::LogChannel;
    use crate::recharge::{RechargeSettings, RechargeStatus, TimerController};
    use crate::storage::SqliteStore;
    use chrono::Duration as ChronoDuration;

    #[tokio::test]
    async fn nothing_due_writes_nothing() {
        let store: Arc<dyn RecordStore> = Arc::new(SqliteStore::open_memory().unwrap());
        let ctl = TimerController::new(store.clone(), RechargeSettings::default());
        let now = Utc::now();
        ctl.report_at("a", 50, None, now).unwrap();
        ctl.report_at("b", 100, None, now).unwrap();

        let sweeper = Sweeper::new(
            store.clone(),
            Arc::new(LogChannel),
            Duration::from_secs(60),
            Duration::from_secs(1),
        );
        let report = sweeper.tick(now + ChronoDuration::minutes(10)).await.unwrap();
        assert_eq!(report.scanned, 2);
        assert!(report.completed.is_empty());
        assert_eq!(store.get("a").unwrap().unwrap().version, 1);
        assert_eq!(store.get("b").unwrap().unwrap().version, 1);
    }

    #[tokio::test]
    async fn due_record_becomes_full() {
        let store: Arc<dyn RecordStore> = Arc::new(SqliteStore::open_memory().unwrap());
        let ctl = TimerController::new(store.clone(), RechargeSettings::default());
        let now = Utc::now();
        ctl.report_at("a", 99, None, now).unwrap();

        let sweeper = Sweeper::new(
            store.clone(),
            Arc::new(LogChannel),
            Duration::from_secs(60),
            Duration::from_secs(1),
        );
        let report = sweeper.tick(now + ChronoDuration::minutes(30)).await.unwrap();
        assert_eq!(report.completed, vec!["a".to_string()]);
        assert_eq!(report.notified, 1);
        let rec = store.get("a").unwrap().unwrap();
        assert_eq!(rec.status, RechargeStatus::Full);
        assert!(rec.finish_at.is_none());
    }
}
