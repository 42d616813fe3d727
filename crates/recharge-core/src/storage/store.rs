//! Keyed record store contract.
//!
//! Writers never blindly overwrite: every engine write path goes through
//! [`RecordStore::compare_and_swap`] against the version it read, so a user
//! report that lands between a sweeper snapshot and its write wins.

use tracing::debug;

use crate::error::{CoreError, StoreError};
use crate::recharge::UserRechargeRecord;

/// Attempts [`update_record`] makes before giving up.
pub const MAX_CAS_ATTEMPTS: u32 = 8;

/// Durable per-user record storage.
pub trait RecordStore: Send + Sync {
    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    fn get(&self, user_id: &str) -> Result<Option<UserRechargeRecord>, StoreError>;

    /// Unconditional write. Returns the record as stored, with its new version.
    fn put(&self, user_id: &str, record: UserRechargeRecord)
        -> Result<UserRechargeRecord, StoreError>;

    /// All records, in no particular order. Entries that cannot be decoded
    /// are logged and left out so one bad record never hides the rest.
    fn list(&self) -> Result<Vec<(String, UserRechargeRecord)>, StoreError>;

    /// Write `record` only if the stored version equals `expected_version`
    /// (`None` means the key must be absent).
    ///
    /// Returns the stored record on success and `None` on a version conflict.
    fn compare_and_swap(
        &self,
        user_id: &str,
        expected_version: Option<u64>,
        record: UserRechargeRecord,
    ) -> Result<Option<UserRechargeRecord>, StoreError>;
}

/// Read-merge-write one key with optimistic retries.
///
/// `merge` receives the current record (if any) and returns the record to
/// store. An error from `merge`, or a merged record that breaks the record
/// invariants, aborts without writing anything.
pub fn update_record<F>(
    store: &dyn RecordStore,
    user_id: &str,
    mut merge: F,
) -> Result<UserRechargeRecord, CoreError>
where
    F: FnMut(Option<UserRechargeRecord>) -> Result<UserRechargeRecord, CoreError>,
{
    for attempt in 1..=MAX_CAS_ATTEMPTS {
        let current = store.get(user_id)?;
        let expected = current.as_ref().map(|r| r.version);
        let next = merge(current)?;
        next.check_invariants()?;
        if let Some(stored) = store.compare_and_swap(user_id, expected, next)? {
            return Ok(stored);
        }
        debug!(user_id, attempt, backend = store.backend(), "record changed underneath, retrying");
    }
    Err(StoreError::Contention {
        user_id: user_id.to_string(),
        attempts: MAX_CAS_ATTEMPTS,
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::recharge::{RechargeSettings, RechargeStatus};
    use crate::storage::SqliteStore;

    fn record() -> UserRechargeRecord {
        UserRechargeRecord::new(&RechargeSettings::default())
    }

    #[test]
    fn merge_sees_current_record() {
        let store = SqliteStore::open_memory().unwrap();
        store.put("u", record()).unwrap();

        let stored = update_record(&store, "u", |current| {
            let mut rec = current.unwrap();
            assert_eq!(rec.version, 1);
            rec.max_capacity = 42;
            Ok(rec)
        })
        .unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(store.get("u").unwrap().unwrap().max_capacity, 42);
    }

    #[test]
    fn broken_record_is_never_written() {
        let store = SqliteStore::open_memory().unwrap();
        store.put("u", record()).unwrap();

        let err = update_record(&store, "u", |current| {
            let mut rec = current.unwrap();
            rec.status = RechargeStatus::Recharging;
            rec.finish_at = None;
            Ok(rec)
        })
        .unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidInput(ValidationError::InvalidValue { .. })
        ));
        let stored = store.get("u").unwrap().unwrap();
        assert_eq!(stored.status, RechargeStatus::Idle);
        assert_eq!(stored.version, 1);
    }
}
