//! SQLite-based record storage.
//!
//! One row per user in `recharge_records`. Compare-and-swap is a single
//! conditional `UPDATE` (or `INSERT ... ON CONFLICT DO NOTHING` for a key that
//! must be absent), so it stays atomic across processes sharing the file.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::error;

use super::store::RecordStore;
use crate::error::StoreError;
use crate::recharge::{RechargeStatus, UserRechargeRecord};

const COLUMNS: &str =
    "user_id, version, status, max_capacity, rate_minutes, timezone, finish_at, last_panel_message";

/// SQLite database for recharge records.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (and migrate) the database at `path`, e.g.
    /// `~/.config/recharge/recharge.db`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_at(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Self::with_connection(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn migrate(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS recharge_records (
            user_id            TEXT PRIMARY KEY,
            version            INTEGER NOT NULL,
            status             TEXT NOT NULL,
            max_capacity       INTEGER NOT NULL,
            rate_minutes       INTEGER NOT NULL,
            timezone           TEXT NOT NULL,
            finish_at          TEXT,
            last_panel_message TEXT,
            updated_at         TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_recharge_records_status_finish
            ON recharge_records(status, finish_at);",
    )
}

/// Raw row, decoded into a record outside the rusqlite closure so that bad
/// values become [`StoreError::CorruptRecord`] instead of a query failure.
struct RawRow {
    user_id: String,
    version: i64,
    status: String,
    max_capacity: u32,
    rate_minutes: u32,
    timezone: String,
    finish_at: Option<String>,
    last_panel_message: Option<String>,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            user_id: row.get(0)?,
            version: row.get(1)?,
            status: row.get(2)?,
            max_capacity: row.get(3)?,
            rate_minutes: row.get(4)?,
            timezone: row.get(5)?,
            finish_at: row.get(6)?,
            last_panel_message: row.get(7)?,
        })
    }

    fn decode(self) -> Result<(String, UserRechargeRecord), StoreError> {
        let corrupt = |message: String| StoreError::CorruptRecord {
            user_id: self.user_id.clone(),
            message,
        };
        let status: RechargeStatus = self.status.parse().map_err(|e| corrupt(format!("{e}")))?;
        let finish_at = self
            .finish_at
            .as_deref()
            .map(|s| {
                DateTime::parse_from_rfc3339(s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| corrupt(format!("bad finish_at '{s}': {e}")))
            })
            .transpose()?;
        let record = UserRechargeRecord {
            max_capacity: self.max_capacity,
            recharge_rate_minutes: self.rate_minutes,
            timezone: self.timezone,
            status,
            finish_at,
            last_panel_message: self.last_panel_message,
            version: self.version as u64,
        };
        Ok((self.user_id, record))
    }
}

impl RecordStore for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    fn get(&self, user_id: &str) -> Result<Option<UserRechargeRecord>, StoreError> {
        let conn = self.conn.lock()?;
        let raw = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM recharge_records WHERE user_id = ?1"),
                params![user_id],
                RawRow::from_row,
            )
            .optional()?;
        raw.map(|r| r.decode().map(|(_, rec)| rec)).transpose()
    }

    fn put(
        &self,
        user_id: &str,
        mut record: UserRechargeRecord,
    ) -> Result<UserRechargeRecord, StoreError> {
        let conn = self.conn.lock()?;
        let version: i64 = conn.query_row(
            &format!(
                "INSERT INTO recharge_records ({COLUMNS}, updated_at)
                 VALUES (?1, 1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(user_id) DO UPDATE SET
                    version = version + 1,
                    status = excluded.status,
                    max_capacity = excluded.max_capacity,
                    rate_minutes = excluded.rate_minutes,
                    timezone = excluded.timezone,
                    finish_at = excluded.finish_at,
                    last_panel_message = excluded.last_panel_message,
                    updated_at = excluded.updated_at
                 RETURNING version"
            ),
            params![
                user_id,
                record.status.as_str(),
                record.max_capacity,
                record.recharge_rate_minutes,
                record.timezone,
                record.finish_at.map(|at| at.to_rfc3339()),
                record.last_panel_message,
                Utc::now().to_rfc3339(),
            ],
            |row| row.get(0),
        )?;
        record.version = version as u64;
        Ok(record)
    }

    fn list(&self) -> Result<Vec<(String, UserRechargeRecord)>, StoreError> {
        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM recharge_records ORDER BY user_id"
        ))?;
        let rows = stmt.query_map([], RawRow::from_row)?;
        let mut out = Vec::new();
        for row in rows {
            match row?.decode() {
                Ok(entry) => out.push(entry),
                Err(e) => error!(error = %e, "skipping undecodable record"),
            }
        }
        Ok(out)
    }

    fn compare_and_swap(
        &self,
        user_id: &str,
        expected_version: Option<u64>,
        mut record: UserRechargeRecord,
    ) -> Result<Option<UserRechargeRecord>, StoreError> {
        let conn = self.conn.lock()?;
        let now = Utc::now().to_rfc3339();
        let finish_at = record.finish_at.map(|at| at.to_rfc3339());
        let changed = match expected_version {
            None => conn.execute(
                &format!(
                    "INSERT INTO recharge_records ({COLUMNS}, updated_at)
                     VALUES (?1, 1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                     ON CONFLICT(user_id) DO NOTHING"
                ),
                params![
                    user_id,
                    record.status.as_str(),
                    record.max_capacity,
                    record.recharge_rate_minutes,
                    record.timezone,
                    finish_at,
                    record.last_panel_message,
                    now,
                ],
            )?,
            Some(expected) => conn.execute(
                "UPDATE recharge_records SET
                    version = version + 1,
                    status = ?3,
                    max_capacity = ?4,
                    rate_minutes = ?5,
                    timezone = ?6,
                    finish_at = ?7,
                    last_panel_message = ?8,
                    updated_at = ?9
                 WHERE user_id = ?1 AND version = ?2",
                params![
                    user_id,
                    expected as i64,
                    record.status.as_str(),
                    record.max_capacity,
                    record.recharge_rate_minutes,
                    record.timezone,
                    finish_at,
                    record.last_panel_message,
                    now,
                ],
            )?,
        };
        if changed == 0 {
            return Ok(None);
        }
        record.version = expected_version.map_or(1, |v| v + 1);
        Ok(Some(record))
    }
}
