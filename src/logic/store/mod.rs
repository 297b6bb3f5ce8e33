//! Store - append-only SQLite time series of Metric Samples
//!
//! One connection behind a mutex: a single writer (the collector) and any
//! number of in-process readers. Each append is its own transaction, so
//! readers see either the whole row or nothing. On-disk stores run in WAL
//! mode so out-of-process readers (dashboard) never block the writer.

mod error;

#[cfg(test)]
mod tests;

pub use error::StoreError;

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, Row};

use crate::config::is_valid_table_name;
use crate::logic::features::MetricSample;

struct StoreInner {
    conn: Connection,
    /// Newest stored timestamp (ordering check)
    last_timestamp: Option<DateTime<Utc>>,
    /// Row id of the newest sample
    last_id: Option<i64>,
}

struct Statements {
    insert: String,
    range: String,
    recent: String,
    after_id: String,
    count: String,
}

impl Statements {
    fn for_table(table: &str) -> Self {
        Self {
            insert: format!(
                "INSERT INTO {table} (timestamp, cpu_percent, mem_percent, disk_percent) VALUES (?1, ?2, ?3, ?4)"
            ),
            range: format!(
                "SELECT timestamp, cpu_percent, mem_percent, disk_percent FROM {table}
                 WHERE timestamp >= ?1 AND timestamp <= ?2 ORDER BY timestamp ASC, id ASC"
            ),
            recent: format!(
                "SELECT timestamp, cpu_percent, mem_percent, disk_percent FROM {table}
                 ORDER BY timestamp DESC, id DESC LIMIT ?1"
            ),
            after_id: format!(
                "SELECT timestamp, cpu_percent, mem_percent, disk_percent, id FROM {table}
                 WHERE id > ?1 ORDER BY id ASC"
            ),
            count: format!("SELECT COUNT(*) FROM {table}"),
        }
    }
}

pub struct Store {
    inner: Mutex<StoreInner>,
    sql: Statements,
    table: String,
    path: Option<PathBuf>,
}

impl Store {
    /// Open (or create) an on-disk store
    pub fn open(path: &Path, table: &str) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        let mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        log::debug!("Store {:?} journal mode: {}", path, mode);

        let store = Self::init(conn, table, Some(path.to_path_buf()))?;
        log::info!(
            "Store opened: {:?} (table: {}, samples: {})",
            path,
            table,
            store.count()?
        );
        Ok(store)
    }

    /// Private in-memory store (tests, dry runs)
    pub fn open_in_memory(table: &str) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, table, None)
    }

    fn init(conn: Connection, table: &str, path: Option<PathBuf>) -> Result<Self, StoreError> {
        if !is_valid_table_name(table) {
            return Err(StoreError::Validation(format!("invalid table name {:?}", table)));
        }

        let check: String = conn.query_row("PRAGMA quick_check", [], |row| row.get(0))?;
        if check != "ok" {
            return Err(StoreError::Corrupted(format!("integrity check failed: {}", check)));
        }

        conn.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp INTEGER NOT NULL,
                cpu_percent REAL NOT NULL,
                mem_percent REAL NOT NULL,
                disk_percent REAL NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_{table}_timestamp
                ON {table}(timestamp);
            "#
        ))?;

        let (last, last_id): (Option<i64>, Option<i64>) = conn.query_row(
            &format!("SELECT MAX(timestamp), MAX(id) FROM {table}"),
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(Self {
            inner: Mutex::new(StoreInner {
                conn,
                last_timestamp: last.map(from_nanos),
                last_id,
            }),
            sql: Statements::for_table(table),
            table: table.to_string(),
            path,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append one sample. Rejects out-of-range values and timestamps older
    /// than the newest stored sample; equal timestamps are accepted.
    pub fn append(&self, sample: &MetricSample) -> Result<(), StoreError> {
        if let Some((field, value)) = sample.out_of_range() {
            return Err(StoreError::Validation(format!(
                "{} = {} is outside [0, 100]",
                field, value
            )));
        }
        let nanos = to_nanos(sample.timestamp)?;

        let mut inner = self.inner.lock();
        if let Some(last) = inner.last_timestamp {
            if sample.timestamp < last {
                return Err(StoreError::Ordering {
                    last,
                    got: sample.timestamp,
                });
            }
        }

        let id = {
            let tx = inner.conn.transaction()?;
            tx.execute(
                &self.sql.insert,
                params![nanos, sample.cpu_percent, sample.mem_percent, sample.disk_percent],
            )?;
            let id = tx.last_insert_rowid();
            tx.commit()?;
            id
        };

        inner.last_timestamp = Some(sample.timestamp);
        inner.last_id = Some(id);
        Ok(())
    }

    /// Samples with timestamp in [start, end], ascending. Empty if none match.
    pub fn query(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<MetricSample>, StoreError> {
        if start > end {
            return Ok(Vec::new());
        }
        self.query_nanos(saturating_nanos(start), saturating_nanos(end))
    }

    /// Samples at or after `start`, ascending
    pub fn query_since(&self, start: DateTime<Utc>) -> Result<Vec<MetricSample>, StoreError> {
        self.query_nanos(saturating_nanos(start), i64::MAX)
    }

    fn query_nanos(&self, start: i64, end: i64) -> Result<Vec<MetricSample>, StoreError> {
        let inner = self.inner.lock();
        let mut stmt = inner.conn.prepare_cached(&self.sql.range)?;
        let mut rows = stmt.query(params![start, end])?;

        let mut samples = Vec::new();
        while let Some(row) = rows.next()? {
            samples.push(row_to_sample(row)?);
        }
        Ok(samples)
    }

    /// Samples stored after row `after` (exclusive), in insertion order,
    /// paired with their row ids. Equal timestamps are told apart by id.
    pub fn query_after_id(&self, after: i64) -> Result<Vec<(i64, MetricSample)>, StoreError> {
        let inner = self.inner.lock();
        let mut stmt = inner.conn.prepare_cached(&self.sql.after_id)?;
        let mut rows = stmt.query(params![after])?;

        let mut samples = Vec::new();
        while let Some(row) = rows.next()? {
            let sample = row_to_sample(row)?;
            samples.push((row.get(4)?, sample));
        }
        Ok(samples)
    }

    /// Most recent `limit` samples, ascending
    pub fn recent(&self, limit: usize) -> Result<Vec<MetricSample>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let inner = self.inner.lock();
        let mut stmt = inner.conn.prepare_cached(&self.sql.recent)?;
        let mut rows = stmt.query(params![limit])?;

        let mut samples = Vec::new();
        while let Some(row) = rows.next()? {
            samples.push(row_to_sample(row)?);
        }
        samples.reverse();
        Ok(samples)
    }

    /// Newest sample, if any
    pub fn latest(&self) -> Result<Option<MetricSample>, StoreError> {
        Ok(self.recent(1)?.pop())
    }

    /// Total samples stored
    pub fn count(&self) -> Result<u64, StoreError> {
        let inner = self.inner.lock();
        let count: i64 = inner.conn.query_row(&self.sql.count, [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().last_timestamp
    }

    /// Row id of the newest sample appended through this store (or found at open)
    pub fn last_id(&self) -> Option<i64> {
        self.inner.lock().last_id
    }
}

fn row_to_sample(row: &Row<'_>) -> Result<MetricSample, StoreError> {
    let sample = MetricSample {
        timestamp: from_nanos(row.get(0)?),
        cpu_percent: row.get(1)?,
        mem_percent: row.get(2)?,
        disk_percent: row.get(3)?,
    };

    // Appends are validated, so a bad stored value means the file was damaged
    if let Some((field, value)) = sample.out_of_range() {
        return Err(StoreError::Corrupted(format!(
            "stored {} = {} at {} is outside [0, 100]",
            field, value, sample.timestamp
        )));
    }
    Ok(sample)
}

fn to_nanos(ts: DateTime<Utc>) -> Result<i64, StoreError> {
    ts.timestamp_nanos_opt()
        .ok_or_else(|| StoreError::Validation(format!("timestamp {} is out of range", ts)))
}

fn saturating_nanos(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_nanos_opt()
        .unwrap_or(if ts.timestamp() < 0 { i64::MIN } else { i64::MAX })
}

fn from_nanos(nanos: i64) -> DateTime<Utc> {
    Utc.timestamp_nanos(nanos)
}
