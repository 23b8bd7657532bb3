// src/store/mod.rs
//! SQLite-backed record store.
//!
//! Writes go through one store-wide lock and land in a single transaction per
//! batch; reads take their own pooled connection and, under WAL, never wait on
//! the writer.

pub mod db;
pub mod migrations;

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::{Value, ValueRef};
use rusqlite::{params, params_from_iter, Row};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::types::{Field, FieldValue, ForecastRecord, Source};
use db::{DbPool, TABLE};

/// Which field columns a query returns.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum FieldFilter {
    #[default]
    All,
    Only(Vec<Field>),
}

impl FieldFilter {
    fn fields(&self) -> Vec<Field> {
        match self {
            FieldFilter::All => Field::ALL.to_vec(),
            FieldFilter::Only(v) => v.clone(),
        }
    }
}

/// Half-open event-time window `[start, end)`; open ends are unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimeWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn since(start: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }

    fn bounds(&self) -> (i64, i64) {
        (
            self.start.map(|t| t.timestamp()).unwrap_or(i64::MIN),
            self.end.map(|t| t.timestamp()).unwrap_or(i64::MAX),
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    pub pool_size: u32,
    /// Attempts per batch when the database reports busy/locked.
    pub max_tries: u32,
    pub retry_wait: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            pool_size: 8,
            max_tries: 3,
            retry_wait: Duration::from_millis(500),
        }
    }
}

pub struct ForecastStore {
    pool: DbPool,
    write_lock: Mutex<()>,
    opts: StoreOptions,
}

const KEY_COLUMNS: &str = "source, issued_ts, event_ts, duration_hours, fetched_ts, location";

impl ForecastStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::open_with(path, StoreOptions::default())
    }

    pub fn open_with(path: &Path, opts: StoreOptions) -> Result<Self, StoreError> {
        let pool = db::create_pool(path, opts.pool_size)?;
        db::init_db(&pool)?;
        let applied = migrations::run_pending(&pool)?;
        if !applied.is_empty() {
            debug!(?applied, "store migrations applied");
        }
        Ok(Self {
            pool,
            write_lock: Mutex::new(()),
            opts,
        })
    }

    /// Insert-or-replace by `(source, issued, event, duration)`. The whole
    /// batch commits or nothing does.
    pub fn upsert(&self, records: &[ForecastRecord]) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }
        let _guard = self.write_lock.lock();
        let tries = self.opts.max_tries.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.upsert_once(records) {
                Ok(n) => return Ok(n),
                Err(e) if e.is_retryable() && attempt < tries => {
                    warn!(error = %e, attempt, "store busy, retrying batch");
                    std::thread::sleep(self.opts.retry_wait);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn upsert_once(&self, records: &[ForecastRecord]) -> Result<usize, StoreError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(&upsert_sql())?;
            for r in records {
                stmt.execute(params_from_iter(record_values(r)))?;
            }
        }
        tx.commit()?;
        Ok(records.len())
    }

    /// Records of one source inside `window`, ordered by event time and, for
    /// equal event times, newest issuance first.
    pub fn query(
        &self,
        source: Source,
        filter: &FieldFilter,
        window: TimeWindow,
    ) -> Result<Vec<ForecastRecord>, StoreError> {
        let fields = filter.fields();
        let mut cols = String::from(KEY_COLUMNS);
        for f in &fields {
            cols.push_str(", ");
            cols.push_str(f.column());
        }
        let sql = format!(
            "SELECT {cols} FROM {TABLE}
             WHERE source = ?1 AND event_ts >= ?2 AND event_ts < ?3
             ORDER BY event_ts ASC, issued_ts DESC, duration_hours ASC"
        );
        let (start, end) = window.bounds();
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params![source.as_str(), start, end])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(record_from_row(row, &fields)?);
        }
        Ok(out)
    }

    pub fn latest_issued_time(&self, source: Source) -> Result<Option<DateTime<Utc>>, StoreError> {
        let conn = self.pool.get()?;
        let ts: Option<i64> = conn.query_row(
            &format!("SELECT MAX(issued_ts) FROM {TABLE} WHERE source = ?1"),
            [source.as_str()],
            |r| r.get(0),
        )?;
        Ok(ts.and_then(|t| DateTime::from_timestamp(t, 0)))
    }

    /// Deletes records of `source` whose event time is older than
    /// `now - horizon`, keeping the most recently issued record.
    pub fn prune_source(
        &self,
        source: Source,
        horizon: Duration,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let cutoff = now.timestamp() - horizon.as_secs() as i64;
        let _guard = self.write_lock.lock();
        let conn = self.pool.get()?;
        let n = conn.execute(
            &format!(
                "DELETE FROM {TABLE}
                 WHERE source = ?1 AND event_ts < ?2
                   AND rowid <> (SELECT rowid FROM {TABLE} WHERE source = ?1
                                 ORDER BY issued_ts DESC, event_ts DESC LIMIT 1)"
            ),
            params![source.as_str(), cutoff],
        )?;
        Ok(n)
    }

    /// Applies `prune_source` to every source present in the table.
    pub fn prune(&self, horizon: Duration, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut total = 0;
        for src in self.sources()? {
            total += self.prune_source(src, horizon, now)?;
        }
        Ok(total)
    }

    pub fn vacuum(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        let conn = self.pool.get()?;
        conn.execute_batch("VACUUM")?;
        Ok(())
    }

    pub fn count(&self, source: Option<Source>) -> Result<usize, StoreError> {
        let conn = self.pool.get()?;
        let n: i64 = match source {
            Some(s) => conn.query_row(
                &format!("SELECT COUNT(*) FROM {TABLE} WHERE source = ?1"),
                [s.as_str()],
                |r| r.get(0),
            )?,
            None => conn.query_row(&format!("SELECT COUNT(*) FROM {TABLE}"), [], |r| r.get(0))?,
        };
        Ok(n as usize)
    }

    pub fn sources(&self) -> Result<Vec<Source>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!("SELECT DISTINCT source FROM {TABLE}"))?;
        let names: Vec<String> = stmt
            .query_map([], |r| r.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(names.iter().filter_map(|n| Source::parse(n)).collect())
    }
}

fn upsert_sql() -> String {
    let field_cols: Vec<&str> = Field::ALL.iter().map(|f| f.column()).collect();
    let n = 6 + field_cols.len();
    let placeholders: Vec<String> = (1..=n).map(|i| format!("?{i}")).collect();
    let updates: Vec<String> = ["fetched_ts", "location"]
        .into_iter()
        .chain(field_cols.iter().copied())
        .map(|c| format!("{c} = excluded.{c}"))
        .collect();
    format!(
        "INSERT INTO {TABLE} ({KEY_COLUMNS}, {}) VALUES ({})
         ON CONFLICT(source, issued_ts, event_ts, duration_hours) DO UPDATE SET {}",
        field_cols.join(", "),
        placeholders.join(", "),
        updates.join(", ")
    )
}

fn record_values(r: &ForecastRecord) -> Vec<Value> {
    let mut v = Vec::with_capacity(6 + Field::ALL.len());
    v.push(Value::Text(r.source.as_str().to_string()));
    v.push(Value::Integer(r.issued_time.timestamp()));
    v.push(Value::Integer(r.event_time.timestamp()));
    v.push(Value::Integer(i64::from(r.duration_hours)));
    v.push(Value::Integer(r.fetched_time.timestamp()));
    v.push(r.location.clone().map(Value::Text).unwrap_or(Value::Null));
    for f in Field::ALL {
        v.push(match r.fields.get(&f) {
            Some(FieldValue::Number(n)) => Value::Real(*n),
            Some(FieldValue::Text(s)) => Value::Text(s.clone()),
            None => Value::Null,
        });
    }
    v
}

fn ts(row: &Row<'_>, idx: usize) -> Result<DateTime<Utc>, StoreError> {
    let secs: i64 = row.get(idx)?;
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| StoreError::IoFailure(format!("timestamp out of range: {secs}")))
}

fn record_from_row(row: &Row<'_>, fields: &[Field]) -> Result<ForecastRecord, StoreError> {
    let src: String = row.get(0)?;
    let source = Source::parse(&src)
        .ok_or_else(|| StoreError::IoFailure(format!("unknown source in store: {src}")))?;
    let duration: i64 = row.get(3)?;
    let mut rec = ForecastRecord::new(source, ts(row, 1)?, ts(row, 2)?, duration.max(0) as u32);
    rec.fetched_time = ts(row, 4)?;
    rec.location = row.get(5)?;
    for (i, f) in fields.iter().enumerate() {
        match row.get_ref(6 + i)? {
            ValueRef::Real(n) => rec.set_number(*f, Some(n)),
            ValueRef::Integer(n) => rec.set_number(*f, Some(n as f64)),
            ValueRef::Text(t) => rec.set_text(*f, Some(String::from_utf8_lossy(t))),
            ValueRef::Null | ValueRef::Blob(_) => {}
        }
    }
    Ok(rec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, 0, 0).unwrap()
    }

    fn open() -> (tempfile::TempDir, ForecastStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ForecastStore::open(&dir.path().join("fc.sdb")).unwrap();
        (dir, store)
    }

    #[test]
    fn field_filter_limits_columns() {
        let (_d, store) = open();
        let mut r = ForecastRecord::new(Source::Owm, at(0), at(3), 3);
        r.set_number(Field::Temp, Some(51.0));
        r.set_text(Field::Clouds, Some("SC"));
        store.upsert(&[r]).unwrap();

        let got = store
            .query(Source::Owm, &FieldFilter::Only(vec![Field::Temp]), TimeWindow::all())
            .unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].number(Field::Temp), Some(51.0));
        assert_eq!(got[0].text(Field::Clouds), None);
    }

    #[test]
    fn window_is_half_open() {
        let (_d, store) = open();
        let recs: Vec<_> = (0..4)
            .map(|h| ForecastRecord::new(Source::Wu, at(0), at(h), 1))
            .collect();
        store.upsert(&recs).unwrap();
        let got = store
            .query(Source::Wu, &FieldFilter::All, TimeWindow::between(at(1), at(3)))
            .unwrap();
        let hours: Vec<_> = got.iter().map(|r| r.event_time).collect();
        assert_eq!(hours, vec![at(1), at(2)]);
    }

    #[test]
    fn prune_keeps_latest_record() {
        let (_d, store) = open();
        let old = ForecastRecord::new(Source::Ukmo, at(0), at(1), 3);
        let older = ForecastRecord::new(Source::Ukmo, at(0), at(0), 3);
        store.upsert(&[old, older]).unwrap();

        let removed = store
            .prune(Duration::from_secs(3600), at(23))
            .unwrap();
        assert_eq!(removed, 1);
        let left = store.query(Source::Ukmo, &FieldFilter::All, TimeWindow::all()).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].event_time, at(1));
        store.vacuum().unwrap();
    }

    #[test]
    fn empty_store_answers_none() {
        let (_d, store) = open();
        assert_eq!(store.latest_issued_time(Source::Nws).unwrap(), None);
        assert_eq!(store.count(None).unwrap(), 0);
        assert!(store.sources().unwrap().is_empty());
    }
}
