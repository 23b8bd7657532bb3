// src/store/db.rs
use std::path::Path;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::error::StoreError;
use crate::types::{Field, FieldKind};

pub type DbPool = Pool<SqliteConnectionManager>;

pub const TABLE: &str = "forecast";

/// Opens a pooled SQLite database in WAL mode so readers never block on the
/// writer.
pub fn create_pool(db_path: &Path, max_size: u32) -> Result<DbPool, StoreError> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::IoFailure(format!("{}: {e}", parent.display())))?;
        }
    }
    let manager = SqliteConnectionManager::file(db_path).with_init(|c| {
        c.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000; PRAGMA synchronous=NORMAL;")
    });
    let pool = Pool::builder().max_size(max_size.max(2)).build(manager)?;
    Ok(pool)
}

fn column_type(f: Field) -> &'static str {
    match f.kind() {
        FieldKind::Numeric => "REAL",
        FieldKind::Categorical => "TEXT",
    }
}

pub(crate) fn create_table_sql() -> String {
    let cols: Vec<String> = Field::ALL
        .iter()
        .map(|f| format!("    {} {}", f.column(), column_type(*f)))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {TABLE} (
    source TEXT NOT NULL,
    issued_ts INTEGER NOT NULL,
    event_ts INTEGER NOT NULL,
    duration_hours INTEGER NOT NULL,
    fetched_ts INTEGER NOT NULL,
    location TEXT,
{},
    PRIMARY KEY (source, issued_ts, event_ts, duration_hours)
);",
        cols.join(",\n")
    )
}

pub fn init_db(pool: &DbPool) -> Result<(), StoreError> {
    let conn = pool.get()?;
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;
    conn.execute_batch(&create_table_sql())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_pool_and_init() {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_pool(&dir.path().join("nested/fc.sdb"), 4).unwrap();
        init_db(&pool).unwrap();
        init_db(&pool).unwrap();

        let conn = pool.get().unwrap();
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |r| r.get(0))
            .unwrap();
        assert_eq!(mode.to_ascii_lowercase(), "wal");

        let cols: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM pragma_table_info('forecast')",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(cols as usize, 6 + Field::ALL.len());
    }
}
