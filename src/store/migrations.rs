// src/store/migrations.rs
use std::collections::HashSet;

use crate::error::StoreError;
use crate::store::db::DbPool;

pub struct Migration {
    pub name: &'static str,
    pub sql: &'static str,
}

pub fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            name: "001_initial_schema",
            sql: "-- forecast table is created by init_db
                  SELECT 1;",
        },
        Migration {
            name: "002_event_index",
            sql: "CREATE INDEX IF NOT EXISTS idx_forecast_source_event
                      ON forecast(source, event_ts);",
        },
        Migration {
            name: "003_issued_index",
            sql: "CREATE INDEX IF NOT EXISTS idx_forecast_source_issued
                      ON forecast(source, issued_ts);",
        },
    ]
}

/// Applies migrations not yet recorded; returns the names applied.
pub fn run_pending(pool: &DbPool) -> Result<Vec<String>, StoreError> {
    let conn = pool.get()?;
    let applied_set: HashSet<String> = conn
        .prepare("SELECT name FROM migrations ORDER BY id")?
        .query_map([], |row| row.get::<_, String>(0))?
        .filter_map(|r| r.ok())
        .collect();

    let mut newly_applied = Vec::new();
    for migration in all_migrations() {
        if !applied_set.contains(migration.name) {
            conn.execute_batch(migration.sql)?;
            conn.execute("INSERT INTO migrations (name) VALUES (?1)", [migration.name])?;
            newly_applied.push(migration.name.to_string());
        }
    }
    Ok(newly_applied)
}

pub fn applied(pool: &DbPool) -> Result<Vec<String>, StoreError> {
    let conn = pool.get()?;
    let names: Vec<String> = conn
        .prepare("SELECT name FROM migrations ORDER BY id")?
        .query_map([], |row| row.get(0))?
        .filter_map(|r| r.ok())
        .collect();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::db;

    fn test_pool() -> (tempfile::TempDir, DbPool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = db::create_pool(&dir.path().join("test.sdb"), 2).unwrap();
        db::init_db(&pool).unwrap();
        (dir, pool)
    }

    #[test]
    fn run_pending_is_idempotent() {
        let (_dir, pool) = test_pool();
        let first = run_pending(&pool).unwrap();
        let second = run_pending(&pool).unwrap();
        assert_eq!(first.len(), all_migrations().len());
        assert!(second.is_empty());
        assert_eq!(applied(&pool).unwrap()[0], "001_initial_schema");
    }
}
