//! SQLite-based persistent store for the pipeline.
//!
//! The database lives at `~/.fieldops/fieldops.db` and holds raw gateway
//! messages, plots, committed activities, field observations, and alerts.
//! Metrics are never stored — they are recomputed from activity rows on
//! demand (see `crate::metrics`).
//!
//! Repository methods are grouped per table in the sibling files, all as
//! `impl FarmDb` blocks over one connection wrapper.

use std::path::PathBuf;

use chrono::Utc;
use rusqlite::Connection;

pub mod types;
pub use types::*;

mod activities;
mod alerts;
mod messages;
mod observations;
mod plots;

pub use alerts::AlertUpsertOutcome;

pub struct FarmDb {
    conn: Connection,
}

impl FarmDb {
    /// Borrow the underlying connection for ad-hoc queries.
    pub fn conn_ref(&self) -> &Connection {
        &self.conn
    }

    /// Execute a closure within a SQLite transaction.
    /// Commits on Ok, rolls back on Err.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, String>
    where
        F: FnOnce(&Self) -> Result<T, String>,
    {
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| format!("Failed to begin transaction: {e}"))?;
        match f(self) {
            Ok(val) => {
                self.conn
                    .execute_batch("COMMIT")
                    .map_err(|e| format!("Failed to commit transaction: {e}"))?;
                Ok(val)
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    /// Open (or create) the database at the default path and apply the schema.
    pub fn open() -> Result<Self, String> {
        let path = Self::db_path()?;
        Self::open_at(path)
    }

    /// Open a database at an explicit path. Useful for testing.
    pub fn open_at(path: PathBuf) -> Result<Self, String> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| format!("Failed to create {}: {}", parent.display(), e))?;
            }
        }

        let conn = Connection::open(&path)
            .map_err(|e| format!("Failed to open {}: {}", path.display(), e))?;

        // WAL mode for better concurrent read performance across workers;
        // a busy timeout so two workers hitting the same message wait for
        // the constraint to arbitrate instead of erroring out
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")
            .map_err(|e| format!("Failed to enable WAL: {}", e))?;

        crate::migrations::run_migrations(&conn)?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| format!("Failed to enable foreign keys: {}", e))?;

        Ok(Self { conn })
    }

    /// Resolve the default database path: `~/.fieldops/fieldops.db`.
    fn db_path() -> Result<PathBuf, String> {
        let home = dirs::home_dir().ok_or("Home directory not found")?;
        Ok(home.join(".fieldops").join("fieldops.db"))
    }

    /// Current timestamp in the format the schema stores (RFC 3339).
    pub(crate) fn now() -> String {
        Utc::now().to_rfc3339()
    }
}


#[cfg(test)]
mod tests {
    use super::test_utils::test_db;

    #[test]
    fn test_open_applies_schema() {
        let db = test_db();
        let count: i64 = db
            .conn_ref()
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert!(count >= 1);
    }

    #[test]
    fn test_transaction_commits() {
        let db = test_db();
        db.with_transaction(|db| {
            db.conn_ref()
                .execute(
                    "INSERT INTO plots (id, plot_code) VALUES ('p1', '2A')",
                    [],
                )
                .map_err(|e| e.to_string())?;
            Ok(())
        })
        .unwrap();

        let count: i64 = db
            .conn_ref()
            .query_row("SELECT COUNT(*) FROM plots", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_transaction_rolls_back() {
        let db = test_db();
        let result: Result<(), String> = db.with_transaction(|db| {
            db.conn_ref()
                .execute(
                    "INSERT INTO plots (id, plot_code) VALUES ('p1', '2A')",
                    [],
                )
                .map_err(|e| e.to_string())?;
            Err("abort".to_string())
        });
        assert!(result.is_err());

        let count: i64 = db
            .conn_ref()
            .query_row("SELECT COUNT(*) FROM plots", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
