//! Admin directory - the persistent allow-list of authorized users.
//!
//! Backed by a single SQLite table. Exactly one record is flagged as the
//! original (bootstrap) admin; that record cannot be removed through
//! [`AdminDirectory::remove`]. All database work runs on the blocking pool.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};

/// A single allow-list record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminRecord {
    pub user_id: String,
    pub is_original: bool,
    pub added_at: String,
}

/// Outcome of a remove operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    NotFound,
    /// The target is the original admin, which is never removed.
    Original,
}

/// SQLite-backed admin allow-list.
#[derive(Debug, Clone)]
pub struct AdminDirectory {
    db_path: PathBuf,
}

impl AdminDirectory {
    /// Open (or create) the directory database at `db_path`.
    pub fn open(db_path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS admins (
                user_id TEXT PRIMARY KEY,
                is_original INTEGER NOT NULL DEFAULT 0,
                added_at TEXT NOT NULL
            );
            "#,
        )?;

        Ok(Self {
            db_path: db_path.to_path_buf(),
        })
    }

    /// Insert the original admin record if it does not exist yet.
    ///
    /// Idempotent across restarts: steady state keeps exactly one record
    /// with `is_original = 1`.
    pub async fn bootstrap_original(&self, user_id: &str) -> anyhow::Result<()> {
        let db_path = self.db_path.clone();
        let user_id = user_id.to_string();

        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let conn = Connection::open(&db_path)?;
            let now = chrono::Utc::now().to_rfc3339();
            conn.execute(
                "INSERT OR IGNORE INTO admins (user_id, is_original, added_at) VALUES (?1, 1, ?2)",
                params![user_id, now],
            )?;
            Ok(())
        })
        .await?
    }

    /// Look up a record by user id.
    pub async fn find(&self, user_id: &str) -> anyhow::Result<Option<AdminRecord>> {
        let db_path = self.db_path.clone();
        let user_id = user_id.to_string();

        tokio::task::spawn_blocking(move || -> anyhow::Result<Option<AdminRecord>> {
            let conn = Connection::open(&db_path)?;
            let mut stmt = conn.prepare(
                "SELECT user_id, is_original, added_at FROM admins WHERE user_id = ?1",
            )?;
            let record = stmt
                .query_row(params![user_id], row_to_record)
                .optional()?;
            Ok(record)
        })
        .await?
    }

    /// Look up the original admin record.
    pub async fn find_original(&self) -> anyhow::Result<Option<AdminRecord>> {
        let db_path = self.db_path.clone();

        tokio::task::spawn_blocking(move || -> anyhow::Result<Option<AdminRecord>> {
            let conn = Connection::open(&db_path)?;
            let mut stmt = conn.prepare(
                "SELECT user_id, is_original, added_at FROM admins WHERE is_original = 1",
            )?;
            let record = stmt.query_row([], row_to_record).optional()?;
            Ok(record)
        })
        .await?
    }

    /// Add a user to the allow-list. A no-op when the id is already present.
    pub async fn insert(&self, user_id: &str) -> anyhow::Result<()> {
        let db_path = self.db_path.clone();
        let user_id = user_id.to_string();

        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let conn = Connection::open(&db_path)?;
            let now = chrono::Utc::now().to_rfc3339();
            conn.execute(
                "INSERT OR IGNORE INTO admins (user_id, is_original, added_at) VALUES (?1, 0, ?2)",
                params![user_id, now],
            )?;
            Ok(())
        })
        .await?
    }

    /// Remove a non-original user from the allow-list.
    pub async fn remove(&self, user_id: &str) -> anyhow::Result<RemoveOutcome> {
        let db_path = self.db_path.clone();
        let user_id = user_id.to_string();

        tokio::task::spawn_blocking(move || -> anyhow::Result<RemoveOutcome> {
            let conn = Connection::open(&db_path)?;
            let removed = conn.execute(
                "DELETE FROM admins WHERE user_id = ?1 AND is_original = 0",
                params![user_id],
            )?;
            if removed > 0 {
                return Ok(RemoveOutcome::Removed);
            }

            let mut stmt = conn.prepare("SELECT is_original FROM admins WHERE user_id = ?1")?;
            let is_original: Option<i64> = stmt
                .query_row(params![user_id], |row| row.get(0))
                .optional()?;
            match is_original {
                Some(_) => Ok(RemoveOutcome::Original),
                None => Ok(RemoveOutcome::NotFound),
            }
        })
        .await?
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<AdminRecord> {
    Ok(AdminRecord {
        user_id: row.get(0)?,
        is_original: row.get::<_, i64>(1)? != 0,
        added_at: row.get(2)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, AdminDirectory) {
        let dir = tempfile::TempDir::new().unwrap();
        let directory = AdminDirectory::open(&dir.path().join("admins.db")).unwrap();
        (dir, directory)
    }

    #[tokio::test]
    async fn bootstrap_is_idempotent() {
        let (_dir, directory) = open_temp();

        directory.bootstrap_original("42").await.unwrap();
        directory.bootstrap_original("42").await.unwrap();

        let original = directory.find_original().await.unwrap().unwrap();
        assert_eq!(original.user_id, "42");
        assert!(original.is_original);
    }

    #[tokio::test]
    async fn insert_and_find() {
        let (_dir, directory) = open_temp();

        assert!(directory.find("555").await.unwrap().is_none());
        directory.insert("555").await.unwrap();

        let record = directory.find("555").await.unwrap().unwrap();
        assert_eq!(record.user_id, "555");
        assert!(!record.is_original);
    }

    #[tokio::test]
    async fn remove_regular_admin() {
        let (_dir, directory) = open_temp();

        directory.insert("555").await.unwrap();
        assert_eq!(
            directory.remove("555").await.unwrap(),
            RemoveOutcome::Removed
        );
        assert!(directory.find("555").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn remove_missing_admin() {
        let (_dir, directory) = open_temp();
        assert_eq!(
            directory.remove("999").await.unwrap(),
            RemoveOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn original_admin_cannot_be_removed() {
        let (_dir, directory) = open_temp();

        directory.bootstrap_original("42").await.unwrap();
        assert_eq!(
            directory.remove("42").await.unwrap(),
            RemoveOutcome::Original
        );
        assert!(directory.find("42").await.unwrap().is_some());
    }
}
