// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed persistence implementation.

use std::path::Path;

use chrono::Utc;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use tracing::debug;

use crate::key::GrainKey;

use super::{GrainStateRecord, Persistence, StorageError};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/sqlite");

/// SQLite-backed persistence provider.
#[derive(Clone)]
pub struct SqlitePersistence {
    pool: SqlitePool,
}

impl std::fmt::Debug for SqlitePersistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlitePersistence")
            .field("pool", &"...")
            .finish()
    }
}

impl SqlitePersistence {
    /// Create a new SQLite persistence provider from an existing, migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create and initialize a new SQLite persistence from a file path.
    ///
    /// This convenience constructor handles all setup:
    /// - Creates parent directories if they don't exist
    /// - Creates the database file if it doesn't exist
    /// - Connects to the database with sensible defaults
    /// - Runs all migrations
    ///
    /// # Example
    ///
    /// ```ignore
    /// let persistence = SqlitePersistence::from_path(".data/grains.db").await?;
    /// ```
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.to_string_lossy());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        MIGRATOR.run(&pool).await?;

        debug!(path = %path.display(), "SQLite grain storage ready");

        Ok(Self { pool })
    }

    /// Create a private in-memory database (one connection, never recycled).
    pub async fn in_memory() -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        MIGRATOR.run(&pool).await?;

        Ok(Self { pool })
    }

    /// The underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the pool, waiting for connections to be released.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn current_version(&self, key: &GrainKey) -> Result<i64, StorageError> {
        let version: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT version FROM grain_state
            WHERE grain_type = ? AND grain_key = ?
            "#,
        )
        .bind(key.grain_type())
        .bind(key.value().to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(version.map(|v| v.0).unwrap_or(0))
    }
}

#[async_trait::async_trait]
impl Persistence for SqlitePersistence {
    async fn load_state(&self, key: &GrainKey) -> Result<Option<GrainStateRecord>, StorageError> {
        let record = sqlx::query_as::<_, GrainStateRecord>(
            r#"
            SELECT state, version, updated_at
            FROM grain_state
            WHERE grain_type = ? AND grain_key = ?
            "#,
        )
        .bind(key.grain_type())
        .bind(key.value().to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn save_state(
        &self,
        key: &GrainKey,
        state: &[u8],
        expected_version: i64,
    ) -> Result<i64, StorageError> {
        let now = Utc::now();

        let result = if expected_version == 0 {
            sqlx::query(
                r#"
                INSERT INTO grain_state (grain_type, grain_key, state, version, updated_at)
                VALUES (?, ?, ?, 1, ?)
                ON CONFLICT (grain_type, grain_key) DO NOTHING
                "#,
            )
            .bind(key.grain_type())
            .bind(key.value().to_string())
            .bind(state)
            .bind(now)
            .execute(&self.pool)
            .await?
        } else {
            sqlx::query(
                r#"
                UPDATE grain_state
                SET state = ?, version = version + 1, updated_at = ?
                WHERE grain_type = ? AND grain_key = ? AND version = ?
                "#,
            )
            .bind(state)
            .bind(now)
            .bind(key.grain_type())
            .bind(key.value().to_string())
            .bind(expected_version)
            .execute(&self.pool)
            .await?
        };

        if result.rows_affected() == 0 {
            let actual = self.current_version(key).await?;
            return Err(StorageError::VersionConflict {
                key: key.to_string(),
                expected: expected_version,
                actual,
            });
        }

        Ok(expected_version + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyKind;
    use uuid::Uuid;

    fn order_key() -> GrainKey {
        GrainKey::new("order", KeyKind::Uuid, Uuid::new_v4()).unwrap()
    }

    #[tokio::test]
    async fn test_load_missing_state() {
        let persistence = SqlitePersistence::in_memory().await.unwrap();

        let result = persistence
            .load_state(&order_key())
            .await
            .expect("Query should succeed");

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_save_and_load_state() {
        let persistence = SqlitePersistence::in_memory().await.unwrap();
        let key = order_key();

        let version = persistence
            .save_state(&key, br#"{"summary":"2x Margherita"}"#, 0)
            .await
            .expect("Failed to save state");
        assert_eq!(version, 1);

        let record = persistence
            .load_state(&key)
            .await
            .expect("Failed to load state")
            .expect("State should exist");

        assert_eq!(record.state, br#"{"summary":"2x Margherita"}"#.to_vec());
        assert_eq!(record.version, 1);
    }

    #[tokio::test]
    async fn test_update_advances_version() {
        let persistence = SqlitePersistence::in_memory().await.unwrap();
        let key = order_key();

        let v1 = persistence.save_state(&key, b"1", 0).await.unwrap();
        let v2 = persistence.save_state(&key, b"2", v1).await.unwrap();
        assert_eq!(v2, 2);

        let record = persistence.load_state(&key).await.unwrap().unwrap();
        assert_eq!(record.state, b"2".to_vec());
        assert_eq!(record.version, 2);
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_conflict() {
        let persistence = SqlitePersistence::in_memory().await.unwrap();
        let key = order_key();

        persistence.save_state(&key, b"1", 0).await.unwrap();
        let err = persistence.save_state(&key, b"1", 0).await.unwrap_err();

        assert!(matches!(
            err,
            StorageError::VersionConflict {
                expected: 0,
                actual: 1,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_stale_update_is_conflict() {
        let persistence = SqlitePersistence::in_memory().await.unwrap();
        let key = order_key();

        persistence.save_state(&key, b"1", 0).await.unwrap();
        persistence.save_state(&key, b"2", 1).await.unwrap();
        let err = persistence.save_state(&key, b"3", 1).await.unwrap_err();

        assert!(matches!(
            err,
            StorageError::VersionConflict {
                expected: 1,
                actual: 2,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_grain_types_do_not_collide() {
        let persistence = SqlitePersistence::in_memory().await.unwrap();
        let user = GrainKey::new("user", KeyKind::String, "42").unwrap();
        let counter = GrainKey::new("counter", KeyKind::String, "42").unwrap();

        persistence.save_state(&user, b"user", 0).await.unwrap();
        persistence.save_state(&counter, b"counter", 0).await.unwrap();

        let record = persistence.load_state(&user).await.unwrap().unwrap();
        assert_eq!(record.state, b"user".to_vec());
    }

    #[tokio::test]
    async fn test_from_path_creates_directories() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("grains.db");
        let key = GrainKey::new("counter", KeyKind::String, "counter").unwrap();

        {
            let persistence = SqlitePersistence::from_path(&path).await.unwrap();
            persistence.save_state(&key, b"{\"count\":7}", 0).await.unwrap();
            persistence.close().await;
        }

        assert!(path.exists());

        let reopened = SqlitePersistence::from_path(&path).await.unwrap();
        let record = reopened.load_state(&key).await.unwrap().unwrap();
        assert_eq!(record.state, b"{\"count\":7}".to_vec());
    }
}
