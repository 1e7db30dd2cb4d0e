// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence interfaces and backends for grain state.
//!
//! The directory calls [`Persistence::load_state`] when a grain activates and
//! [`Persistence::save_state`] after every mutating call (write-through). State
//! is handed over as serialized JSON bytes so backends never need to know the
//! concrete state types.

pub mod memory;
pub mod sqlite;

pub use self::memory::MemoryPersistence;
pub use self::sqlite::SqlitePersistence;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::key::GrainKey;

/// Stored grain state.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct GrainStateRecord {
    /// Serialized state (JSON).
    pub state: Vec<u8>,
    /// Monotonic version, 1 after the first save.
    pub version: i64,
    /// When the state was last written.
    pub updated_at: DateTime<Utc>,
}

/// Errors raised by persistence backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// IO error (file system).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The stored version moved since this activation loaded it.
    #[error("version conflict for '{key}': expected {expected}, found {actual}")]
    VersionConflict {
        /// The grain key.
        key: String,
        /// Version the activation loaded.
        expected: i64,
        /// Version currently stored.
        actual: i64,
    },

    /// Backend-specific failure.
    #[error("{0}")]
    Backend(String),
}

/// Persistence interface used by the grain directory.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Load the stored state for a grain, `None` if it was never saved.
    async fn load_state(&self, key: &GrainKey) -> Result<Option<GrainStateRecord>, StorageError>;

    /// Save a grain's state.
    ///
    /// `expected_version` is the version observed at load time (0 if nothing
    /// was stored). Returns the new version.
    async fn save_state(
        &self,
        key: &GrainKey,
        state: &[u8],
        expected_version: i64,
    ) -> Result<i64, StorageError>;
}

/// Persistence that stores nothing.
///
/// Every activation starts from the zero value and collected activations
/// lose their state. Useful as a pure in-memory actor cache.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPersistence;

#[async_trait]
impl Persistence for NoopPersistence {
    async fn load_state(&self, _key: &GrainKey) -> Result<Option<GrainStateRecord>, StorageError> {
        Ok(None)
    }

    async fn save_state(
        &self,
        _key: &GrainKey,
        _state: &[u8],
        expected_version: i64,
    ) -> Result<i64, StorageError> {
        Ok(expected_version + 1)
    }
}
