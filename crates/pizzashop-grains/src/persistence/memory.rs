// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Process-local persistence.
//!
//! Keeps saved state in a map so it survives activation collection, but not
//! a process restart.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::key::GrainKey;

use super::{GrainStateRecord, Persistence, StorageError};

/// In-memory persistence provider.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    records: RwLock<HashMap<String, GrainStateRecord>>,
}

impl MemoryPersistence {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of grains with stored state.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether nothing has been stored yet.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn load_state(&self, key: &GrainKey) -> Result<Option<GrainStateRecord>, StorageError> {
        let records = self.records.read().await;
        Ok(records.get(&key.to_string()).cloned())
    }

    async fn save_state(
        &self,
        key: &GrainKey,
        state: &[u8],
        expected_version: i64,
    ) -> Result<i64, StorageError> {
        let mut records = self.records.write().await;
        let storage_key = key.to_string();

        let actual = records.get(&storage_key).map(|r| r.version).unwrap_or(0);
        if actual != expected_version {
            return Err(StorageError::VersionConflict {
                key: storage_key,
                expected: expected_version,
                actual,
            });
        }

        let version = actual + 1;
        records.insert(
            storage_key,
            GrainStateRecord {
                state: state.to_vec(),
                version,
                updated_at: Utc::now(),
            },
        );

        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyKind;

    fn user_key(name: &str) -> GrainKey {
        GrainKey::new("user", KeyKind::String, name).unwrap()
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let persistence = MemoryPersistence::new();
        let key = user_key("alice");

        assert!(persistence.load_state(&key).await.unwrap().is_none());

        let version = persistence.save_state(&key, b"{\"a\":1}", 0).await.unwrap();
        assert_eq!(version, 1);

        let record = persistence.load_state(&key).await.unwrap().unwrap();
        assert_eq!(record.state, b"{\"a\":1}");
        assert_eq!(record.version, 1);
        assert_eq!(persistence.len().await, 1);
    }

    #[tokio::test]
    async fn test_versions_advance() {
        let persistence = MemoryPersistence::new();
        let key = user_key("alice");

        let v1 = persistence.save_state(&key, b"1", 0).await.unwrap();
        let v2 = persistence.save_state(&key, b"2", v1).await.unwrap();
        assert_eq!(v2, 2);

        let record = persistence.load_state(&key).await.unwrap().unwrap();
        assert_eq!(record.state, b"2");
    }

    #[tokio::test]
    async fn test_stale_version_rejected() {
        let persistence = MemoryPersistence::new();
        let key = user_key("alice");

        persistence.save_state(&key, b"1", 0).await.unwrap();
        let err = persistence.save_state(&key, b"2", 0).await.unwrap_err();

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
    async fn test_keys_isolated() {
        let persistence = MemoryPersistence::new();
        persistence.save_state(&user_key("a"), b"a", 0).await.unwrap();
        persistence.save_state(&user_key("b"), b"b", 0).await.unwrap();

        let a = persistence.load_state(&user_key("a")).await.unwrap().unwrap();
        assert_eq!(a.state, b"a");
        assert_eq!(persistence.len().await, 2);
        assert!(!persistence.is_empty().await);
    }
}
