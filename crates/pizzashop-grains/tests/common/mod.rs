// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared fixtures for grain runtime integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use pizzashop_grains::{
    Grain, GrainContext, GrainKey, GrainRuntime, GrainStateRecord, KeyKind, MemoryPersistence,
    Persistence, StorageError,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};

/// Counter-like grain with a call that always fails after mutating its scratch state.
pub struct Tally;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TallyState {
    pub count: i64,
    pub log: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "args", rename_all = "snake_case")]
pub enum TallyRequest {
    Get,
    Increment,
    Append { entry: String },
    Explode,
}

#[derive(Debug, thiserror::Error)]
#[error("tally exploded at {0}")]
pub struct Exploded(pub i64);

impl Grain for Tally {
    const GRAIN_TYPE: &'static str = "tally";
    const KEY_KIND: KeyKind = KeyKind::String;

    type State = TallyState;
    type Request = TallyRequest;
    type Response = TallyState;
    type Error = Exploded;

    fn handle(
        &self,
        _ctx: &GrainContext<'_>,
        state: &mut TallyState,
        request: TallyRequest,
    ) -> Result<TallyState, Exploded> {
        match request {
            TallyRequest::Get => {}
            TallyRequest::Increment => state.count += 1,
            TallyRequest::Append { entry } => state.log.push(entry),
            TallyRequest::Explode => {
                state.count += 1000;
                state.log.push("half-done".to_string());
                return Err(Exploded(state.count));
            }
        }
        Ok(state.clone())
    }

    fn is_read_only(request: &TallyRequest) -> bool {
        matches!(request, TallyRequest::Get)
    }
}

/// Start a runtime with only the tally grain and collection disabled.
pub async fn start_runtime(persistence: Arc<dyn Persistence>) -> GrainRuntime {
    GrainRuntime::builder()
        .config(pizzashop_grains::Config {
            idle_timeout: None,
            ..Default::default()
        })
        .persistence(persistence)
        .register(Tally)
        .build()
        .expect("runtime should build")
        .start()
        .await
        .expect("runtime should start")
}

/// Memory persistence whose saves for selected keys block until released.
#[derive(Default)]
pub struct GatedPersistence {
    inner: MemoryPersistence,
    gated: Mutex<HashSet<String>>,
    pub entered: Notify,
    pub release: Notify,
}

impl GatedPersistence {
    pub async fn gate(&self, key: &str) {
        self.gated.lock().await.insert(key.to_string());
    }

    pub async fn ungate(&self, key: &str) {
        self.gated.lock().await.remove(key);
    }

    pub fn inner(&self) -> &MemoryPersistence {
        &self.inner
    }
}

#[async_trait]
impl Persistence for GatedPersistence {
    async fn load_state(&self, key: &GrainKey) -> Result<Option<GrainStateRecord>, StorageError> {
        self.inner.load_state(key).await
    }

    async fn save_state(
        &self,
        key: &GrainKey,
        state: &[u8],
        expected_version: i64,
    ) -> Result<i64, StorageError> {
        let gated = self.gated.lock().await.contains(&key.to_string());
        if gated {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.save_state(key, state, expected_version).await
    }
}

/// Memory persistence that fails the next `n` loads or saves on demand.
#[derive(Default)]
pub struct FlakyPersistence {
    pub inner: MemoryPersistence,
    failing_loads: AtomicUsize,
    failing_saves: AtomicUsize,
    pub loads: AtomicUsize,
}

impl FlakyPersistence {
    pub fn fail_loads(&self, n: usize) {
        self.failing_loads.store(n, Ordering::SeqCst);
    }

    pub fn fail_saves(&self, n: usize) {
        self.failing_saves.store(n, Ordering::SeqCst);
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Persistence for FlakyPersistence {
    async fn load_state(&self, key: &GrainKey) -> Result<Option<GrainStateRecord>, StorageError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.failing_loads) {
            return Err(StorageError::Backend("storage unavailable".to_string()));
        }
        self.inner.load_state(key).await
    }

    async fn save_state(
        &self,
        key: &GrainKey,
        state: &[u8],
        expected_version: i64,
    ) -> Result<i64, StorageError> {
        if Self::take_failure(&self.failing_saves) {
            return Err(StorageError::Backend("disk full".to_string()));
        }
        self.inner.save_state(key, state, expected_version).await
    }
}
