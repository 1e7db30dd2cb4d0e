// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Key → activation registry.
//!
//! One directory exists per grain type. It owns the only map from key to
//! [`Activation`], guarded by a single `std::sync::Mutex` that is never held
//! across an `.await`. Everything a caller does with an activation happens
//! through an [`ActivationLease`], which keeps the activation's pending-call
//! count above zero for as long as the caller may touch it.
//!
//! The pending count is raised while the map lock is held, and collection
//! only removes activations whose count is zero while holding the same lock.
//! A removed activation can therefore never be in use, and the next call for
//! that key builds a fresh activation from persisted state.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use tokio::sync::OwnedMutexGuard;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{GrainError, Result};
use crate::key::{GrainKey, KeyValue};
use crate::persistence::Persistence;

/// State held by a loaded activation.
#[derive(Debug)]
pub struct LoadedState<S> {
    /// Current committed state.
    pub state: S,
    /// Version observed at load or returned by the last save (0 = never stored).
    pub version: i64,
}

/// A resident grain instance.
#[derive(Debug)]
pub struct Activation<S> {
    key: GrainKey,
    slot: Arc<tokio::sync::Mutex<Option<LoadedState<S>>>>,
    pending: AtomicUsize,
    last_used: Mutex<Instant>,
    activated_at: OnceLock<DateTime<Utc>>,
}

impl<S> Activation<S> {
    fn new(key: GrainKey) -> Self {
        Self {
            key,
            slot: Arc::new(tokio::sync::Mutex::new(None)),
            pending: AtomicUsize::new(0),
            last_used: Mutex::new(Instant::now()),
            activated_at: OnceLock::new(),
        }
    }

    /// The grain key.
    pub fn key(&self) -> &GrainKey {
        &self.key
    }

    /// Number of calls currently holding a lease on this activation.
    pub fn pending_calls(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// When the state was first loaded, `None` until a load succeeds.
    pub fn activated_at(&self) -> Option<DateTime<Utc>> {
        self.activated_at.get().copied()
    }

    /// When the last lease on this activation was released.
    pub fn last_used(&self) -> Instant {
        *lock(&self.last_used)
    }

    fn is_idle(&self) -> bool {
        self.pending_calls() == 0
    }

    /// Acquire the execution lock. Waiters are served in FIFO order.
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, Option<LoadedState<S>>> {
        self.slot.lock().await
    }
}

impl<S: Send + 'static> Activation<S> {
    /// Join the execution queue now, without waiting.
    ///
    /// The place in line is taken before this returns, so tickets created one
    /// after another are served in creation order no matter which task ends
    /// up waiting on them.
    pub fn queue(&self) -> ExecutionTicket<S> {
        // Unconstrained: an exhausted coop budget would return Pending
        // without joining the waiter list.
        let mut acquire: Pin<Box<SlotAcquire<S>>> =
            Box::pin(tokio::task::unconstrained(self.slot.clone().lock_owned()));

        // A pending acquire is now linked into the mutex's waiter list. The
        // waker is replaced by the real one on the next poll.
        let mut cx = Context::from_waker(Waker::noop());
        match acquire.as_mut().poll(&mut cx) {
            Poll::Ready(guard) => ExecutionTicket::Acquired(guard),
            Poll::Pending => ExecutionTicket::Waiting(acquire),
        }
    }
}

type SlotGuard<S> = OwnedMutexGuard<Option<LoadedState<S>>>;
type SlotAcquire<S> = dyn Future<Output = SlotGuard<S>> + Send;

/// A place in an activation's execution queue.
pub enum ExecutionTicket<S> {
    /// The lock was free when the ticket was taken.
    Acquired(SlotGuard<S>),
    /// Queued behind earlier calls.
    Waiting(Pin<Box<SlotAcquire<S>>>),
}

impl<S> ExecutionTicket<S> {
    /// Wait for the turn this ticket holds.
    pub async fn wait(self) -> SlotGuard<S> {
        match self {
            Self::Acquired(guard) => guard,
            Self::Waiting(acquire) => acquire.await,
        }
    }
}

impl<S> std::fmt::Debug for ExecutionTicket<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Acquired(_) => f.write_str("ExecutionTicket::Acquired"),
            Self::Waiting(_) => f.write_str("ExecutionTicket::Waiting"),
        }
    }
}

impl<S: Default + DeserializeOwned> Activation<S> {
    /// Make sure the slot holds loaded state, loading it from `persistence`
    /// if this is the first call since activation.
    ///
    /// A failed load leaves the slot empty, so the next call tries again.
    pub async fn ensure_loaded<'a>(
        &self,
        slot: &'a mut Option<LoadedState<S>>,
        persistence: &dyn Persistence,
    ) -> Result<&'a mut LoadedState<S>> {
        let loaded = match slot.take() {
            Some(loaded) => loaded,
            None => self.load(persistence).await?,
        };
        Ok(slot.insert(loaded))
    }

    async fn load(&self, persistence: &dyn Persistence) -> Result<LoadedState<S>> {
        let record = persistence
            .load_state(&self.key)
            .await
            .map_err(|e| GrainError::Activation {
                key: self.key.to_string(),
                reason: e.to_string(),
            })?;

        let loaded = match record {
            Some(record) => {
                let state =
                    serde_json::from_slice(&record.state).map_err(|e| GrainError::Activation {
                        key: self.key.to_string(),
                        reason: format!("stored state is unreadable: {}", e),
                    })?;
                LoadedState {
                    state,
                    version: record.version,
                }
            }
            None => LoadedState {
                state: S::default(),
                version: 0,
            },
        };

        let _ = self.activated_at.set(Utc::now());
        debug!(key = %self.key, version = loaded.version, "Grain activated");

        Ok(loaded)
    }
}

/// A counted reference to an activation.
///
/// While a lease exists the activation cannot be collected. Dropping the
/// lease records the last-use time and releases the count.
#[derive(Debug)]
pub struct ActivationLease<S> {
    activation: Arc<Activation<S>>,
}

impl<S> std::ops::Deref for ActivationLease<S> {
    type Target = Activation<S>;

    fn deref(&self) -> &Self::Target {
        &self.activation
    }
}

impl<S> Drop for ActivationLease<S> {
    fn drop(&mut self) {
        *lock(&self.activation.last_used) = Instant::now();
        self.activation.pending.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Snapshot of one resident activation.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ActivationInfo {
    /// Grain type.
    pub grain_type: &'static str,
    /// Display form of the key (`type/value`).
    pub key: String,
    /// When state was loaded, `None` while the first load is in progress.
    pub activated_at: Option<DateTime<Utc>>,
    /// Calls queued on or running against the activation.
    pub pending_calls: usize,
}

/// Registry of activations for one grain type.
#[derive(Debug)]
pub struct GrainDirectory<S> {
    activations: Mutex<HashMap<KeyValue, Arc<Activation<S>>>>,
}

impl<S> Default for GrainDirectory<S> {
    fn default() -> Self {
        Self {
            activations: Mutex::new(HashMap::new()),
        }
    }
}

impl<S> GrainDirectory<S> {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the activation for `key`, registering a new one if the key is
    /// not resident. The returned lease pins the activation.
    pub fn resolve_or_activate(&self, key: &GrainKey) -> ActivationLease<S> {
        let mut activations = lock(&self.activations);

        let activation = activations
            .entry(key.value().clone())
            .or_insert_with(|| Arc::new(Activation::new(key.clone())))
            .clone();
        activation.pending.fetch_add(1, Ordering::AcqRel);

        ActivationLease { activation }
    }

    /// Remove the activation for `key` if it is resident and idle.
    ///
    /// Returns `false` when the key is not resident or has calls pending.
    pub fn deactivate(&self, key: &GrainKey) -> bool {
        let mut activations = lock(&self.activations);

        match activations.get(key.value()) {
            Some(activation) if activation.is_idle() => {
                activations.remove(key.value());
                debug!(key = %key, "Grain deactivated");
                true
            }
            _ => false,
        }
    }

    /// Remove activations that have been idle for at least `idle_timeout`.
    /// Returns how many were removed.
    pub fn collect_idle(&self, idle_timeout: Duration, now: Instant) -> usize {
        let mut activations = lock(&self.activations);
        let before = activations.len();

        activations.retain(|_, activation| {
            !(activation.is_idle()
                && now.saturating_duration_since(activation.last_used()) >= idle_timeout)
        });

        let removed = before - activations.len();
        if removed > 0 {
            info!(
                removed = removed,
                remaining = activations.len(),
                "Collected idle activations"
            );
        }
        removed
    }

    /// Keys of the activations with no pending calls, with their last-use time.
    pub fn idle_activations(&self) -> Vec<(Instant, GrainKey)> {
        lock(&self.activations)
            .values()
            .filter(|activation| activation.is_idle())
            .map(|activation| (activation.last_used(), activation.key.clone()))
            .collect()
    }

    /// Number of resident activations.
    pub fn len(&self) -> usize {
        lock(&self.activations).len()
    }

    /// Whether no activation is resident.
    pub fn is_empty(&self) -> bool {
        lock(&self.activations).is_empty()
    }

    /// Whether `key` is resident.
    pub fn contains(&self, key: &GrainKey) -> bool {
        lock(&self.activations).contains_key(key.value())
    }

    /// Snapshot of the resident activations.
    pub fn snapshot(&self) -> Vec<ActivationInfo> {
        lock(&self.activations)
            .values()
            .map(|activation| ActivationInfo {
                grain_type: activation.key.grain_type(),
                key: activation.key.to_string(),
                activated_at: activation.activated_at(),
                pending_calls: activation.pending_calls(),
            })
            .collect()
    }
}

// Never held across a handler call, so poisoning cannot leave a half-written entry.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
