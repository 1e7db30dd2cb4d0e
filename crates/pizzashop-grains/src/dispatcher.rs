// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Invocation dispatcher.
//!
//! Every call follows the same path:
//!
//! 1. pin the activation through the directory (lease)
//! 2. take a place in the activation's execution queue (FIFO)
//! 3. load state on first use
//! 4. run the handler against a scratch copy of the state
//! 5. commit the copy and save it (write-through) unless the call is read-only
//!
//! Steps 1 and 2 happen synchronously inside [`GrainRef::call`], so calls on
//! one key run in the order `call` was invoked. The rest runs on its own
//! tokio task, and the caller giving up (a dropped future, a timeout) never
//! interrupts steps 4 and 5 half-way.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::directory::{ActivationInfo, ActivationLease, ExecutionTicket, GrainDirectory};
use crate::error::{GrainError, Result};
use crate::grain::{Grain, GrainContext};
use crate::key::{GrainKey, KeyKind};
use crate::persistence::Persistence;

/// A registered grain type: its handler, its activations and where its state lives.
pub(crate) struct GrainHost<G: Grain> {
    grain: G,
    directory: GrainDirectory<G::State>,
    persistence: Arc<dyn Persistence>,
}

impl<G: Grain> GrainHost<G> {
    pub(crate) fn new(grain: G, persistence: Arc<dyn Persistence>) -> Self {
        Self {
            grain,
            directory: GrainDirectory::new(),
            persistence,
        }
    }

    /// Steps 1 and 2: pin the activation so collection cannot remove it,
    /// then queue behind every earlier call on this key.
    fn enqueue(&self, key: &GrainKey) -> (ActivationLease<G::State>, ExecutionTicket<G::State>) {
        let activation = self.directory.resolve_or_activate(key);
        let ticket = activation.queue();
        (activation, ticket)
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn dispatch(
        &self,
        key: &GrainKey,
        activation: ActivationLease<G::State>,
        ticket: ExecutionTicket<G::State>,
        request: G::Request,
    ) -> Result<G::Response> {
        // 2. Wait for every earlier call on this key to finish
        let mut slot = ticket.wait().await;

        // 3. Activate on first use
        let loaded = activation
            .ensure_loaded(&mut slot, self.persistence.as_ref())
            .await?;

        // 4. Run the handler on a scratch copy
        let read_only = G::is_read_only(&request);
        let mut scratch = loaded.state.clone();
        let ctx = GrainContext::new(key, activation.activated_at().unwrap_or_else(Utc::now));

        let response = self
            .grain
            .handle(&ctx, &mut scratch, request)
            .map_err(|e| {
                debug!(error = %e, "Grain call rejected");
                GrainError::invocation(key, e)
            })?;

        if read_only {
            return Ok(response);
        }

        // 5. Commit and write through while still holding the execution lock
        let bytes = serde_json::to_vec(&scratch).map_err(|e| GrainError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        loaded.state = scratch;

        match self
            .persistence
            .save_state(key, &bytes, loaded.version)
            .await
        {
            Ok(version) => {
                loaded.version = version;
                Ok(response)
            }
            Err(e) => {
                warn!(error = %e, version = loaded.version, "Failed to save grain state");
                Err(GrainError::Persistence {
                    key: key.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

/// Typed handle to one grain.
///
/// References are cheap to clone and hold no activation: the grain is
/// activated by the first call and may be collected between calls.
pub struct GrainRef<G: Grain> {
    host: Arc<GrainHost<G>>,
    key: GrainKey,
}

impl<G: Grain> Clone for GrainRef<G> {
    fn clone(&self) -> Self {
        Self {
            host: self.host.clone(),
            key: self.key.clone(),
        }
    }
}

impl<G: Grain> std::fmt::Debug for GrainRef<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrainRef").field("key", &self.key).finish()
    }
}

impl<G: Grain> GrainRef<G> {
    pub(crate) fn new(host: Arc<GrainHost<G>>, key: GrainKey) -> Self {
        Self { host, key }
    }

    /// The grain this reference addresses.
    pub fn key(&self) -> &GrainKey {
        &self.key
    }

    /// Submit a call to the grain. The returned future resolves to its result.
    ///
    /// The call is queued and started before this returns: calls on one key
    /// run in the order `call` was invoked, and dropping the returned future
    /// stops waiting but does not cancel the call. Must be invoked from
    /// within a tokio runtime.
    pub fn call(
        &self,
        request: G::Request,
    ) -> impl Future<Output = Result<G::Response>> + Send + use<G> {
        let host = self.host.clone();
        let key = self.key.clone();

        let (activation, ticket) = host.enqueue(&key);
        let task = {
            let key = key.clone();
            tokio::spawn(async move { host.dispatch(&key, activation, ticket, request).await })
        };

        async move {
            task.await.map_err(|e| GrainError::Aborted {
                key: key.to_string(),
                reason: e.to_string(),
            })?
        }
    }

    /// Call the grain, giving up after `timeout`.
    ///
    /// A [`GrainError::Timeout`] means the outcome is unknown: the call may
    /// still complete, including its write-through save.
    pub async fn call_with_timeout(
        &self,
        request: G::Request,
        timeout: Duration,
    ) -> Result<G::Response> {
        match tokio::time::timeout(timeout, self.call(request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(key = %self.key, timeout_ms = timeout.as_millis(), "Grain call timed out");
                Err(GrainError::Timeout {
                    key: self.key.to_string(),
                    after_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                })
            }
        }
    }
}

// ============================================================================
// Type-erased hosts (call-by-name surface)
// ============================================================================

/// A grain host with the grain type erased, so the runtime can keep hosts of
/// different grain types in one registry.
#[async_trait]
pub(crate) trait DynGrainHost: Send + Sync {
    fn grain_type(&self) -> &'static str;

    fn key_kind(&self) -> KeyKind;

    /// Decode `(method, args)` into the grain's request, run it and encode the response.
    async fn invoke_json(self: Arc<Self>, raw_key: &str, method: &str, args: Value)
    -> Result<Value>;

    fn deactivate(&self, key: &GrainKey) -> bool;

    fn collect_idle(&self, idle_timeout: Duration, now: Instant) -> usize;

    fn idle_activations(&self) -> Vec<(Instant, GrainKey)>;

    fn activation_count(&self) -> usize;

    fn activations(&self) -> Vec<ActivationInfo>;

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

#[async_trait]
impl<G: Grain> DynGrainHost for GrainHost<G> {
    fn grain_type(&self) -> &'static str {
        G::GRAIN_TYPE
    }

    fn key_kind(&self) -> KeyKind {
        G::KEY_KIND
    }

    async fn invoke_json(
        self: Arc<Self>,
        raw_key: &str,
        method: &str,
        args: Value,
    ) -> Result<Value> {
        let key = GrainKey::parse(G::GRAIN_TYPE, G::KEY_KIND, raw_key)?;
        let request = decode_request::<G>(method, args)?;

        let response = GrainRef::new(self, key.clone()).call(request).await?;

        serde_json::to_value(response).map_err(|e| GrainError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    fn deactivate(&self, key: &GrainKey) -> bool {
        self.directory.deactivate(key)
    }

    fn collect_idle(&self, idle_timeout: Duration, now: Instant) -> usize {
        self.directory.collect_idle(idle_timeout, now)
    }

    fn idle_activations(&self) -> Vec<(Instant, GrainKey)> {
        self.directory.idle_activations()
    }

    fn activation_count(&self) -> usize {
        self.directory.len()
    }

    fn activations(&self) -> Vec<ActivationInfo> {
        self.directory.snapshot()
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Build the `{"method": .., "args": ..}` envelope and decode it. `args` is
/// omitted when null so argument-less methods decode as unit variants.
fn decode_request<G: Grain>(method: &str, args: Value) -> Result<G::Request> {
    let mut envelope = serde_json::Map::new();
    envelope.insert("method".to_string(), Value::String(method.to_string()));
    if !args.is_null() {
        envelope.insert("args".to_string(), args);
    }

    serde_json::from_value(Value::Object(envelope)).map_err(|e| GrainError::InvalidRequest {
        grain_type: G::GRAIN_TYPE.to_string(),
        method: method.to_string(),
        reason: e.to_string(),
    })
}
