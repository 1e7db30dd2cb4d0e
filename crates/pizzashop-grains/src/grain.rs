// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The grain handler contract.
//!
//! A grain type pairs a handler (the behaviour, shared by every activation of
//! the type) with a `State` (owned by exactly one activation). The runtime
//! guarantees that `handle` is never called concurrently for the same key, so
//! handlers contain no locking of their own.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::key::{GrainKey, KeyKind};

/// Behaviour of one grain type.
///
/// # Requests
///
/// `Request` is usually an enum with one variant per method. To be reachable
/// through the call-by-name surface ([`GrainClient::invoke`]) it must be
/// adjacently tagged:
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// #[serde(tag = "method", content = "args", rename_all = "snake_case")]
/// enum CounterRequest {
///     GetCount,
///     Increment,
/// }
/// ```
///
/// # Failure
///
/// Handlers receive a scratch copy of the state. If `handle` returns an
/// error the copy is discarded, so a failed call never leaves a partial
/// mutation behind.
///
/// [`GrainClient::invoke`]: crate::runtime::GrainClient::invoke
pub trait Grain: Send + Sync + 'static {
    /// Grain type name, unique within a runtime.
    const GRAIN_TYPE: &'static str;

    /// Kind of key this grain type is addressed by.
    const KEY_KIND: KeyKind;

    /// Per-activation state. `Default` is the zero value a never-seen key starts from.
    type State: Clone + Default + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Call payload (method plus arguments).
    type Request: Serialize + DeserializeOwned + Send + 'static;

    /// Call result.
    type Response: Serialize + DeserializeOwned + Send + 'static;

    /// Domain error returned when a call is rejected.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Execute one call against the activation's state.
    fn handle(
        &self,
        ctx: &GrainContext<'_>,
        state: &mut Self::State,
        request: Self::Request,
    ) -> Result<Self::Response, Self::Error>;

    /// Read-only calls skip the write-through save. Mutations a read-only
    /// call makes to its scratch state are discarded.
    fn is_read_only(request: &Self::Request) -> bool {
        let _ = request;
        false
    }
}

/// Per-call context handed to [`Grain::handle`].
#[derive(Debug, Clone, Copy)]
pub struct GrainContext<'a> {
    key: &'a GrainKey,
    activated_at: DateTime<Utc>,
}

impl<'a> GrainContext<'a> {
    pub(crate) fn new(key: &'a GrainKey, activated_at: DateTime<Utc>) -> Self {
        Self { key, activated_at }
    }

    /// The grain's own key.
    pub fn key(&self) -> &GrainKey {
        self.key
    }

    /// The key as a UUID, for UUID-keyed grains.
    pub fn primary_key_uuid(&self) -> Option<Uuid> {
        self.key.value().as_uuid()
    }

    /// The key as a string, for string-keyed grains.
    pub fn primary_key_str(&self) -> Option<&str> {
        self.key.value().as_str()
    }

    /// When this activation was created.
    pub fn activated_at(&self) -> DateTime<Utc> {
        self.activated_at
    }

    /// Current wall-clock time.
    pub fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
