// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PizzaShop Grains - Virtual Actor Runtime
//!
//! This crate provides a single-process virtual-actor runtime. A grain is an
//! addressable, stateful unit identified by a `(grain type, key)` pair. Grains
//! are never created explicitly: the first call addressed to a key activates
//! it, either from persisted state or from the type's zero value.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              Callers                                     │
//! │              (order placement, dashboard, demo binary)                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//!                                    │ GrainClient::grain / invoke
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           Dispatcher                                     │
//! │       one tokio task per call, per-activation FIFO execution lock        │
//! └─────────────────────────────────────────────────────────────────────────┘
//!           │ resolve_or_activate                          │ handle
//!           ▼                                              ▼
//! ┌───────────────────────┐                    ┌─────────────────────────────┐
//! │   Grain Directory     │                    │       Grain handler         │
//! │ key → Activation map  │                    │ (counter, user, order, ...) │
//! │ single map lock       │                    └─────────────────────────────┘
//! └───────────────────────┘
//!           │ load on activation / save on mutation (write-through)
//!           ▼
//! ┌───────────────────────┐
//! │     Persistence       │
//! │ noop / memory / sqlite│
//! └───────────────────────┘
//! ```
//!
//! # Guarantees
//!
//! | Property | How it holds |
//! |----------|--------------|
//! | One activation per key | Activations are registered under the directory map lock |
//! | Single writer | Every call on a key holds that activation's execution lock |
//! | FIFO per key | `GrainRef::call` queues on a fair `tokio::sync::Mutex` before spawning, so calls run in submission order |
//! | Cross-key parallelism | Each activation has its own lock; the map lock is never held across `.await` |
//! | No partial mutation | Handlers run on a scratch copy committed only on success |
//! | Write-through | Mutating calls save before the execution lock is released |
//!
//! # Activation Lifecycle
//!
//! ```text
//!   first call            load ok              idle ≥ timeout / deactivate
//! ┌──────────┐        ┌────────────┐        ┌─────────┐        ┌─────────┐
//! │ ABSENT   │──────▶ │ REGISTERED │──────▶ │ ACTIVE  │──────▶ │ ABSENT  │
//! └──────────┘        └────────────┘        └─────────┘        └─────────┘
//!                           │ load failed
//!                           ▼
//!                  ActivationError to caller,
//!                  next call retries the load
//! ```
//!
//! # Configuration
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `PIZZASHOP_DATABASE_PATH` | No | - | SQLite file for grain state (memory backend when unset) |
//! | `PIZZASHOP_IDLE_TIMEOUT_SECS` | No | `900` | Idle time before an activation is collected (`0` disables) |
//! | `PIZZASHOP_COLLECTION_INTERVAL_SECS` | No | `60` | How often the collector runs |
//! | `PIZZASHOP_MAX_ACTIVATIONS` | No | - | Upper bound on resident activations, all grain types together |
//!
//! # Modules
//!
//! - [`key`]: grain keys and key kinds
//! - [`grain`]: the handler contract implemented by every grain type
//! - [`directory`]: key → activation registry
//! - [`dispatcher`]: per-key serialized invocation and typed grain references
//! - [`persistence`]: storage contract and backends
//! - [`collector`]: idle activation collection
//! - [`runtime`]: runtime builder, client and shutdown
//! - [`config`]: configuration from environment variables
//! - [`error`]: error taxonomy

#![deny(missing_docs)]

/// Activation collection (idle eviction) worker.
pub mod collector;

/// Configuration loaded from environment variables.
pub mod config;

/// Key → activation registry with single-activation guarantees.
pub mod directory;

/// Per-key serialized call execution and typed grain references.
pub mod dispatcher;

/// Error types for grain calls and activation.
pub mod error;

/// The grain handler contract.
pub mod grain;

/// Grain keys.
pub mod key;

/// Persistence contract and storage backends.
pub mod persistence;

/// Runtime builder, client handle and lifecycle.
pub mod runtime;

pub use config::{CollectionPolicy, Config, ConfigError};
pub use directory::ActivationInfo;
pub use dispatcher::GrainRef;
pub use error::{GrainError, Result};
pub use grain::{Grain, GrainContext};
pub use key::{GrainKey, KeyKind, KeyValue};
pub use persistence::{
    GrainStateRecord, MemoryPersistence, NoopPersistence, Persistence, SqlitePersistence,
    StorageError,
};
pub use runtime::{GrainClient, GrainRuntime, GrainRuntimeBuilder, GrainRuntimeConfig};
