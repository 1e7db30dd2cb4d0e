// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Grain runtime: registration, client handle and lifecycle.
//!
//! # Example
//!
//! ```rust,ignore
//! use pizzashop_grains::{Config, GrainRuntime};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = GrainRuntime::builder()
//!         .config(Config::from_env()?)
//!         .register(CounterGrain)
//!         .build()?
//!         .start()
//!         .await?;
//!
//!     let counter = runtime.client().grain::<CounterGrain>("counter")?;
//!     let value = counter.call(CounterRequest::Increment).await?;
//!
//!     runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, instrument};

use crate::collector::ActivationCollector;
use crate::config::{CollectionPolicy, Config};
use crate::directory::ActivationInfo;
use crate::dispatcher::{DynGrainHost, GrainHost, GrainRef};
use crate::error::GrainError;
use crate::grain::Grain;
use crate::key::{GrainKey, KeyValue};
use crate::persistence::{MemoryPersistence, Persistence, SqlitePersistence};

type HostFactory = Box<dyn FnOnce(Arc<dyn Persistence>) -> Arc<dyn DynGrainHost> + Send>;

/// Builder for creating a [`GrainRuntime`].
pub struct GrainRuntimeBuilder {
    persistence: Option<Arc<dyn Persistence>>,
    config: Config,
    grain_types: Vec<&'static str>,
    factories: Vec<HostFactory>,
}

impl std::fmt::Debug for GrainRuntimeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrainRuntimeBuilder")
            .field("persistence", &self.persistence.as_ref().map(|_| "..."))
            .field("config", &self.config)
            .field("grain_types", &self.grain_types)
            .finish()
    }
}

impl Default for GrainRuntimeBuilder {
    fn default() -> Self {
        Self {
            persistence: None,
            config: Config::default(),
            grain_types: Vec::new(),
            factories: Vec::new(),
        }
    }
}

impl GrainRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the persistence layer.
    ///
    /// Default: SQLite at `config.database_path` when set, otherwise
    /// [`MemoryPersistence`].
    pub fn persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Set the runtime configuration.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Register a grain type.
    pub fn register<G: Grain>(mut self, grain: G) -> Self {
        self.grain_types.push(G::GRAIN_TYPE);
        self.factories.push(Box::new(move |persistence| {
            Arc::new(GrainHost::new(grain, persistence)) as Arc<dyn DynGrainHost>
        }));
        self
    }

    /// Build the runtime configuration.
    ///
    /// Returns an error if a grain type was registered twice.
    pub fn build(self) -> Result<GrainRuntimeConfig> {
        let mut seen = std::collections::HashSet::new();
        for grain_type in &self.grain_types {
            if !seen.insert(*grain_type) {
                anyhow::bail!("grain type '{}' registered more than once", grain_type);
            }
        }

        Ok(GrainRuntimeConfig {
            persistence: self.persistence,
            config: self.config,
            factories: self.factories,
        })
    }
}

/// Configuration for a [`GrainRuntime`].
pub struct GrainRuntimeConfig {
    persistence: Option<Arc<dyn Persistence>>,
    config: Config,
    factories: Vec<HostFactory>,
}

impl std::fmt::Debug for GrainRuntimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrainRuntimeConfig")
            .field("persistence", &self.persistence.as_ref().map(|_| "..."))
            .field("config", &self.config)
            .field("grain_types", &self.factories.len())
            .finish()
    }
}

impl GrainRuntimeConfig {
    /// Start the runtime: open storage, register hosts and spawn the
    /// activation collector when collection is enabled.
    pub async fn start(self) -> Result<GrainRuntime> {
        let persistence: Arc<dyn Persistence> = match (self.persistence, &self.config.database_path)
        {
            (Some(persistence), _) => persistence,
            (None, Some(path)) => Arc::new(SqlitePersistence::from_path(path).await?),
            (None, None) => Arc::new(MemoryPersistence::new()),
        };

        let mut hosts: HashMap<&'static str, Arc<dyn DynGrainHost>> = HashMap::new();
        for factory in self.factories {
            let host = factory(persistence.clone());
            hosts.insert(host.grain_type(), host);
        }

        let client = GrainClient {
            hosts: Arc::new(hosts),
        };

        let collector = self.config.collection_policy().map(|policy| {
            let collector =
                ActivationCollector::new(client.clone(), policy, self.config.collection_interval);
            let shutdown = collector.shutdown_handle();
            let handle = tokio::spawn(async move {
                collector.run().await;
            });
            CollectorHandle { handle, shutdown }
        });

        info!(
            grain_types = ?client.grain_types(),
            collection = collector.is_some(),
            "GrainRuntime started"
        );

        Ok(GrainRuntime {
            client,
            persistence,
            collector,
        })
    }
}

struct CollectorHandle {
    handle: JoinHandle<()>,
    shutdown: Arc<Notify>,
}

/// A running grain runtime.
///
/// The runtime manages:
/// - one directory per registered grain type
/// - the activation collector (when enabled)
///
/// Call [`shutdown`](Self::shutdown) for graceful termination.
pub struct GrainRuntime {
    client: GrainClient,
    persistence: Arc<dyn Persistence>,
    collector: Option<CollectorHandle>,
}

impl GrainRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder() -> GrainRuntimeBuilder {
        GrainRuntimeBuilder::new()
    }

    /// Handle for calling grains. Clones share the same runtime.
    pub fn client(&self) -> GrainClient {
        self.client.clone()
    }

    /// Get a reference to the persistence layer.
    pub fn persistence(&self) -> &Arc<dyn Persistence> {
        &self.persistence
    }

    /// Check if the background collector is still running.
    pub fn is_collecting(&self) -> bool {
        self.collector
            .as_ref()
            .is_some_and(|collector| !collector.handle.is_finished())
    }

    /// Gracefully shut down the runtime.
    ///
    /// Stops the collector. Grain state needs no flush: every mutating call
    /// has already been saved.
    pub async fn shutdown(self) -> Result<()> {
        info!("GrainRuntime shutting down...");

        if let Some(collector) = self.collector {
            collector.shutdown.notify_one();

            if let Err(e) = collector.handle.await {
                error!("Activation collector task panicked: {}", e);
                return Err(anyhow::anyhow!("collector task panicked: {}", e));
            }
        }

        info!(
            resident = self.client.activation_count(),
            "GrainRuntime shutdown complete"
        );
        Ok(())
    }
}

/// Handle for calling grains.
///
/// Cheap to clone; every clone addresses the same activations.
#[derive(Clone)]
pub struct GrainClient {
    hosts: Arc<HashMap<&'static str, Arc<dyn DynGrainHost>>>,
}

impl std::fmt::Debug for GrainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrainClient")
            .field("grain_types", &self.grain_types())
            .finish()
    }
}

impl GrainClient {
    fn host(&self, grain_type: &str) -> Result<&Arc<dyn DynGrainHost>, GrainError> {
        self.hosts
            .get(grain_type)
            .ok_or_else(|| GrainError::UnknownGrainType {
                grain_type: grain_type.to_string(),
            })
    }

    /// Typed reference to the grain of type `G` with the given key.
    ///
    /// Fails with `UnknownGrainType` if `G` is not registered and with
    /// `InvalidKey` if the key does not match `G::KEY_KIND`.
    pub fn grain<G: Grain>(&self, key: impl Into<KeyValue>) -> Result<GrainRef<G>, GrainError> {
        let key = GrainKey::new(G::GRAIN_TYPE, G::KEY_KIND, key)?;

        let host = self
            .host(G::GRAIN_TYPE)?
            .clone()
            .as_any()
            .downcast::<GrainHost<G>>()
            .map_err(|_| GrainError::UnknownGrainType {
                grain_type: G::GRAIN_TYPE.to_string(),
            })?;

        Ok(GrainRef::new(host, key))
    }

    /// Call a grain by name.
    ///
    /// `method` and `args` are decoded into the grain's request type as
    /// `{"method": method, "args": args}`; pass `Value::Null` for methods
    /// without arguments. The key is parsed according to the grain type's
    /// key kind.
    #[instrument(skip(self, args))]
    pub async fn invoke(
        &self,
        grain_type: &str,
        key: &str,
        method: &str,
        args: Value,
    ) -> Result<Value, GrainError> {
        self.host(grain_type)?
            .clone()
            .invoke_json(key, method, args)
            .await
    }

    /// Remove an idle activation now. Returns whether one was removed.
    ///
    /// Activations with pending calls are left alone. The grain's state is
    /// already persisted; the next call re-activates it.
    pub fn deactivate(&self, grain_type: &str, key: &str) -> Result<bool, GrainError> {
        let host = self.host(grain_type)?;
        let key = GrainKey::parse(host.grain_type(), host.key_kind(), key)?;
        Ok(host.deactivate(&key))
    }

    /// Total number of resident activations across all grain types.
    pub fn activation_count(&self) -> usize {
        self.hosts.values().map(|host| host.activation_count()).sum()
    }

    /// Snapshot of every resident activation, ordered by key.
    pub fn activations(&self) -> Vec<ActivationInfo> {
        let mut activations: Vec<ActivationInfo> = self
            .hosts
            .values()
            .flat_map(|host| host.activations())
            .collect();
        activations.sort_by(|a, b| a.key.cmp(&b.key));
        activations
    }

    /// Registered grain type names, sorted.
    pub fn grain_types(&self) -> Vec<&'static str> {
        let mut types: Vec<&'static str> = self.hosts.keys().copied().collect();
        types.sort_unstable();
        types
    }

    /// One collection pass over every grain type.
    ///
    /// Idle-timeout collection runs per type. The activation cap applies to
    /// the whole client: least recently used idle activations of any type
    /// are removed until the total fits.
    pub(crate) fn collect(&self, policy: &CollectionPolicy, now: Instant) -> usize {
        let mut removed = 0;

        if let Some(idle_timeout) = policy.idle_timeout {
            removed += self
                .hosts
                .values()
                .map(|host| host.collect_idle(idle_timeout, now))
                .sum::<usize>();
        }

        if let Some(max) = policy.max_activations {
            let resident = self.activation_count();
            if resident > max {
                let mut idle: Vec<(Instant, GrainKey, &Arc<dyn DynGrainHost>)> = self
                    .hosts
                    .values()
                    .flat_map(|host| {
                        host.idle_activations()
                            .into_iter()
                            .map(move |(last_used, key)| (last_used, key, host))
                    })
                    .collect();
                idle.sort_by_key(|(last_used, _, _)| *last_used);

                let mut excess = resident - max;
                let mut evicted = 0;
                for (_, key, host) in idle {
                    if excess == 0 {
                        break;
                    }
                    // A call may have pinned it since the listing
                    if host.deactivate(&key) {
                        excess -= 1;
                        evicted += 1;
                    }
                }

                if evicted > 0 {
                    info!(
                        evicted = evicted,
                        max_activations = max,
                        "Evicted least recently used activations"
                    );
                }
                removed += evicted;
            }
        }

        removed
    }
}
