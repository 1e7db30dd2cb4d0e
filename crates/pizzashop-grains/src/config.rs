// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::path::PathBuf;
use std::time::Duration;

/// Default idle time before an activation is collected (15 minutes).
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(900);

/// Default interval between collection passes.
pub const DEFAULT_COLLECTION_INTERVAL: Duration = Duration::from_secs(60);

/// Grain runtime configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// SQLite file for grain state. `None` keeps state in memory.
    pub database_path: Option<PathBuf>,
    /// Idle time after which an activation is collected. `None` disables idle collection.
    pub idle_timeout: Option<Duration>,
    /// How often the collector runs.
    pub collection_interval: Duration,
    /// Upper bound on resident activations across all grain types.
    pub max_activations: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            idle_timeout: Some(DEFAULT_IDLE_TIMEOUT),
            collection_interval: DEFAULT_COLLECTION_INTERVAL,
            max_activations: None,
        }
    }
}

/// When activations become eligible for collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionPolicy {
    /// Collect activations idle for at least this long.
    pub idle_timeout: Option<Duration>,
    /// After idle collection, collect least recently used idle activations above this count.
    pub max_activations: Option<usize>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional (with defaults):
    /// - `PIZZASHOP_DATABASE_PATH`: SQLite file for grain state (default: in-memory)
    /// - `PIZZASHOP_IDLE_TIMEOUT_SECS`: idle collection age, `0` disables (default: 900)
    /// - `PIZZASHOP_COLLECTION_INTERVAL_SECS`: collector period (default: 60)
    /// - `PIZZASHOP_MAX_ACTIVATIONS`: resident activation cap over all grain types (default: unbounded)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_path = std::env::var("PIZZASHOP_DATABASE_PATH")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        let idle_timeout_secs: u64 = std::env::var("PIZZASHOP_IDLE_TIMEOUT_SECS")
            .unwrap_or_else(|_| DEFAULT_IDLE_TIMEOUT.as_secs().to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid(
                    "PIZZASHOP_IDLE_TIMEOUT_SECS",
                    "must be a non-negative integer",
                )
            })?;

        let collection_interval_secs: u64 = std::env::var("PIZZASHOP_COLLECTION_INTERVAL_SECS")
            .unwrap_or_else(|_| DEFAULT_COLLECTION_INTERVAL.as_secs().to_string())
            .parse()
            .ok()
            .filter(|secs| *secs > 0)
            .ok_or(ConfigError::Invalid(
                "PIZZASHOP_COLLECTION_INTERVAL_SECS",
                "must be a positive integer",
            ))?;

        let max_activations = match std::env::var("PIZZASHOP_MAX_ACTIVATIONS") {
            Ok(raw) => Some(
                raw.parse::<usize>()
                    .ok()
                    .filter(|max| *max > 0)
                    .ok_or(ConfigError::Invalid(
                        "PIZZASHOP_MAX_ACTIVATIONS",
                        "must be a positive integer",
                    ))?,
            ),
            Err(_) => None,
        };

        Ok(Self {
            database_path,
            idle_timeout: (idle_timeout_secs > 0).then(|| Duration::from_secs(idle_timeout_secs)),
            collection_interval: Duration::from_secs(collection_interval_secs),
            max_activations,
        })
    }

    /// The collection policy, or `None` when nothing would ever be collected.
    pub fn collection_policy(&self) -> Option<CollectionPolicy> {
        if self.idle_timeout.is_none() && self.max_activations.is_none() {
            return None;
        }

        Some(CollectionPolicy {
            idle_timeout: self.idle_timeout,
            max_activations: self.max_activations,
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
