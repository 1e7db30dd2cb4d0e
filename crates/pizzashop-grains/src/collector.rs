// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Background worker that collects idle activations.
//!
//! Each pass:
//! 1. removes activations of every grain type idle for at least `idle_timeout`
//! 2. if `max_activations` is set and the runtime holds more activations in
//!    total, removes least recently used idle ones of any type until it fits
//!
//! Activations with pending calls are never touched. State is already
//! durable (write-through), so collection never saves anything.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::CollectionPolicy;
use crate::runtime::GrainClient;

/// Periodic activation collector.
pub struct ActivationCollector {
    client: GrainClient,
    policy: CollectionPolicy,
    interval: Duration,
    shutdown: Arc<Notify>,
}

impl ActivationCollector {
    /// Create a collector for the grains reachable through `client`.
    pub fn new(client: GrainClient, policy: CollectionPolicy, interval: Duration) -> Self {
        Self {
            client,
            policy,
            interval,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run one collection pass now. Returns the number of activations removed.
    pub fn collect_once(&self) -> usize {
        self.client.collect(&self.policy, Instant::now())
    }

    /// Run the collector loop until the shutdown signal is received.
    pub async fn run(&self) {
        info!(
            interval_secs = self.interval.as_secs(),
            idle_timeout_secs = self.policy.idle_timeout.map(|t| t.as_secs()),
            max_activations = self.policy.max_activations,
            "Activation collector started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Activation collector received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(self.interval) => {
                    let removed = self.collect_once();
                    debug!(
                        removed = removed,
                        resident = self.client.activation_count(),
                        "Collection pass finished"
                    );
                }
            }
        }

        info!("Activation collector stopped");
    }
}
