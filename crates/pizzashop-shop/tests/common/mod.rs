// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared helpers for storefront integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use pizzashop_grains::{Config, GrainRuntime, MemoryPersistence};
use pizzashop_shop::{AdminDashboard, OrderItem, OrderService, register_grains};
use rust_decimal::Decimal;

/// Runtime with every storefront grain, memory storage and no background collection.
pub async fn start_runtime() -> GrainRuntime {
    let config = Config {
        idle_timeout: None,
        ..Config::default()
    };

    register_grains(
        GrainRuntime::builder()
            .config(config)
            .persistence(Arc::new(MemoryPersistence::new())),
    )
    .build()
    .expect("runtime should build")
    .start()
    .await
    .expect("runtime should start")
}

/// Runtime plus an order service with a fresh dashboard.
pub async fn start_shop() -> (GrainRuntime, OrderService) {
    let runtime = start_runtime().await;
    let service = OrderService::new(runtime.client(), Arc::new(AdminDashboard::new()));
    (runtime, service)
}

pub fn item(name: &str, quantity: i32, unit_price: Decimal) -> OrderItem {
    OrderItem {
        pizza_id: 1,
        name: name.to_string(),
        quantity,
        unit_price,
    }
}

/// Price with two decimal places, e.g. `price(1200)` is 12.00.
pub fn price(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}
