// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PizzaShop demo
//!
//! Starts the grain runtime with every storefront grain, signs in a demo
//! user, places an order, bumps the demo counter and prints the admin
//! dashboard.

use std::sync::Arc;

use anyhow::Result;
use rust_decimal::Decimal;
use tracing::{error, info};

use pizzashop_grains::{Config, GrainRuntime};
use pizzashop_shop::grains::{CounterGrain, CounterRequest, DEMO_COUNTER_KEY};
use pizzashop_shop::{AdminDashboard, IdentityClaims, OrderItem, OrderService, register_grains};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pizzashop_shop=info".parse()?)
                .add_directive("pizzashop_grains=info".parse()?),
        )
        .init();

    info!("Starting PizzaShop demo");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        database = ?config.database_path,
        idle_timeout_secs = config.idle_timeout.map(|t| t.as_secs()),
        max_activations = config.max_activations,
        "Configuration loaded"
    );

    let runtime = register_grains(GrainRuntime::builder().config(config))
        .build()?
        .start()
        .await?;
    let client = runtime.client();

    let dashboard = Arc::new(AdminDashboard::new());
    let orders = OrderService::new(client.clone(), dashboard.clone());

    orders
        .sign_in(
            "demo-user",
            IdentityClaims {
                username: "demo".to_string(),
                email: Some("demo@pizzashop.local".to_string()),
                first_name: Some("Demo".to_string()),
                last_name: Some("Customer".to_string()),
            },
        )
        .await?;

    let placed = orders
        .place_order(
            "demo-user",
            &[
                OrderItem {
                    pizza_id: 1,
                    name: "Margherita".to_string(),
                    quantity: 2,
                    unit_price: Decimal::new(1200, 2),
                },
                OrderItem {
                    pizza_id: 4,
                    name: "Diavola".to_string(),
                    quantity: 1,
                    unit_price: Decimal::new(1450, 2),
                },
            ],
        )
        .await?;
    info!(order_id = %placed.order_id, total = %placed.total, "Demo order placed");

    let visits = client
        .grain::<CounterGrain>(DEMO_COUNTER_KEY)?
        .call(CounterRequest::Increment)
        .await?;
    info!(visits, "Demo counter incremented");

    let view = dashboard.view(&client).await?;
    println!("{}", serde_json::to_string_pretty(&view)?);

    if let Err(e) = runtime.shutdown().await {
        error!("Shutdown error: {}", e);
        return Err(e);
    }

    info!("PizzaShop demo finished");
    Ok(())
}
