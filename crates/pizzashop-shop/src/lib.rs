// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PizzaShop storefront on top of the grain runtime.
//!
//! ```text
//!  sign_in ───────────▶ user grain (profile)
//!                          ▲ display name
//!  place_order ──────────┬─┘
//!                        ├──▶ order grain (fresh UUID)
//!                        └──▶ AdminDashboard ◀── view (display names via user grains)
//!
//!  demo ─────────────────────▶ counter grain ("counter")
//! ```
//!
//! # Modules
//!
//! - [`grains`]: user, order, counter and calculator grain types
//! - [`ordering`]: order placement and sign-in profile sync
//! - [`dashboard`]: in-memory admin dashboard

pub mod dashboard;
pub mod grains;
pub mod ordering;

pub use dashboard::{AdminDashboard, DashboardSnapshot, DashboardView, OrderOverview, UserSummary};
pub use ordering::{IdentityClaims, OrderError, OrderItem, OrderService, PlacedOrder};

use pizzashop_grains::GrainRuntimeBuilder;

use crate::grains::{CalculatorGrain, CounterGrain, OrderGrain, UserGrain};

/// Register every storefront grain type on a runtime builder.
pub fn register_grains(builder: GrainRuntimeBuilder) -> GrainRuntimeBuilder {
    builder
        .register(UserGrain)
        .register(OrderGrain)
        .register(CounterGrain)
        .register(CalculatorGrain)
}
