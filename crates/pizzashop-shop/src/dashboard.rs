// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Admin dashboard aggregation.
//!
//! Order placement reports every created order here. The dashboard keeps
//! the set of users who ordered and the list of orders behind a single
//! lock; readers always get copies.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use pizzashop_grains::{GrainClient, GrainError};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::grains::{UserGrain, user};

/// One recorded order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderOverview {
    pub order_id: Uuid,
    pub user_id: String,
    pub user_name: String,
    pub summary: String,
    pub total_amount: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Copy of the dashboard contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DashboardSnapshot {
    /// Users who placed at least one order, sorted.
    pub user_ids: Vec<String>,
    /// Orders in the order they were recorded.
    pub orders: Vec<OrderOverview>,
}

/// A user with the display name their grain currently reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSummary {
    pub user_id: String,
    pub display_name: String,
}

/// Dashboard as shown to administrators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardView {
    pub users: Vec<UserSummary>,
    pub orders: Vec<OrderOverview>,
}

#[derive(Debug, Default)]
struct DashboardState {
    user_ids: BTreeSet<String>,
    orders: Vec<OrderOverview>,
}

/// In-memory admin dashboard shared by everything that places orders.
#[derive(Debug, Default)]
pub struct AdminDashboard {
    state: Mutex<DashboardState>,
}

impl AdminDashboard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, DashboardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a created order, stamped with the current time.
    pub fn register_order(
        &self,
        user_id: &str,
        user_name: &str,
        summary: &str,
        total_amount: Decimal,
        order_id: Uuid,
    ) {
        let overview = OrderOverview {
            order_id,
            user_id: user_id.to_string(),
            user_name: user_name.to_string(),
            summary: summary.to_string(),
            total_amount,
            created_at: Utc::now(),
        };

        let mut state = self.lock();
        state.user_ids.insert(user_id.to_string());
        state.orders.push(overview);
        debug!(order_id = %order_id, orders = state.orders.len(), "Order registered on dashboard");
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> DashboardSnapshot {
        let state = self.lock();
        DashboardSnapshot {
            user_ids: state.user_ids.iter().cloned().collect(),
            orders: state.orders.clone(),
        }
    }

    /// Snapshot with each user's current display name resolved through
    /// their user grain. Lookups run concurrently.
    pub async fn view(&self, client: &GrainClient) -> Result<DashboardView, GrainError> {
        let snapshot = self.snapshot();

        let users = try_join_all(snapshot.user_ids.into_iter().map(|user_id| async move {
            let grain = client.grain::<UserGrain>(user_id.as_str())?;
            let display_name = user::display_name(&grain).await?;
            Ok::<_, GrainError>(UserSummary {
                user_id,
                display_name,
            })
        }))
        .await?;

        Ok(DashboardView {
            users,
            orders: snapshot.orders,
        })
    }
}
