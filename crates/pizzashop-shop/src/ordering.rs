// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Order placement.
//!
//! Turns a basket into an order grain and reports it to the admin dashboard:
//! 1. reject empty baskets and baskets without a positive quantity
//! 2. reject a blank subject id
//! 3. resolve the user's display name through the user grain
//! 4. drop non-positive lines, price the rest and require a positive total
//!    that fits in a `Decimal`
//! 5. create the order grain under a fresh UUID
//! 6. register the order on the dashboard

use std::sync::Arc;

use pizzashop_grains::{GrainClient, GrainError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::dashboard::AdminDashboard;
use crate::grains::{OrderGrain, OrderRequest, UserGrain, UserRequest, user};

/// One basket line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub pizza_id: i32,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

impl OrderItem {
    /// Unit price times quantity, `None` if it does not fit in a [`Decimal`].
    pub fn line_total(&self) -> Option<Decimal> {
        self.unit_price.checked_mul(Decimal::from(self.quantity))
    }
}

/// Result of a successful placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlacedOrder {
    pub order_id: Uuid,
    pub total: Decimal,
}

/// Identity claims copied into the user grain at sign-in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub username: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Order placement errors
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("order must contain at least one pizza")]
    EmptyOrder,

    #[error("missing subject identifier")]
    MissingSubject,

    #[error("total amount must be greater than zero")]
    NonPositiveTotal,

    #[error("order total is too large")]
    TotalOverflow,

    #[error(transparent)]
    Grain(#[from] GrainError),
}

impl OrderError {
    /// Whether the caller sent something invalid, as opposed to the grain runtime failing.
    pub fn is_bad_request(&self) -> bool {
        !matches!(self, Self::Grain(_))
    }
}

/// Places orders and keeps user profiles in sync with sign-ins.
#[derive(Debug, Clone)]
pub struct OrderService {
    client: GrainClient,
    dashboard: Arc<AdminDashboard>,
}

impl OrderService {
    pub fn new(client: GrainClient, dashboard: Arc<AdminDashboard>) -> Self {
        Self { client, dashboard }
    }

    pub fn dashboard(&self) -> &Arc<AdminDashboard> {
        &self.dashboard
    }

    /// Place an order for `user_id`.
    #[instrument(skip(self, items), fields(items = items.len()))]
    pub async fn place_order(
        &self,
        user_id: &str,
        items: &[OrderItem],
    ) -> Result<PlacedOrder, OrderError> {
        if !items.iter().any(|item| item.quantity > 0) {
            return Err(OrderError::EmptyOrder);
        }

        if user_id.trim().is_empty() {
            return Err(OrderError::MissingSubject);
        }

        let user = self.client.grain::<UserGrain>(user_id)?;
        let user_name = user::display_name(&user).await?;

        let lines: Vec<&OrderItem> = items.iter().filter(|item| item.quantity > 0).collect();

        let total = lines
            .iter()
            .try_fold(Decimal::ZERO, |total, item| {
                item.line_total()?.checked_add(total)
            })
            .ok_or(OrderError::TotalOverflow)?;
        if total <= Decimal::ZERO {
            return Err(OrderError::NonPositiveTotal);
        }

        let summary = lines
            .iter()
            .map(|item| format!("{}x {}", item.quantity, item.name))
            .collect::<Vec<_>>()
            .join(", ");

        let order_id = Uuid::new_v4();
        self.client
            .grain::<OrderGrain>(order_id)?
            .call(OrderRequest::Create {
                user_id: user_id.to_string(),
                user_name: user_name.clone(),
                summary: summary.clone(),
                total_amount: total,
            })
            .await?;

        self.dashboard
            .register_order(user_id, &user_name, &summary, total, order_id);

        info!(order_id = %order_id, total = %total, "Order placed");

        Ok(PlacedOrder { order_id, total })
    }

    /// Write the signed-in user's claims into their user grain.
    #[instrument(skip(self, claims))]
    pub async fn sign_in(&self, user_id: &str, claims: IdentityClaims) -> Result<(), GrainError> {
        self.client
            .grain::<UserGrain>(user_id)?
            .call(UserRequest::SetProfile {
                username: claims.username,
                email: claims.email,
                first_name: claims.first_name,
                last_name: claims.last_name,
            })
            .await?;

        info!("User profile synchronized");
        Ok(())
    }
}
