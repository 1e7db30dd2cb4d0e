// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Order grain, keyed by a caller-generated UUID.
//!
//! An order is written once by `create`. The grain does not validate or
//! recompute the total; callers build it from the line items.

use chrono::{DateTime, Utc};
use pizzashop_grains::{Grain, GrainContext, KeyKind};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Holds one order.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderGrain;

/// A placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    /// Same as the grain key.
    pub order_id: Uuid,
    pub user_id: String,
    pub user_name: String,
    /// Human-readable line items, e.g. `2x Margherita, 1x Diavola`.
    pub summary: String,
    pub total_amount: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Order state: nothing until `create` is called.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderState(pub Option<OrderRecord>);

/// Order calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "args", rename_all = "snake_case")]
pub enum OrderRequest {
    /// Record the order. Calling it again overwrites the record.
    Create {
        user_id: String,
        user_name: String,
        summary: String,
        total_amount: Decimal,
    },
    /// Read the order, `None` if it was never created.
    Get,
}

/// Rejected order calls.
#[derive(Debug, Error)]
pub enum OrderGrainError {
    /// The grain was addressed without a UUID key.
    #[error("order grains need a UUID key, got '{0}'")]
    NotAnOrderId(String),
}

impl Grain for OrderGrain {
    const GRAIN_TYPE: &'static str = "order";
    const KEY_KIND: KeyKind = KeyKind::Uuid;

    type State = OrderState;
    type Request = OrderRequest;
    type Response = Option<OrderRecord>;
    type Error = OrderGrainError;

    fn handle(
        &self,
        ctx: &GrainContext<'_>,
        state: &mut OrderState,
        request: OrderRequest,
    ) -> Result<Option<OrderRecord>, OrderGrainError> {
        match request {
            OrderRequest::Create {
                user_id,
                user_name,
                summary,
                total_amount,
            } => {
                let order_id = ctx
                    .primary_key_uuid()
                    .ok_or_else(|| OrderGrainError::NotAnOrderId(ctx.key().to_string()))?;

                state.0 = Some(OrderRecord {
                    order_id,
                    user_id,
                    user_name,
                    summary,
                    total_amount,
                    created_at: ctx.now(),
                });
                Ok(state.0.clone())
            }
            OrderRequest::Get => Ok(state.0.clone()),
        }
    }

    fn is_read_only(request: &OrderRequest) -> bool {
        matches!(request, OrderRequest::Get)
    }
}
