// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Stateless calculator grain.

use pizzashop_grains::{Grain, GrainContext, KeyKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default)]
pub struct CalculatorGrain;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "args", rename_all = "snake_case")]
pub enum CalculatorRequest {
    Add { l: i32, r: i32 },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CalculatorError {
    #[error("{l} + {r} overflows a 32-bit integer")]
    Overflow { l: i32, r: i32 },
}

impl Grain for CalculatorGrain {
    const GRAIN_TYPE: &'static str = "calculator";
    const KEY_KIND: KeyKind = KeyKind::String;

    type State = ();
    type Request = CalculatorRequest;
    type Response = i32;
    type Error = CalculatorError;

    fn handle(
        &self,
        _ctx: &GrainContext<'_>,
        _state: &mut (),
        request: CalculatorRequest,
    ) -> Result<i32, CalculatorError> {
        match request {
            CalculatorRequest::Add { l, r } => {
                l.checked_add(r).ok_or(CalculatorError::Overflow { l, r })
            }
        }
    }

    fn is_read_only(_request: &CalculatorRequest) -> bool {
        true
    }
}
