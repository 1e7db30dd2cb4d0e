// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Demo counter grain.

use std::convert::Infallible;

use pizzashop_grains::{Grain, GrainContext, KeyKind};
use serde::{Deserialize, Serialize};

/// Key of the storefront's singleton counter.
pub const DEMO_COUNTER_KEY: &str = "counter";

/// A counter that starts at zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct CounterGrain;

/// Counter state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterState {
    /// Current value.
    pub count: i64,
}

/// Counter calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "args", rename_all = "snake_case")]
pub enum CounterRequest {
    /// Read the current value.
    GetCount,
    /// Add one and return the new value.
    Increment,
}

impl Grain for CounterGrain {
    const GRAIN_TYPE: &'static str = "counter";
    const KEY_KIND: KeyKind = KeyKind::String;

    type State = CounterState;
    type Request = CounterRequest;
    type Response = i64;
    type Error = Infallible;

    fn handle(
        &self,
        _ctx: &GrainContext<'_>,
        state: &mut CounterState,
        request: CounterRequest,
    ) -> Result<i64, Infallible> {
        if let CounterRequest::Increment = request {
            state.count += 1;
        }
        Ok(state.count)
    }

    fn is_read_only(request: &CounterRequest) -> bool {
        matches!(request, CounterRequest::GetCount)
    }
}
