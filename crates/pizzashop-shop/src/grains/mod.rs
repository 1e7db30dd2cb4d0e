// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Storefront grain types.
//!
//! | Grain type | Key | State |
//! |------------|-----|-------|
//! | `user` | subject id (string) | [`UserProfile`] |
//! | `order` | order id (UUID) | [`OrderState`] |
//! | `counter` | name (string), `"counter"` for the demo | [`CounterState`] |
//! | `calculator` | any string | none |

pub mod calculator;
pub mod counter;
pub mod order;
pub mod user;

pub use calculator::{CalculatorError, CalculatorGrain, CalculatorRequest};
pub use counter::{CounterGrain, CounterRequest, CounterState, DEMO_COUNTER_KEY};
pub use order::{OrderGrain, OrderGrainError, OrderRecord, OrderRequest, OrderState};
pub use user::{UserError, UserGrain, UserProfile, UserRequest, UserResponse};
