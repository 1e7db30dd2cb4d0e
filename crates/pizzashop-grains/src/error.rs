// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for grain calls.
//!
//! The taxonomy separates failures by what the caller can conclude:
//!
//! | Variant | State in memory | State on disk |
//! |---------|-----------------|---------------|
//! | `Activation` | untouched (never loaded) | untouched |
//! | `Invocation` | unchanged | unchanged |
//! | `Persistence` | advanced | unknown, may lag |
//! | `Timeout` | unknown | unknown |

use thiserror::Error;

/// Result type using GrainError
pub type Result<T> = std::result::Result<T, GrainError>;

/// Errors surfaced by the grain runtime to callers.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GrainError {
    /// Loading persisted state failed while activating a grain.
    ///
    /// Not retried by the runtime; the next call re-attempts activation.
    #[error("activation of grain '{key}' failed: {reason}")]
    Activation {
        /// The grain key.
        key: String,
        /// Why the load failed.
        reason: String,
    },

    /// The grain handler rejected the call. State was left unchanged.
    #[error("grain '{key}' rejected the call: {source}")]
    Invocation {
        /// The grain key.
        key: String,
        /// The handler's domain error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The call was applied in memory but the write-through save failed.
    #[error("grain '{key}' was updated in memory but its state could not be saved: {reason}")]
    Persistence {
        /// The grain key.
        key: String,
        /// Why the save failed.
        reason: String,
    },

    /// The key does not fit the grain type.
    #[error("invalid key '{key}' for grain type '{grain_type}': {reason}")]
    InvalidKey {
        /// The grain type.
        grain_type: String,
        /// The offending key.
        key: String,
        /// Why it was rejected.
        reason: String,
    },

    /// No handler is registered for the grain type.
    #[error("grain type '{grain_type}' is not registered")]
    UnknownGrainType {
        /// The grain type.
        grain_type: String,
    },

    /// A call-by-name request could not be decoded into a grain request.
    #[error("invalid request '{method}' for grain type '{grain_type}': {reason}")]
    InvalidRequest {
        /// The grain type.
        grain_type: String,
        /// The requested method.
        method: String,
        /// Decoding error.
        reason: String,
    },

    /// Grain state or a response could not be (de)serialized.
    #[error("serialization error for grain '{key}': {reason}")]
    Serialization {
        /// The grain key.
        key: String,
        /// Error details.
        reason: String,
    },

    /// The caller stopped waiting. The call may or may not have completed.
    #[error("call to grain '{key}' timed out after {after_ms}ms, outcome unknown")]
    Timeout {
        /// The grain key.
        key: String,
        /// How long the caller waited.
        after_ms: u64,
    },

    /// The task running the call ended abnormally (handler panic or runtime shutdown).
    #[error("call to grain '{key}' aborted: {reason}")]
    Aborted {
        /// The grain key.
        key: String,
        /// Error details.
        reason: String,
    },
}

impl GrainError {
    /// Wrap a handler error.
    pub fn invocation(
        key: impl ToString,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Invocation {
            key: key.to_string(),
            source: Box::new(source),
        }
    }

    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Activation { .. } => "ACTIVATION_FAILED",
            Self::Invocation { .. } => "INVOCATION_FAILED",
            Self::Persistence { .. } => "PERSISTENCE_FAILED",
            Self::InvalidKey { .. } => "INVALID_KEY",
            Self::UnknownGrainType { .. } => "UNKNOWN_GRAIN_TYPE",
            Self::InvalidRequest { .. } => "INVALID_REQUEST",
            Self::Serialization { .. } => "SERIALIZATION_ERROR",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Aborted { .. } => "ABORTED",
        }
    }

    /// Whether the in-memory state may have advanced past durable state.
    pub fn is_durability_uncertain(&self) -> bool {
        matches!(self, Self::Persistence { .. } | Self::Timeout { .. })
    }
}
