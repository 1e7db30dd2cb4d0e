// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Grain keys.
//!
//! A grain is addressed by its grain type plus a key value. The key value is
//! either an opaque string (user subject, well-known singleton names) or a
//! UUID (orders). Each grain type declares which [`KeyKind`] it accepts.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::GrainError;

/// The kind of key a grain type is addressed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    /// Opaque non-empty string key.
    String,
    /// 128-bit UUID key.
    Uuid,
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Uuid => write!(f, "uuid"),
        }
    }
}

/// The value part of a grain key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyValue {
    /// UUID key.
    Uuid(Uuid),
    /// String key.
    String(String),
}

impl KeyValue {
    /// Returns the kind of this key value.
    pub fn kind(&self) -> KeyKind {
        match self {
            Self::String(_) => KeyKind::String,
            Self::Uuid(_) => KeyKind::Uuid,
        }
    }

    /// Returns the UUID if this is a UUID key.
    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Self::Uuid(id) => Some(*id),
            Self::String(_) => None,
        }
    }

    /// Returns the string if this is a string key.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            Self::Uuid(_) => None,
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{}", s),
            Self::Uuid(id) => write!(f, "{}", id),
        }
    }
}

impl From<&str> for KeyValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Uuid> for KeyValue {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

/// Fully qualified grain identity: grain type plus key value.
///
/// Keys are immutable; uniqueness is scoped to the grain type, so
/// `user/42` and `counter/42` address different grains.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct GrainKey {
    grain_type: &'static str,
    value: KeyValue,
}

impl GrainKey {
    /// Create a key, checking that the value matches the expected kind.
    pub fn new(
        grain_type: &'static str,
        kind: KeyKind,
        value: impl Into<KeyValue>,
    ) -> Result<Self, GrainError> {
        let value = value.into();

        if value.kind() != kind {
            return Err(GrainError::InvalidKey {
                grain_type: grain_type.to_string(),
                key: value.to_string(),
                reason: format!("expected a {} key, got a {} key", kind, value.kind()),
            });
        }

        if let KeyValue::String(s) = &value
            && s.is_empty()
        {
            return Err(GrainError::InvalidKey {
                grain_type: grain_type.to_string(),
                key: String::new(),
                reason: "string keys must not be empty".to_string(),
            });
        }

        Ok(Self { grain_type, value })
    }

    /// Parse a textual key according to the grain type's key kind.
    ///
    /// This is how the call-by-name surface turns an external key into a
    /// grain identity.
    pub fn parse(grain_type: &'static str, kind: KeyKind, raw: &str) -> Result<Self, GrainError> {
        match kind {
            KeyKind::String => Self::new(grain_type, kind, raw),
            KeyKind::Uuid => {
                let id = Uuid::parse_str(raw).map_err(|e| GrainError::InvalidKey {
                    grain_type: grain_type.to_string(),
                    key: raw.to_string(),
                    reason: e.to_string(),
                })?;
                Self::new(grain_type, kind, id)
            }
        }
    }

    /// The grain type this key belongs to.
    pub fn grain_type(&self) -> &'static str {
        self.grain_type
    }

    /// The key value.
    pub fn value(&self) -> &KeyValue {
        &self.value
    }
}

impl fmt::Display for GrainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.grain_type, self.value)
    }
}
