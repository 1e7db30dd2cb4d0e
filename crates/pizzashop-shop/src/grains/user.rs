// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! User profile grain, keyed by the identity provider's subject id.

use pizzashop_grains::{Grain, GrainContext, GrainError, GrainRef, KeyKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Holds one user's profile.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserGrain;

/// Stored profile. Missing optional fields are stored as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

impl UserProfile {
    /// "First Last" when both names are known, otherwise the username.
    pub fn display_name(&self) -> String {
        if !self.first_name.is_empty() && !self.last_name.is_empty() {
            format!("{} {}", self.first_name, self.last_name)
        } else {
            self.username.clone()
        }
    }
}

/// User calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "args", rename_all = "snake_case")]
pub enum UserRequest {
    /// Replace the whole profile.
    SetProfile {
        username: String,
        #[serde(default)]
        email: Option<String>,
        #[serde(default)]
        first_name: Option<String>,
        #[serde(default)]
        last_name: Option<String>,
    },
    /// Read the profile.
    GetProfile,
    /// Read the name to show for this user.
    GetDisplayName,
}

/// User call results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserResponse {
    /// `set_profile` completed.
    Updated,
    /// The stored profile.
    Profile(UserProfile),
    /// The display name.
    DisplayName(String),
}

/// Rejected user calls.
#[derive(Debug, Error)]
pub enum UserError {
    /// `set_profile` without a username.
    #[error("username is required")]
    MissingUsername,
}

impl Grain for UserGrain {
    const GRAIN_TYPE: &'static str = "user";
    const KEY_KIND: KeyKind = KeyKind::String;

    type State = UserProfile;
    type Request = UserRequest;
    type Response = UserResponse;
    type Error = UserError;

    fn handle(
        &self,
        _ctx: &GrainContext<'_>,
        state: &mut UserProfile,
        request: UserRequest,
    ) -> Result<UserResponse, UserError> {
        match request {
            UserRequest::SetProfile {
                username,
                email,
                first_name,
                last_name,
            } => {
                if username.is_empty() {
                    return Err(UserError::MissingUsername);
                }

                *state = UserProfile {
                    username,
                    email: email.unwrap_or_default(),
                    first_name: first_name.unwrap_or_default(),
                    last_name: last_name.unwrap_or_default(),
                };
                Ok(UserResponse::Updated)
            }
            UserRequest::GetProfile => Ok(UserResponse::Profile(state.clone())),
            UserRequest::GetDisplayName => Ok(UserResponse::DisplayName(state.display_name())),
        }
    }

    fn is_read_only(request: &UserRequest) -> bool {
        !matches!(request, UserRequest::SetProfile { .. })
    }
}

/// Fetch a user's display name.
pub async fn display_name(user: &GrainRef<UserGrain>) -> Result<String, GrainError> {
    match user.call(UserRequest::GetDisplayName).await? {
        UserResponse::DisplayName(name) => Ok(name),
        other => Err(unexpected(user, &other)),
    }
}

/// Fetch a user's stored profile.
pub async fn profile(user: &GrainRef<UserGrain>) -> Result<UserProfile, GrainError> {
    match user.call(UserRequest::GetProfile).await? {
        UserResponse::Profile(profile) => Ok(profile),
        other => Err(unexpected(user, &other)),
    }
}

fn unexpected(user: &GrainRef<UserGrain>, response: &UserResponse) -> GrainError {
    GrainError::Serialization {
        key: user.key().to_string(),
        reason: format!("unexpected response {:?}", response),
    }
}
