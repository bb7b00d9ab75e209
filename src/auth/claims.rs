// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authenticated user representation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::roles::RoleKind;
use super::session::Session;
use crate::storage::StoredUser;

/// The user behind the current request's session.
///
/// Built from the stored user record on every request, so a role change made
/// by staff takes effect on the user's next request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthenticatedUser {
    /// User ID
    pub user_id: String,

    /// Normalized email
    pub email: String,

    /// Display name
    pub name: String,

    /// Assigned role (`None` if the user never received one)
    pub role: Option<RoleKind>,

    /// Session token (used for logout, not serialized)
    #[serde(skip)]
    pub session_id: String,

    /// Session expiry
    pub session_expires_at: DateTime<Utc>,
}

impl AuthenticatedUser {
    pub fn from_session(user: StoredUser, session: &Session) -> Self {
        Self {
            user_id: user.id,
            email: user.email,
            name: user.name,
            role: user.role,
            session_id: session.token.clone(),
            session_expires_at: session.expires_at,
        }
    }

    /// Role name for display; `"none"` when unassigned.
    pub fn role_name(&self) -> &'static str {
        self.role.map_or("none", |r| r.as_str())
    }
}
