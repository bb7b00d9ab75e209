// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response bodies for the REST API. All types derive
//! `ToSchema` for the OpenAPI document.
//!
//! ## Model Categories
//!
//! - **Auth**: login and session issuance
//! - **Users**: the current user and the admin user list
//! - **Roles**: the role set and manual reassignment
//! - **Access**: guard decision previews

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{
    AllowedRoles, Capabilities, FallbackProfile, IdentitySource, Role, RoleAssignmentResult,
    RoleKind,
};
use crate::storage::StoredUser;

// =============================================================================
// Auth
// =============================================================================

/// Login request.
///
/// At least one of `id_token` or `profile` must be present. The token is
/// preferred; the profile is used only when the token is absent or rejected.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct LoginRequest {
    /// ID token issued by the identity provider.
    #[serde(default)]
    pub id_token: Option<String>,
    /// Client-supplied profile (fallback identity).
    #[serde(default)]
    pub profile: Option<FallbackProfile>,
}

/// Successful login.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LoginResponse {
    /// Opaque session token; send as `Authorization: Bearer <token>`.
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// Whether this login created the user.
    pub created: bool,
    /// Where the accepted identity came from.
    pub identity_source: IdentitySource,
    /// What the role resolver decided.
    pub assignment: RoleAssignmentResult,
    pub user: UserResponse,
}

// =============================================================================
// Users
// =============================================================================

/// A user as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct UserResponse {
    pub user_id: String,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// Assigned role, `null` if none.
    pub role: Option<RoleKind>,
    /// Capabilities of the assigned role (all false without one).
    pub capabilities: Capabilities,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserResponse {
    /// Build from a stored user and the stored definition of their role.
    pub fn new(user: StoredUser, role: Option<&Role>) -> Self {
        Self {
            user_id: user.id,
            email: user.email,
            name: user.name,
            external_id: user.external_id,
            role: user.role,
            capabilities: role.map(|r| r.capabilities).unwrap_or_default(),
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Admin user list.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserListResponse {
    pub users: Vec<UserResponse>,
    pub total: usize,
}

// =============================================================================
// Roles
// =============================================================================

/// The role set.
#[derive(Debug, Serialize, ToSchema)]
pub struct RoleListResponse {
    pub roles: Vec<Role>,
}

/// Manual role reassignment.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateRoleRequest {
    /// New role name (case-insensitive).
    pub role: RoleKind,
}

/// Result of a manual role reassignment.
#[derive(Debug, Serialize, ToSchema)]
pub struct UpdateRoleResponse {
    pub previous_role: Option<RoleKind>,
    pub user: UserResponse,
}

// =============================================================================
// Access
// =============================================================================

/// Guard decision for the current user on one resource.
#[derive(Debug, Serialize, ToSchema)]
pub struct AccessCheckResponse {
    pub resource: String,
    pub allowed: bool,
    /// The user's assigned role.
    pub current_role: Option<RoleKind>,
    /// Role the guard checked (the fallback when no role is assigned).
    pub effective_role: Option<RoleKind>,
    pub allowed_roles: AllowedRoles,
}
