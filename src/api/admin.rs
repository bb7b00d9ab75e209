// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User-management endpoints.
//!
//! Mounted behind the access guard for the `user_management` resource:
//! - User list
//! - Manual role reassignment
//! - Audit log queries
//!
//! Manual reassignment is an explicit staff action and is not subject to
//! nurse immunity.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::Auth,
    error::ApiError,
    models::{UpdateRoleRequest, UpdateRoleResponse, UserListResponse, UserResponse},
    state::AppState,
    storage::{audit, AuditEvent, AuditEventType, AuditQuery, AuditRepository},
};

const DEFAULT_AUDIT_LIMIT: usize = 100;
const MAX_AUDIT_LIMIT: usize = 1000;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for audit log queries.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct AuditQueryParams {
    /// Filter by user ID.
    pub user_id: Option<String>,
    /// Filter by event type (e.g. `role_assigned`).
    pub event_type: Option<String>,
    /// Filter by resource type.
    pub resource_type: Option<String>,
    /// Filter by resource ID.
    pub resource_id: Option<String>,
    /// Maximum number of results (default 100, max 1000).
    pub limit: Option<usize>,
}

/// Response for audit log queries.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuditLogResponse {
    /// Matching events, newest first.
    pub events: Vec<AuditEvent>,
    /// Number of events returned.
    pub total: usize,
}

// ============================================================================
// Handlers
// ============================================================================

/// List all users with their roles.
#[utoipa::path(
    get,
    path = "/v1/admin/users",
    tag = "Admin",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "All users", body = UserListResponse),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Insufficient role")
    )
)]
pub async fn list_users(
    State(state): State<AppState>,
    Auth(_staff): Auth,
) -> Result<Json<UserListResponse>, ApiError> {
    let roles = state.db.list_roles()?;
    let users: Vec<UserResponse> = state
        .db
        .list_users()?
        .into_iter()
        .map(|user| {
            let role = user.role.and_then(|kind| roles.iter().find(|r| r.kind == kind));
            UserResponse::new(user, role)
        })
        .collect();

    let total = users.len();
    Ok(Json(UserListResponse { users, total }))
}

/// Reassign a user's role.
#[utoipa::path(
    put,
    path = "/v1/admin/users/{user_id}/role",
    tag = "Admin",
    security(("bearer" = [])),
    params(("user_id" = String, Path, description = "User ID")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Role updated", body = UpdateRoleResponse),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Insufficient role"),
        (status = 404, description = "User not found"),
        (status = 422, description = "Role is not in the role set")
    )
)]
pub async fn update_user_role(
    State(state): State<AppState>,
    Auth(staff): Auth,
    Path(user_id): Path<String>,
    Json(request): Json<UpdateRoleRequest>,
) -> Result<Json<UpdateRoleResponse>, ApiError> {
    let role = state.db.get_role(request.role)?.ok_or_else(|| {
        ApiError::unprocessable(format!("Role '{}' is not in the role set", request.role))
    })?;

    let mut user = state
        .db
        .get_user(&user_id)?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let previous_role = user.role;
    if previous_role != Some(role.kind) {
        user.role = Some(role.kind);
        user.updated_at = Utc::now();
        state.db.update_user(&user)?;

        audit::record(
            &state.db,
            AuditEvent::new(AuditEventType::RoleReassigned)
                .with_user(&staff.user_id)
                .with_resource("user", &user.id)
                .with_details(serde_json::json!({
                    "previous": previous_role,
                    "role": role.kind,
                })),
        );
        tracing::info!(
            staff_id = %staff.user_id,
            user_id = %user.id,
            previous = ?previous_role,
            role = %role.kind,
            "Role reassigned"
        );
    }

    Ok(Json(UpdateRoleResponse {
        previous_role,
        user: UserResponse::new(user, Some(&role)),
    }))
}

/// Query the audit log.
#[utoipa::path(
    get,
    path = "/v1/admin/audit",
    tag = "Admin",
    params(AuditQueryParams),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Audit events", body = AuditLogResponse),
        (status = 400, description = "Invalid query parameters"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Insufficient role")
    )
)]
pub async fn query_audit_log(
    State(state): State<AppState>,
    Auth(_staff): Auth,
    Query(params): Query<AuditQueryParams>,
) -> Result<Json<AuditLogResponse>, ApiError> {
    let event_type = params
        .event_type
        .as_deref()
        .map(|name| {
            AuditEventType::from_name(name)
                .ok_or_else(|| ApiError::bad_request(format!("Unknown event type: {name}")))
        })
        .transpose()?;

    let query = AuditQuery {
        user_id: params.user_id,
        event_type,
        resource_type: params.resource_type,
        resource_id: params.resource_id,
        limit: params
            .limit
            .unwrap_or(DEFAULT_AUDIT_LIMIT)
            .clamp(1, MAX_AUDIT_LIMIT),
    };

    let events = AuditRepository::new(&state.db).query(&query)?;
    let total = events.len();
    Ok(Json(AuditLogResponse { events, total }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthenticatedUser, RoleKind};
    use crate::state::test_support::{login_as, test_state};
    use crate::storage::StoredUser;
    use axum::http::StatusCode;

    fn staff(state: &AppState) -> Auth {
        let (user, token) = login_as(state, "head@clinic.example", Some(RoleKind::Nurse));
        let session = state.sessions.get(&token).unwrap();
        Auth(AuthenticatedUser::from_session(user, &session))
    }

    fn seed_user(state: &AppState, email: &str, role: Option<RoleKind>) -> StoredUser {
        let mut user = StoredUser::new(email, "Someone", None);
        user.role = role;
        state.db.insert_user(&user).unwrap();
        user
    }

    #[tokio::test]
    async fn lists_users_with_capabilities() {
        let (state, _dir) = test_state();
        let auth = staff(&state);
        seed_user(&state, "sam@uni.example", Some(RoleKind::Student));

        let Json(list) = list_users(State(state.clone()), auth).await.unwrap();
        assert_eq!(list.total, 2);
        let nurse = list
            .users
            .iter()
            .find(|u| u.email == "head@clinic.example")
            .unwrap();
        assert!(nurse.capabilities.inventory_access);
    }

    #[tokio::test]
    async fn reassigns_role_and_audits() {
        let (state, _dir) = test_state();
        let auth = staff(&state);
        let target = seed_user(&state, "nina@clinic.example", Some(RoleKind::Nurse));

        let Json(response) = update_user_role(
            State(state.clone()),
            auth,
            Path(target.id.clone()),
            Json(UpdateRoleRequest {
                role: RoleKind::Employee,
            }),
        )
        .await
        .unwrap();

        assert_eq!(response.previous_role, Some(RoleKind::Nurse));
        assert_eq!(response.user.role, Some(RoleKind::Employee));
        let stored = state.db.get_user(&target.id).unwrap().unwrap();
        assert_eq!(stored.role, Some(RoleKind::Employee));

        let Json(log) = query_audit_log(
            State(state.clone()),
            staff_again(&state),
            Query(AuditQueryParams {
                event_type: Some("role_reassigned".into()),
                resource_id: Some(target.id.clone()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
        assert_eq!(log.total, 1);
    }

    fn staff_again(state: &AppState) -> Auth {
        let user = state
            .db
            .find_user_by_email("head@clinic.example")
            .unwrap()
            .unwrap();
        let session = state.sessions.create(&user.id).unwrap();
        Auth(AuthenticatedUser::from_session(user, &session))
    }

    #[tokio::test]
    async fn reassigning_unknown_user_is_404() {
        let (state, _dir) = test_state();
        let err = update_user_role(
            State(state.clone()),
            staff(&state),
            Path("missing".into()),
            Json(UpdateRoleRequest {
                role: RoleKind::Doctor,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn reassigning_to_missing_role_is_422() {
        let (state, _dir) = test_state();
        let auth = staff(&state);
        let target = seed_user(&state, "sam@uni.example", Some(RoleKind::Student));

        // Fresh database without the role set.
        let dir = tempfile::tempdir().unwrap();
        let bare = crate::storage::IdentityDatabase::open(&dir.path().join("bare.redb")).unwrap();
        bare.insert_user(&target).unwrap();
        let mut bare_state = state.clone();
        bare_state.db = std::sync::Arc::new(bare);

        let err = update_user_role(
            State(bare_state),
            auth,
            Path(target.id.clone()),
            Json(UpdateRoleRequest {
                role: RoleKind::Doctor,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn rejects_unknown_event_type() {
        let (state, _dir) = test_state();
        let err = query_audit_log(
            State(state.clone()),
            staff(&state),
            Query(AuditQueryParams {
                event_type: Some("chart_opened".into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }
}
