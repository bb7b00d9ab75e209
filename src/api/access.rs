// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Guard decision preview.
//!
//! Lets the frontend hide navigation the user cannot open. The protected
//! routes still enforce the guard themselves.

use axum::{
    extract::{Path, State},
    Json,
};

use crate::{auth::Auth, error::ApiError, models::AccessCheckResponse, state::AppState};

/// Would the current user be allowed on `resource`?
#[utoipa::path(
    get,
    path = "/v1/access/{resource}",
    tag = "Access",
    security(("bearer" = [])),
    params(("resource" = String, Path, description = "Protected resource name")),
    responses(
        (status = 200, description = "Guard decision", body = AccessCheckResponse),
        (status = 401, description = "Unauthorized - invalid or missing session"),
        (status = 404, description = "Resource is not in the access policy"),
    )
)]
pub async fn check_access(
    State(state): State<AppState>,
    Auth(user): Auth,
    Path(resource): Path<String>,
) -> Result<Json<AccessCheckResponse>, ApiError> {
    let allowed_roles = state
        .policy
        .allowed_for(&resource)
        .ok_or_else(|| ApiError::not_found(format!("Unknown resource: {resource}")))?;

    let decision = state.guard.authorize(user.role, allowed_roles);

    Ok(Json(AccessCheckResponse {
        resource: resource.trim().to_lowercase(),
        allowed: decision.is_allowed(),
        current_role: user.role,
        effective_role: user.role.or(state.guard.unassigned_fallback()),
        allowed_roles: allowed_roles.clone(),
    }))
}
