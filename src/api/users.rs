// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User and role endpoints.

use axum::{extract::State, Json};

use crate::{
    auth::Auth,
    error::ApiError,
    models::{RoleListResponse, UserResponse},
    state::AppState,
};

/// Get the current authenticated user's information.
///
/// Returns the stored user record, their role and the role's capabilities.
#[utoipa::path(
    get,
    path = "/v1/users/me",
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "User information", body = UserResponse),
        (status = 401, description = "Unauthorized - invalid or missing session"),
    )
)]
pub async fn get_current_user(
    State(state): State<AppState>,
    Auth(user): Auth,
) -> Result<Json<UserResponse>, ApiError> {
    let stored = state
        .db
        .get_user(&user.user_id)?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    let role = match stored.role {
        Some(kind) => state.db.get_role(kind)?,
        None => None,
    };
    Ok(Json(UserResponse::new(stored, role.as_ref())))
}

/// List the role set.
#[utoipa::path(
    get,
    path = "/v1/roles",
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Role set ordered by level", body = RoleListResponse),
        (status = 401, description = "Unauthorized - invalid or missing session"),
    )
)]
pub async fn list_roles(
    State(state): State<AppState>,
    Auth(_user): Auth,
) -> Result<Json<RoleListResponse>, ApiError> {
    let mut roles = state.db.list_roles()?;
    roles.sort_by(|a, b| b.level.cmp(&a.level).then(a.kind.cmp(&b.kind)));
    Ok(Json(RoleListResponse { roles }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthenticatedUser, Capabilities, RoleKind};
    use crate::state::test_support::{login_as, test_state};

    fn auth(state: &AppState, user: crate::storage::StoredUser, token: &str) -> Auth {
        let session = state.sessions.get(token).unwrap();
        Auth(AuthenticatedUser::from_session(user, &session))
    }

    #[tokio::test]
    async fn current_user_includes_capabilities() {
        let (state, _dir) = test_state();
        let (user, token) = login_as(&state, "doc@clinic.example", Some(RoleKind::Doctor));

        let Json(me) = get_current_user(State(state.clone()), auth(&state, user.clone(), &token))
            .await
            .unwrap();
        assert_eq!(me.user_id, user.id);
        assert_eq!(me.role, Some(RoleKind::Doctor));
        assert!(me.capabilities.reports_access);
        assert!(!me.capabilities.inventory_access);
    }

    #[tokio::test]
    async fn current_user_without_role() {
        let (state, _dir) = test_state();
        let (user, token) = login_as(&state, "legacy@clinic.example", None);

        let Json(me) = get_current_user(State(state.clone()), auth(&state, user, &token))
            .await
            .unwrap();
        assert_eq!(me.role, None);
        assert_eq!(me.capabilities, Capabilities::none());
    }

    #[tokio::test]
    async fn roles_are_listed_most_privileged_first() {
        let (state, _dir) = test_state();
        let (user, token) = login_as(&state, "sam@uni.example", Some(RoleKind::Student));

        let Json(list) = list_roles(State(state.clone()), auth(&state, user, &token))
            .await
            .unwrap();
        assert_eq!(list.roles.len(), 4);
        assert_eq!(list.roles[0].kind, RoleKind::Nurse);
    }
}
