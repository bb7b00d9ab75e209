// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Login and logout.
//!
//! Login is the only place users are created. It runs the role resolver on
//! every sign-in so mapping changes reach existing users, and writes the
//! outcome to the audit trail.

use axum::{extract::State, http::StatusCode, Json};

use crate::{
    auth::{Auth, RoleAssignmentResult, SignIn},
    error::ApiError,
    models::{LoginRequest, LoginResponse, UserResponse},
    state::AppState,
    storage::{audit, AuditEvent, AuditEventType},
};

/// Sign in with an identity-provider token or a fallback profile.
///
/// Creates the user on first sign-in, resolves their role and opens a session.
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = LoginResponse),
        (status = 401, description = "No usable identity"),
        (status = 500, description = "Identity provider or storage failure"),
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let identity = match state
        .verifier
        .authenticate(request.id_token.as_deref(), request.profile)
        .await
    {
        Ok(identity) => identity,
        Err(err) => {
            tracing::info!(error_code = err.error_code(), "Login rejected");
            audit::record(
                &state.db,
                AuditEvent::new(AuditEventType::AuthFailure)
                    .with_details(serde_json::json!({ "error_code": err.error_code() }))
                    .failed(err.to_string()),
            );
            return Err(err.into());
        }
    };

    let SignIn {
        user,
        created,
        assignment,
    } = state.resolver.sign_in(state.db.as_ref(), &identity)?;

    record_sign_in(&state, &user.id, created, &assignment);

    let session = state.sessions.create(&user.id)?;
    let role = match user.role {
        Some(kind) => state.db.get_role(kind)?,
        None => None,
    };

    audit::record(
        &state.db,
        AuditEvent::new(AuditEventType::AuthSuccess)
            .with_user(&user.id)
            .with_details(serde_json::json!({ "source": identity.source })),
    );
    tracing::info!(
        user_id = %user.id,
        created,
        role = ?user.role,
        source = ?identity.source,
        "User signed in"
    );

    Ok(Json(LoginResponse {
        token: session.token,
        expires_at: session.expires_at,
        created,
        identity_source: identity.source,
        assignment,
        user: UserResponse::new(user, role.as_ref()),
    }))
}

fn record_sign_in(state: &AppState, user_id: &str, created: bool, assignment: &RoleAssignmentResult) {
    if created {
        audit::record(
            &state.db,
            AuditEvent::new(AuditEventType::UserCreated)
                .with_user(user_id)
                .with_resource("user", user_id),
        );
    }

    match *assignment {
        RoleAssignmentResult::Assigned { previous, role } => audit::record(
            &state.db,
            AuditEvent::new(AuditEventType::RoleAssigned)
                .with_user(user_id)
                .with_resource("user", user_id)
                .with_details(serde_json::json!({ "previous": previous, "role": role })),
        ),
        RoleAssignmentResult::RoleMissing { target } => audit::record(
            &state.db,
            AuditEvent::new(AuditEventType::RoleMissing)
                .with_user(user_id)
                .with_resource("role", target.as_str())
                .failed(format!("role '{target}' is not in the role set")),
        ),
        RoleAssignmentResult::NurseImmune | RoleAssignmentResult::Unchanged { .. } => {}
    }
}

/// Revoke the current session.
#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    tag = "Auth",
    security(("bearer" = [])),
    responses(
        (status = 204, description = "Session revoked"),
        (status = 401, description = "Unauthorized - invalid or missing session"),
    )
)]
pub async fn logout(State(state): State<AppState>, Auth(user): Auth) -> StatusCode {
    if state.sessions.revoke(&user.session_id) {
        audit::record(
            &state.db,
            AuditEvent::new(AuditEventType::SessionRevoked).with_user(&user.user_id),
        );
        tracing::info!(user_id = %user.user_id, "User signed out");
    }
    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{FallbackProfile, IdentityVerifier, RoleKind, VerifierMode};
    use crate::state::test_support::{test_state, DOCTOR_EMAIL, TEST_SECRET};
    use crate::storage::{AuditQuery, AuditRepository};
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn id_token(email: &str, sub: &str) -> String {
        let claims = serde_json::json!({
            "sub": sub,
            "email": email,
            "name": "Token User",
            "exp": chrono::Utc::now().timestamp() + 600,
        });
        encode(&Header::default(), &claims, &EncodingKey::from_secret(TEST_SECRET)).unwrap()
    }

    fn profile(email: &str) -> FallbackProfile {
        FallbackProfile {
            email: email.to_string(),
            name: "Profile User".to_string(),
            external_id: None,
        }
    }

    fn events(state: &AppState, event_type: AuditEventType) -> usize {
        AuditRepository::new(&state.db)
            .query(&AuditQuery {
                event_type: Some(event_type),
                limit: 100,
                ..Default::default()
            })
            .unwrap()
            .len()
    }

    #[tokio::test]
    async fn token_login_creates_user_with_default_role() {
        let (state, _dir) = test_state();
        let request = LoginRequest {
            id_token: Some(id_token("Sam@Uni.example", "idp|sam")),
            profile: None,
        };

        let Json(response) = login(State(state.clone()), Json(request)).await.unwrap();
        assert!(response.created);
        assert_eq!(response.user.email, "sam@uni.example");
        assert_eq!(response.user.role, Some(RoleKind::Student));
        assert_eq!(response.user.external_id.as_deref(), Some("idp|sam"));
        assert!(state.sessions.get(&response.token).is_ok());

        assert_eq!(events(&state, AuditEventType::UserCreated), 1);
        assert_eq!(events(&state, AuditEventType::RoleAssigned), 1);
        assert_eq!(events(&state, AuditEventType::AuthSuccess), 1);
    }

    #[tokio::test]
    async fn mapped_email_gets_mapped_role() {
        let (state, _dir) = test_state();
        let request = LoginRequest {
            id_token: None,
            profile: Some(profile(DOCTOR_EMAIL)),
        };

        let Json(response) = login(State(state), Json(request)).await.unwrap();
        assert_eq!(response.user.role, Some(RoleKind::Doctor));
        assert!(response.user.capabilities.reports_access);
    }

    #[tokio::test]
    async fn bad_token_falls_back_to_profile() {
        let (state, _dir) = test_state();
        let request = LoginRequest {
            id_token: Some("not-a-jwt".to_string()),
            profile: Some(profile("eve@clinic.example")),
        };

        let Json(response) = login(State(state), Json(request)).await.unwrap();
        assert_eq!(response.user.email, "eve@clinic.example");
        assert_eq!(response.identity_source, crate::auth::IdentitySource::Fallback);
    }

    #[tokio::test]
    async fn bad_token_without_profile_is_rejected_and_creates_nothing() {
        let (state, _dir) = test_state();
        let request = LoginRequest {
            id_token: Some("not-a-jwt".to_string()),
            profile: None,
        };

        let err = login(State(state.clone()), Json(request)).await.unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        assert!(state.db.list_users().unwrap().is_empty());
        assert!(state.sessions.is_empty());
        assert_eq!(events(&state, AuditEventType::AuthFailure), 1);
    }

    #[tokio::test]
    async fn profile_rejected_when_fallback_disabled() {
        let (mut state, _dir) = test_state();
        state.verifier = std::sync::Arc::new(
            IdentityVerifier::new(VerifierMode::Disabled).with_fallback(false),
        );
        let request = LoginRequest {
            id_token: None,
            profile: Some(profile("eve@clinic.example")),
        };

        let err = login(State(state), Json(request)).await.unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        assert_eq!(err.code, Some("missing_identity"));
    }

    #[tokio::test]
    async fn nurse_keeps_role_on_repeat_login() {
        let (state, _dir) = test_state();
        let mut nurse = crate::storage::StoredUser::new("nina@clinic.example", "Nina", None);
        nurse.role = Some(RoleKind::Nurse);
        state.db.insert_user(&nurse).unwrap();

        let request = LoginRequest {
            id_token: None,
            profile: Some(profile("Nina@Clinic.example")),
        };
        let Json(response) = login(State(state.clone()), Json(request)).await.unwrap();
        assert!(!response.created);
        assert_eq!(response.assignment, RoleAssignmentResult::NurseImmune);
        assert_eq!(response.user.role, Some(RoleKind::Nurse));
        assert_eq!(events(&state, AuditEventType::RoleAssigned), 0);
    }

    #[tokio::test]
    async fn logout_revokes_session() {
        let (state, _dir) = test_state();
        let request = LoginRequest {
            id_token: None,
            profile: Some(profile("sam@uni.example")),
        };
        let Json(response) = login(State(state.clone()), Json(request)).await.unwrap();
        let session = state.sessions.get(&response.token).unwrap();
        let user = state.db.get_user(&session.user_id).unwrap().unwrap();

        let status = logout(
            State(state.clone()),
            Auth(crate::auth::AuthenticatedUser::from_session(user, &session)),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(state.sessions.get(&response.token).is_err());
        assert_eq!(events(&state, AuditEventType::SessionRevoked), 1);
    }
}
