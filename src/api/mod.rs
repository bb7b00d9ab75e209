// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::{
        enforce_access, policy, AccessGate, AllowedRoles, Capabilities, FallbackProfile,
        IdentitySource, Role, RoleAssignmentResult, RoleKind,
    },
    models::{
        AccessCheckResponse, LoginRequest, LoginResponse, RoleListResponse, UpdateRoleRequest,
        UpdateRoleResponse, UserListResponse, UserResponse,
    },
    state::AppState,
    storage::{AuditEvent, AuditEventType},
};

pub mod access;
pub mod admin;
pub mod auth;
pub mod health;
pub mod users;

pub fn router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/users", get(admin::list_users))
        .route("/users/{user_id}/role", put(admin::update_user_role))
        .route("/audit", get(admin::query_audit_log))
        .route_layer(from_fn_with_state(
            AccessGate::new(state.clone(), policy::USER_MANAGEMENT),
            enforce_access,
        ));

    let v1_routes = Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/users/me", get(users::get_current_user))
        .route("/roles", get(users::list_roles))
        .route("/access/{resource}", get(access::check_access))
        .nest("/admin", admin_routes);

    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .nest("/v1", v1_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

/// Registers the session bearer scheme referenced by protected paths.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        auth::login,
        auth::logout,
        users::get_current_user,
        users::list_roles,
        access::check_access,
        admin::list_users,
        admin::update_user_role,
        admin::query_audit_log
    ),
    components(
        schemas(
            RoleKind,
            Role,
            Capabilities,
            AllowedRoles,
            RoleAssignmentResult,
            IdentitySource,
            FallbackProfile,
            LoginRequest,
            LoginResponse,
            UserResponse,
            UserListResponse,
            RoleListResponse,
            UpdateRoleRequest,
            UpdateRoleResponse,
            AccessCheckResponse,
            AuditEvent,
            AuditEventType,
            admin::AuditLogResponse,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness and readiness"),
        (name = "Auth", description = "Sign-in and sessions"),
        (name = "Users", description = "Current user and role set"),
        (name = "Access", description = "Access guard decisions"),
        (name = "Admin", description = "User management and audit log")
    )
)]
struct ApiDoc;
