// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Access-guard middleware for Axum.
//!
//! Wraps a router subtree so every request is authenticated and then checked
//! against the allowed role set of one protected resource.
//!
//! ```rust,ignore
//! let admin = Router::new()
//!     .route("/users", get(list_users))
//!     .route_layer(axum::middleware::from_fn_with_state(
//!         AccessGate::new(state.clone(), policy::USER_MANAGEMENT),
//!         enforce_access,
//!     ));
//! ```

use axum::{
    extract::{FromRef, Request, State},
    middleware::Next,
    response::Response,
};

use super::extractor::Auth;
use super::guard::{AccessDecision, Denial, DenialReason, ResponseMode};
use crate::state::AppState;
use crate::storage::{audit, AuditEvent, AuditEventType};

/// Middleware state: the application state plus the resource being guarded.
#[derive(Clone)]
pub struct AccessGate {
    state: AppState,
    resource: &'static str,
}

impl AccessGate {
    pub fn new(state: AppState, resource: &'static str) -> Self {
        Self { state, resource }
    }
}

impl FromRef<AccessGate> for AppState {
    fn from_ref(gate: &AccessGate) -> AppState {
        gate.state.clone()
    }
}

/// Authenticate, then allow or deny against the gate's resource.
///
/// Authentication failures are returned as-is (401). A resource missing from
/// the policy is denied to everyone.
pub async fn enforce_access(
    State(gate): State<AccessGate>,
    Auth(user): Auth,
    mut request: Request,
    next: Next,
) -> Response {
    let mode = ResponseMode::from_headers(request.headers());

    let Some(allowed) = gate.state.policy.allowed_for(gate.resource) else {
        tracing::error!(resource = gate.resource, "Protected resource missing from access policy");
        let denial = Denial {
            reason: DenialReason::InsufficientRole,
            current_role: user.role,
        };
        return denial.render(mode, gate.resource);
    };

    match gate.state.guard.authorize(user.role, allowed) {
        AccessDecision::Allow => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        AccessDecision::Deny(denial) => {
            tracing::info!(
                user_id = %user.user_id,
                role = user.role_name(),
                resource = gate.resource,
                "Access denied"
            );
            audit::record(
                &gate.state.db,
                AuditEvent::new(AuditEventType::PermissionDenied)
                    .with_user(&user.user_id)
                    .with_resource("resource", gate.resource)
                    .with_details(serde_json::json!({ "current_role": user.role }))
                    .failed(denial.reason.as_str()),
            );
            denial.render(mode, gate.resource)
        }
    }
}
