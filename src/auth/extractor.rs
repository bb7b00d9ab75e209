// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractor for authenticated users.
//!
//! Use the `Auth` extractor in handlers to require a session:
//!
//! ```rust,ignore
//! async fn my_handler(Auth(user): Auth) -> impl IntoResponse {
//!     // user is AuthenticatedUser
//! }
//! ```

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};

use super::{AuthError, AuthenticatedUser};
use crate::state::AppState;

/// Extractor for authenticated users.
///
/// Resolves `Authorization: Bearer <session token>` to a session, then loads
/// the user record so the role is always current. A user already placed in
/// the request extensions (by the access middleware) is reused.
pub struct Auth(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for Auth
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>().cloned() {
            return Ok(Auth(user));
        }

        let token = bearer_token(parts)?;
        let state = AppState::from_ref(state);
        let user = authenticate_session(&state, token)?;
        Ok(Auth(user))
    }
}

/// Extract the bearer token from the Authorization header.
fn bearer_token(parts: &Parts) -> Result<&str, AuthError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?;

    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::InvalidAuthHeader)
}

/// Resolve a session token to the current user record.
fn authenticate_session(state: &AppState, token: &str) -> Result<AuthenticatedUser, AuthError> {
    let session = state.sessions.get(token)?;

    let user = state
        .db
        .get_user(&session.user_id)
        .map_err(|e| AuthError::InternalError(e.to_string()))?;

    match user {
        Some(user) => Ok(AuthenticatedUser::from_session(user, &session)),
        None => {
            tracing::warn!(user_id = %session.user_id, "Session refers to a missing user, revoking");
            state.sessions.revoke(token);
            Err(AuthError::UnknownSession)
        }
    }
}
