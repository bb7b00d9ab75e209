// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Access guard: allow or deny a role against a resource's allowed set.
//!
//! The decision is a pure function of the current role, the allowed set and
//! the unassigned-role fallback. What a denial looks like depends on the
//! caller: API clients get a JSON body, page requests get an HTML page that
//! shows the user's current role.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use axum::{
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use super::roles::{RoleKind, UnknownRole};

/// Set of roles allowed on a resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct AllowedRoles(BTreeSet<RoleKind>);

impl AllowedRoles {
    /// Parse role names (case-insensitive).
    pub fn from_names<'a, I>(names: I) -> Result<Self, UnknownRole>
    where
        I: IntoIterator<Item = &'a str>,
    {
        names
            .into_iter()
            .map(str::parse::<RoleKind>)
            .collect::<Result<BTreeSet<_>, _>>()
            .map(AllowedRoles)
    }

    pub fn contains(&self, role: RoleKind) -> bool {
        self.0.contains(&role)
    }

    pub fn iter(&self) -> impl Iterator<Item = RoleKind> + '_ {
        self.0.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<RoleKind> for AllowedRoles {
    fn from_iter<T: IntoIterator<Item = RoleKind>>(iter: T) -> Self {
        AllowedRoles(iter.into_iter().collect())
    }
}

/// Why access was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    InsufficientRole,
}

impl DenialReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenialReason::InsufficientRole => "insufficient role",
        }
    }
}

/// A denied access decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    pub reason: DenialReason,
    /// The user's actual role (not the fallback used for the check).
    pub current_role: Option<RoleKind>,
}

/// Result of an access check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    Allow,
    Deny(Denial),
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allow)
    }
}

/// Access guard with a configurable fallback for users without a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessGuard {
    unassigned_fallback: Option<RoleKind>,
}

impl Default for AccessGuard {
    /// Users without a role are checked as nurses (legacy behavior).
    fn default() -> Self {
        Self {
            unassigned_fallback: Some(RoleKind::Nurse),
        }
    }
}

impl AccessGuard {
    /// `None` denies every user that has no role.
    pub fn new(unassigned_fallback: Option<RoleKind>) -> Self {
        Self {
            unassigned_fallback,
        }
    }

    pub fn unassigned_fallback(&self) -> Option<RoleKind> {
        self.unassigned_fallback
    }

    pub fn authorize(&self, current_role: Option<RoleKind>, allowed: &AllowedRoles) -> AccessDecision {
        match current_role.or(self.unassigned_fallback) {
            Some(role) if allowed.contains(role) => AccessDecision::Allow,
            _ => AccessDecision::Deny(Denial {
                reason: DenialReason::InsufficientRole,
                current_role,
            }),
        }
    }
}

/// Authorize with the legacy guard (no role ⇒ nurse).
pub fn authorize(current_role: Option<RoleKind>, allowed: &AllowedRoles) -> AccessDecision {
    AccessGuard::default().authorize(current_role, allowed)
}

/// What kind of response the caller expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    Api,
    Page,
}

impl ResponseMode {
    /// JSON for XHR requests and clients that accept JSON; a page otherwise.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let is_xhr = headers
            .get("x-requested-with")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("XMLHttpRequest"));

        let wants_json = headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|accept| accept.contains("/json") || accept.contains("+json"));

        if is_xhr || wants_json {
            ResponseMode::Api
        } else {
            ResponseMode::Page
        }
    }
}

#[derive(Serialize)]
struct DenialBody<'a> {
    error: &'static str,
    error_code: DenialReason,
    current_role: Option<RoleKind>,
    resource: &'a str,
}

impl Denial {
    /// Render as a 403 response for the given caller.
    pub fn render(&self, mode: ResponseMode, resource: &str) -> Response {
        match mode {
            ResponseMode::Api => (
                StatusCode::FORBIDDEN,
                Json(DenialBody {
                    error: self.reason.as_str(),
                    error_code: self.reason,
                    current_role: self.current_role,
                    resource,
                }),
            )
                .into_response(),
            ResponseMode::Page => (StatusCode::FORBIDDEN, Html(self.page(resource))).into_response(),
        }
    }

    fn page(&self, resource: &str) -> String {
        let role = self.current_role.map_or("none", |r| r.as_str());
        let mut html = String::from(
            "<!DOCTYPE html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\"><title>Access denied</title></head>\n<body>\n",
        );
        let _ = write!(
            html,
            "<main class=\"access-denied\">\n<h1>Access denied</h1>\n\
             <p>You do not have permission to open <strong>{}</strong>.</p>\n\
             <p>Your current role: <strong data-role=\"{role}\">{role}</strong></p>\n\
             </main>\n</body>\n</html>\n",
            escape_html(resource),
        );
        html
    }
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::http::HeaderValue;

    fn allowed(kinds: &[RoleKind]) -> AllowedRoles {
        kinds.iter().copied().collect()
    }

    #[test]
    fn unassigned_user_is_checked_as_nurse() {
        assert_eq!(authorize(None, &allowed(&[RoleKind::Nurse])), AccessDecision::Allow);
        assert!(!authorize(None, &allowed(&[RoleKind::Doctor])).is_allowed());
    }

    #[test]
    fn student_is_denied_staff_resources() {
        let decision = authorize(
            Some(RoleKind::Student),
            &allowed(&[RoleKind::Nurse, RoleKind::Doctor]),
        );
        assert_eq!(
            decision,
            AccessDecision::Deny(Denial {
                reason: DenialReason::InsufficientRole,
                current_role: Some(RoleKind::Student),
            })
        );
        if let AccessDecision::Deny(denial) = decision {
            assert_eq!(denial.reason.as_str(), "insufficient role");
        }
    }

    #[test]
    fn member_role_is_allowed() {
        assert!(authorize(Some(RoleKind::Doctor), &allowed(&[RoleKind::Doctor])).is_allowed());
    }

    #[test]
    fn strict_guard_denies_unassigned_users() {
        let guard = AccessGuard::new(None);
        let decision = guard.authorize(None, &allowed(&RoleKind::ALL));
        assert!(matches!(
            decision,
            AccessDecision::Deny(Denial { current_role: None, .. })
        ));
    }

    #[test]
    fn allowed_roles_parse_case_insensitively() {
        let roles = AllowedRoles::from_names(["Nurse", "DOCTOR"]).unwrap();
        assert!(roles.contains(RoleKind::Nurse));
        assert!(roles.contains(RoleKind::Doctor));
        assert!(!roles.contains(RoleKind::Student));
        assert!(AllowedRoles::from_names(["admin"]).is_err());
    }

    #[test]
    fn response_mode_from_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(ResponseMode::from_headers(&headers), ResponseMode::Page);

        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        assert_eq!(ResponseMode::from_headers(&headers), ResponseMode::Api);

        let mut xhr = HeaderMap::new();
        xhr.insert(header::ACCEPT, HeaderValue::from_static("text/html"));
        xhr.insert("x-requested-with", HeaderValue::from_static("XMLHttpRequest"));
        assert_eq!(ResponseMode::from_headers(&xhr), ResponseMode::Api);
    }

    #[tokio::test]
    async fn api_denial_is_structured() {
        let denial = Denial {
            reason: DenialReason::InsufficientRole,
            current_role: Some(RoleKind::Student),
        };
        let response = denial.render(ResponseMode::Api, "reports");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "insufficient role");
        assert_eq!(body["error_code"], "insufficient_role");
        assert_eq!(body["current_role"], "student");
        assert_eq!(body["resource"], "reports");
    }

    #[tokio::test]
    async fn page_denial_shows_current_role() {
        let denial = Denial {
            reason: DenialReason::InsufficientRole,
            current_role: Some(RoleKind::Employee),
        };
        let response = denial.render(ResponseMode::Page, "<inventory>");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let html = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(html.contains("Your current role: <strong data-role=\"employee\">employee</strong>"));
        assert!(html.contains("&lt;inventory&gt;"));
    }
}
