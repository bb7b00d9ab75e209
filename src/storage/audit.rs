// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Audit logging for security-sensitive operations.
//!
//! Sign-ins, role assignments, configuration errors and access denials are
//! recorded in the identity database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{IdentityDatabase, StoreResult};

/// Types of auditable events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    // User events
    UserCreated,

    // Role events
    RoleAssigned,
    RoleReassigned,
    RoleMissing,

    // Auth events
    AuthSuccess,
    AuthFailure,
    SessionRevoked,
    PermissionDenied,
}

impl AuditEventType {
    /// Parse the snake_case name used on the wire.
    pub fn from_name(name: &str) -> Option<Self> {
        serde_json::from_value(serde_json::Value::String(name.to_string())).ok()
    }
}

/// An audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditEvent {
    /// Unique event ID.
    pub event_id: String,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Type of event.
    pub event_type: AuditEventType,
    /// User who triggered or was affected by the event (if known).
    pub user_id: Option<String>,
    /// Resource affected (user id, protected resource name, ...).
    pub resource_id: Option<String>,
    /// Resource type (user, resource, session, ...).
    pub resource_type: Option<String>,
    /// Additional details as JSON.
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Error message if operation failed.
    pub error: Option<String>,
}

impl AuditEvent {
    /// Create a new audit event.
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type,
            user_id: None,
            resource_id: None,
            resource_type: None,
            details: None,
            success: true,
            error: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_resource(
        mut self,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        self.resource_type = Some(resource_type.into());
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Mark as failed with error message.
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }
}

/// Filters for audit queries. Empty fields match everything.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub user_id: Option<String>,
    pub event_type: Option<AuditEventType>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub limit: usize,
}

impl AuditQuery {
    fn matches(&self, event: &AuditEvent) -> bool {
        fn field_matches(filter: &Option<String>, value: &Option<String>) -> bool {
            filter.as_ref().map_or(true, |f| value.as_ref() == Some(f))
        }

        field_matches(&self.user_id, &event.user_id)
            && self.event_type.map_or(true, |t| t == event.event_type)
            && field_matches(&self.resource_type, &event.resource_type)
            && field_matches(&self.resource_id, &event.resource_id)
    }
}

/// Repository for audit events.
pub struct AuditRepository<'a> {
    db: &'a IdentityDatabase,
}

impl<'a> AuditRepository<'a> {
    pub fn new(db: &'a IdentityDatabase) -> Self {
        Self { db }
    }

    /// Log an audit event.
    pub fn log(&self, event: &AuditEvent) -> StoreResult<()> {
        self.db.insert_audit_event(event)
    }

    /// Query events, newest first.
    pub fn query(&self, query: &AuditQuery) -> StoreResult<Vec<AuditEvent>> {
        self.db
            .audit_events_newest_first(query.limit, |event| query.matches(event))
    }
}

/// Record an audit event, logging (not propagating) storage failures.
///
/// Auditing must never turn a successful request into a failed one.
pub fn record(db: &IdentityDatabase, event: AuditEvent) {
    if let Err(e) = AuditRepository::new(db).log(&event) {
        tracing::warn!(
            event_type = ?event.event_type,
            error = %e,
            "Failed to write audit event"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db() -> (IdentityDatabase, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = IdentityDatabase::open(&dir.path().join("audit.redb")).unwrap();
        (db, dir)
    }

    #[test]
    fn event_builder_sets_fields() {
        let event = AuditEvent::new(AuditEventType::PermissionDenied)
            .with_user("user-1")
            .with_resource("resource", "reports")
            .with_details(serde_json::json!({ "current_role": "student" }))
            .failed("insufficient role");

        assert_eq!(event.user_id.as_deref(), Some("user-1"));
        assert_eq!(event.resource_id.as_deref(), Some("reports"));
        assert!(!event.success);
        assert_eq!(event.error.as_deref(), Some("insufficient role"));
    }

    #[test]
    fn event_type_from_name() {
        assert_eq!(
            AuditEventType::from_name("role_assigned"),
            Some(AuditEventType::RoleAssigned)
        );
        assert_eq!(AuditEventType::from_name("nope"), None);
    }

    #[test]
    fn query_filters_by_type_and_user() {
        let (db, _dir) = temp_db();
        record(&db, AuditEvent::new(AuditEventType::AuthSuccess).with_user("a"));
        record(&db, AuditEvent::new(AuditEventType::RoleAssigned).with_user("a"));
        record(&db, AuditEvent::new(AuditEventType::RoleAssigned).with_user("b"));

        let repo = AuditRepository::new(&db);
        let assigned = repo
            .query(&AuditQuery {
                event_type: Some(AuditEventType::RoleAssigned),
                limit: 10,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(assigned.len(), 2);

        let for_a = repo
            .query(&AuditQuery {
                user_id: Some("a".into()),
                event_type: Some(AuditEventType::RoleAssigned),
                limit: 10,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(for_a.len(), 1);
    }
}
