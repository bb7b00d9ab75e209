// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded identity database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `users`: user_id → serialized StoredUser
//! - `user_emails`: normalized email → user_id (unique index)
//! - `roles`: role name → serialized Role
//! - `audit_events`: `timestamp_micros|event_id` → serialized AuditEvent

use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::audit::AuditEvent;
use crate::auth::email::normalize_email;
use crate::auth::roles::{Role, RoleKind};

// =============================================================================
// Table Definitions
// =============================================================================

/// Primary table: user_id → serialized StoredUser (JSON bytes).
const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");

/// Unique index: normalized email → user_id.
const USER_EMAILS: TableDefinition<&str, &str> = TableDefinition::new("user_emails");

/// Role set: lowercase role name → serialized Role.
const ROLES: TableDefinition<&str, &[u8]> = TableDefinition::new("roles");

/// Audit trail. Keys sort chronologically.
const AUDIT_EVENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("audit_events");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Records
// =============================================================================

/// User identity record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StoredUser {
    /// Unique user identifier (UUID)
    pub id: String,
    /// Identity provider subject, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// Display name
    pub name: String,
    /// Normalized email (unique)
    pub email: String,
    /// Assigned role; `None` for users that never received one
    #[serde(default)]
    pub role: Option<RoleKind>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredUser {
    /// New user with no role. The email is normalized.
    pub fn new(email: &str, name: impl Into<String>, external_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            external_id,
            name: name.into(),
            email: normalize_email(email),
            role: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// =============================================================================
// IdentityDatabase
// =============================================================================

/// Embedded ACID identity store.
pub struct IdentityDatabase {
    db: Database,
}

impl IdentityDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(USERS)?;
            let _ = write_txn.open_table(USER_EMAILS)?;
            let _ = write_txn.open_table(ROLES)?;
            let _ = write_txn.open_table(AUDIT_EVENTS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Cheap read used by the readiness check.
    pub fn ping(&self) -> StoreResult<()> {
        let read_txn = self.db.begin_read()?;
        let _ = read_txn.open_table(ROLES)?;
        Ok(())
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Insert a new user. Fails with `AlreadyExists` if the email is taken.
    pub fn insert_user(&self, user: &StoredUser) -> StoreResult<()> {
        let email = normalize_email(&user.email);
        let json = serde_json::to_vec(user)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut emails = write_txn.open_table(USER_EMAILS)?;
            if emails.get(email.as_str())?.is_some() {
                return Err(StoreError::AlreadyExists(format!("User with email {email}")));
            }
            emails.insert(email.as_str(), user.id.as_str())?;

            let mut users = write_txn.open_table(USERS)?;
            users.insert(user.id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Overwrite an existing user record (last write wins).
    pub fn update_user(&self, user: &StoredUser) -> StoreResult<()> {
        let json = serde_json::to_vec(user)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut users = write_txn.open_table(USERS)?;
            if users.get(user.id.as_str())?.is_none() {
                return Err(StoreError::NotFound(format!("User {}", user.id)));
            }
            users.insert(user.id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Look up a user by id.
    pub fn get_user(&self, user_id: &str) -> StoreResult<Option<StoredUser>> {
        let read_txn = self.db.begin_read()?;
        let users = read_txn.open_table(USERS)?;
        match users.get(user_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Look up a user by email (normalized before lookup).
    pub fn find_user_by_email(&self, email: &str) -> StoreResult<Option<StoredUser>> {
        let email = normalize_email(email);
        let read_txn = self.db.begin_read()?;
        let emails = read_txn.open_table(USER_EMAILS)?;
        let user_id = match emails.get(email.as_str())? {
            Some(v) => v.value().to_string(),
            None => return Ok(None),
        };

        let users = read_txn.open_table(USERS)?;
        match users.get(user_id.as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// All users, ordered by email.
    pub fn list_users(&self) -> StoreResult<Vec<StoredUser>> {
        let read_txn = self.db.begin_read()?;
        let emails = read_txn.open_table(USER_EMAILS)?;
        let users = read_txn.open_table(USERS)?;

        let mut result = Vec::new();
        for entry in emails.iter()? {
            let (_, user_id) = entry?;
            if let Some(value) = users.get(user_id.value())? {
                result.push(serde_json::from_slice(value.value())?);
            }
        }
        Ok(result)
    }

    // =========================================================================
    // Roles
    // =========================================================================

    /// Insert or replace a role definition.
    #[cfg(test)]
    fn upsert_role(&self, role: &Role) -> StoreResult<()> {
        let json = serde_json::to_vec(role)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut roles = write_txn.open_table(ROLES)?;
            roles.insert(role.kind.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Insert each role that is not already present. Existing definitions are
    /// left untouched. Returns how many were inserted.
    pub fn seed_roles(&self, defaults: &[Role]) -> StoreResult<usize> {
        let mut inserted = 0;
        let write_txn = self.db.begin_write()?;
        {
            let mut roles = write_txn.open_table(ROLES)?;
            for role in defaults {
                if roles.get(role.kind.as_str())?.is_some() {
                    continue;
                }
                let json = serde_json::to_vec(role)?;
                roles.insert(role.kind.as_str(), json.as_slice())?;
                inserted += 1;
            }
        }
        write_txn.commit()?;
        Ok(inserted)
    }

    /// Look up a role definition.
    pub fn get_role(&self, kind: RoleKind) -> StoreResult<Option<Role>> {
        let read_txn = self.db.begin_read()?;
        let roles = read_txn.open_table(ROLES)?;
        match roles.get(kind.as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// The whole role set, ordered by name.
    pub fn list_roles(&self) -> StoreResult<Vec<Role>> {
        let read_txn = self.db.begin_read()?;
        let roles = read_txn.open_table(ROLES)?;
        let mut result = Vec::new();
        for entry in roles.iter()? {
            let (_, value) = entry?;
            result.push(serde_json::from_slice(value.value())?);
        }
        Ok(result)
    }

    // =========================================================================
    // Audit events
    // =========================================================================

    /// Append an audit event.
    pub fn insert_audit_event(&self, event: &AuditEvent) -> StoreResult<()> {
        let key = audit_key(event);
        let json = serde_json::to_vec(event)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(AUDIT_EVENTS)?;
            table.insert(key.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Scan audit events newest first, keeping those accepted by `filter`,
    /// until `limit` matches have been collected.
    pub fn audit_events_newest_first<F>(&self, limit: usize, filter: F) -> StoreResult<Vec<AuditEvent>>
    where
        F: Fn(&AuditEvent) -> bool,
    {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(AUDIT_EVENTS)?;

        let mut result = Vec::new();
        for entry in table.iter()?.rev() {
            if result.len() >= limit {
                break;
            }
            let (_, value) = entry?;
            let event: AuditEvent = serde_json::from_slice(value.value())?;
            if filter(&event) {
                result.push(event);
            }
        }
        Ok(result)
    }
}

/// Build the chronological key for an audit event.
///
/// Format: `zero-padded micros since epoch | event_id`.
fn audit_key(event: &AuditEvent) -> String {
    let micros = event.timestamp.timestamp_micros().max(0);
    format!("{micros:020}|{}", event.event_id)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::audit::AuditEventType;

    fn temp_db() -> (IdentityDatabase, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = IdentityDatabase::open(&dir.path().join("identity.redb")).unwrap();
        (db, dir)
    }

    #[test]
    fn insert_and_find_by_email() {
        let (db, _dir) = temp_db();
        let user = StoredUser::new("Pat@Clinic.Example", "Pat", Some("sub-1".into()));
        db.insert_user(&user).unwrap();

        let found = db.find_user_by_email("pat@clinic.example").unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert_eq!(found.email, "pat@clinic.example");
        assert_eq!(found.external_id.as_deref(), Some("sub-1"));

        let by_id = db.get_user(&user.id).unwrap().unwrap();
        assert_eq!(by_id, found);
    }

    #[test]
    fn email_is_unique() {
        let (db, _dir) = temp_db();
        db.insert_user(&StoredUser::new("dup@clinic.example", "One", None))
            .unwrap();

        let err = db
            .insert_user(&StoredUser::new("DUP@clinic.example", "Two", None))
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
        assert_eq!(db.list_users().unwrap().len(), 1);
    }

    #[test]
    fn update_requires_existing_user() {
        let (db, _dir) = temp_db();
        let mut user = StoredUser::new("ghost@clinic.example", "Ghost", None);
        assert!(matches!(db.update_user(&user), Err(StoreError::NotFound(_))));

        db.insert_user(&user).unwrap();
        user.role = Some(RoleKind::Doctor);
        db.update_user(&user).unwrap();
        assert_eq!(
            db.get_user(&user.id).unwrap().unwrap().role,
            Some(RoleKind::Doctor)
        );
    }

    #[test]
    fn seed_roles_is_idempotent_and_keeps_existing() {
        let (db, _dir) = temp_db();
        let mut custom = RoleKind::Doctor.default_role();
        custom.level = 9;
        db.upsert_role(&custom).unwrap();

        assert_eq!(db.seed_roles(&Role::default_set()).unwrap(), 3);
        assert_eq!(db.seed_roles(&Role::default_set()).unwrap(), 0);

        assert_eq!(db.get_role(RoleKind::Doctor).unwrap().unwrap().level, 9);
        assert_eq!(db.list_roles().unwrap().len(), 4);
    }

    #[test]
    fn open_reports_unusable_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();

        let result = IdentityDatabase::open(&blocker.join("nested").join("identity.redb"));
        assert!(matches!(result, Err(StoreError::Io(_))));
    }

    #[test]
    fn open_creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("identity.redb");
        let db = IdentityDatabase::open(&path).unwrap();
        db.ping().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn missing_role_is_none() {
        let (db, _dir) = temp_db();
        assert!(db.get_role(RoleKind::Nurse).unwrap().is_none());
    }

    #[test]
    fn audit_events_come_back_newest_first() {
        let (db, _dir) = temp_db();
        for i in 0..5 {
            let mut event = AuditEvent::new(AuditEventType::AuthSuccess)
                .with_user(format!("user-{i}"));
            event.timestamp = Utc::now() - chrono::Duration::seconds(10 - i);
            db.insert_audit_event(&event).unwrap();
        }

        let events = db.audit_events_newest_first(3, |_| true).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].user_id.as_deref(), Some("user-4"));
        assert_eq!(events[2].user_id.as_deref(), Some("user-2"));

        let filtered = db
            .audit_events_newest_first(10, |e| e.user_id.as_deref() == Some("user-1"))
            .unwrap();
        assert_eq!(filtered.len(), 1);
    }
}
