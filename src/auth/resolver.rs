// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Role resolution for signing-in users.
//!
//! ## Resolution Order
//!
//! 1. A user who is already a nurse keeps that role. Automated assignment
//!    never downgrades a nurse, whatever the mapping says.
//! 2. The normalized email is looked up in the [`RoleMapping`] table.
//! 3. Unmapped emails get the mapping's default role (`student`).
//! 4. The target must exist in the role set; if it does not, the user keeps
//!    their current role and the miss is logged.
//! 5. The role is written only when it differs from the current one.

use std::collections::HashMap;

use serde::Serialize;
use utoipa::ToSchema;

use super::email::normalize_email;
use super::identity::VerifiedIdentity;
use super::roles::{Role, RoleKind, UnknownRole};
use crate::storage::{IdentityDatabase, StoreError, StoreResult, StoredUser};

/// Persistence operations the resolver needs.
pub trait IdentityStore {
    fn find_user_by_email(&self, email: &str) -> StoreResult<Option<StoredUser>>;
    fn insert_user(&self, user: &StoredUser) -> StoreResult<()>;
    fn update_user(&self, user: &StoredUser) -> StoreResult<()>;
    fn get_role(&self, kind: RoleKind) -> StoreResult<Option<Role>>;
}

impl IdentityStore for IdentityDatabase {
    fn find_user_by_email(&self, email: &str) -> StoreResult<Option<StoredUser>> {
        IdentityDatabase::find_user_by_email(self, email)
    }

    fn insert_user(&self, user: &StoredUser) -> StoreResult<()> {
        IdentityDatabase::insert_user(self, user)
    }

    fn update_user(&self, user: &StoredUser) -> StoreResult<()> {
        IdentityDatabase::update_user(self, user)
    }

    fn get_role(&self, kind: RoleKind) -> StoreResult<Option<Role>> {
        IdentityDatabase::get_role(self, kind)
    }
}

/// Error parsing a role mapping table.
#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("mapping entry '{0}' is not of the form email=role")]
    MalformedEntry(String),
    #[error(transparent)]
    UnknownRole(#[from] UnknownRole),
}

/// Table of exceptional accounts: normalized email → role kind, plus the
/// role every other email receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleMapping {
    entries: HashMap<String, RoleKind>,
    default_role: RoleKind,
}

impl Default for RoleMapping {
    fn default() -> Self {
        Self::new(RoleKind::Student)
    }
}

impl RoleMapping {
    /// Empty mapping with the given default role.
    pub fn new(default_role: RoleKind) -> Self {
        Self {
            entries: HashMap::new(),
            default_role,
        }
    }

    /// Add (or replace) an entry.
    pub fn with_entry(mut self, email: &str, role: RoleKind) -> Self {
        self.entries.insert(normalize_email(email), role);
        self
    }

    /// Parse `email=role` pairs separated by commas or semicolons.
    ///
    /// Blank entries are skipped.
    pub fn parse(table: &str, default_role: RoleKind) -> Result<Self, MappingError> {
        let mut mapping = Self::new(default_role);
        for entry in table.split([',', ';']) {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let (email, role) = entry
                .split_once('=')
                .ok_or_else(|| MappingError::MalformedEntry(entry.to_string()))?;
            if email.trim().is_empty() {
                return Err(MappingError::MalformedEntry(entry.to_string()));
            }
            let role: RoleKind = role.parse()?;
            mapping = mapping.with_entry(email, role);
        }
        Ok(mapping)
    }

    /// Role this email should receive.
    pub fn target_for(&self, email: &str) -> RoleKind {
        self.entries
            .get(&normalize_email(email))
            .copied()
            .unwrap_or(self.default_role)
    }

    pub fn default_role(&self) -> RoleKind {
        self.default_role
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Outcome of a role resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RoleAssignmentResult {
    /// The user is a nurse; nothing was considered.
    NurseImmune,
    /// The user already holds the target role.
    Unchanged { role: RoleKind },
    /// The user's role was set to `role`.
    Assigned {
        previous: Option<RoleKind>,
        role: RoleKind,
    },
    /// The target role is not in the role set; the user's role was kept.
    RoleMissing { target: RoleKind },
}

impl RoleAssignmentResult {
    /// Whether the user record was modified.
    pub fn changed(&self) -> bool {
        matches!(self, RoleAssignmentResult::Assigned { .. })
    }
}

/// Result of a sign-in: the persisted user and what happened to it.
#[derive(Debug, Clone)]
pub struct SignIn {
    pub user: StoredUser,
    pub created: bool,
    pub assignment: RoleAssignmentResult,
}

/// Assigns roles to users based on an injectable [`RoleMapping`].
#[derive(Debug, Clone, Default)]
pub struct RoleResolver {
    mapping: RoleMapping,
}

impl RoleResolver {
    pub fn new(mapping: RoleMapping) -> Self {
        Self { mapping }
    }

    pub fn mapping(&self) -> &RoleMapping {
        &self.mapping
    }

    /// Decide the role for `user`, updating it in memory only.
    pub fn resolve_role<S>(
        &self,
        store: &S,
        user: &mut StoredUser,
        email: &str,
    ) -> StoreResult<RoleAssignmentResult>
    where
        S: IdentityStore + ?Sized,
    {
        if user.role == Some(RoleKind::Nurse) {
            tracing::debug!(user_id = %user.id, "Nurse role is immune to automated assignment");
            return Ok(RoleAssignmentResult::NurseImmune);
        }

        let target = self.mapping.target_for(email);

        if store.get_role(target)?.is_none() {
            tracing::warn!(
                user_id = %user.id,
                target_role = %target,
                "Target role missing from role set, keeping current role"
            );
            return Ok(RoleAssignmentResult::RoleMissing { target });
        }

        if user.role == Some(target) {
            return Ok(RoleAssignmentResult::Unchanged { role: target });
        }

        let previous = user.role.replace(target);
        user.updated_at = chrono::Utc::now();
        Ok(RoleAssignmentResult::Assigned {
            previous,
            role: target,
        })
    }

    /// Load or create the user for `identity`, resolve their role and persist
    /// the record. A new user is written once; an existing user is written
    /// only when their role changed.
    pub fn sign_in<S>(&self, store: &S, identity: &VerifiedIdentity) -> StoreResult<SignIn>
    where
        S: IdentityStore + ?Sized,
    {
        if let Some(mut user) = store.find_user_by_email(&identity.email)? {
            let assignment = self.resolve_role(store, &mut user, &identity.email)?;
            if assignment.changed() {
                store.update_user(&user)?;
            }
            return Ok(SignIn {
                user,
                created: false,
                assignment,
            });
        }

        let mut user = StoredUser::new(
            &identity.email,
            identity.name.clone(),
            identity.external_id.clone(),
        );
        let assignment = self.resolve_role(store, &mut user, &identity.email)?;

        match store.insert_user(&user) {
            Ok(()) => Ok(SignIn {
                user,
                created: true,
                assignment,
            }),
            Err(StoreError::AlreadyExists(_)) => {
                // Lost a race with a concurrent first sign-in for this email.
                tracing::debug!(email = %identity.email, "User created concurrently, retrying as existing");
                let mut existing = store
                    .find_user_by_email(&identity.email)?
                    .ok_or_else(|| StoreError::NotFound(format!("User {}", identity.email)))?;
                let assignment = self.resolve_role(store, &mut existing, &identity.email)?;
                if assignment.changed() {
                    store.update_user(&existing)?;
                }
                Ok(SignIn {
                    user: existing,
                    created: false,
                    assignment,
                })
            }
            Err(e) => Err(e),
        }
    }
}
