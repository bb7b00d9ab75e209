// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-resource allowed role sets.

use std::collections::BTreeMap;

use super::guard::AllowedRoles;
use super::roles::{RoleKind, UnknownRole};

/// User listing, role reassignment and audit queries.
pub const USER_MANAGEMENT: &str = "user_management";
pub const PATIENTS: &str = "patients";
pub const CONSULTATIONS: &str = "consultations";
pub const MEDICAL_HISTORY: &str = "medical_history";
pub const INVENTORY: &str = "inventory";
pub const REPORTS: &str = "reports";
pub const PROFILE: &str = "profile";

/// Error parsing an access policy override.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("policy entry '{0}' is not of the form resource=role|role")]
    MalformedEntry(String),
    #[error("policy entry for '{0}' allows no roles")]
    EmptyRoleSet(String),
    #[error(transparent)]
    UnknownRole(#[from] UnknownRole),
}

/// Resource name → allowed roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPolicy {
    resources: BTreeMap<String, AllowedRoles>,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        use RoleKind::{Doctor, Employee, Nurse, Student};

        let staff = [Nurse, Doctor];
        let entries: [(&str, &[RoleKind]); 7] = [
            (USER_MANAGEMENT, &[Nurse]),
            (PATIENTS, &staff),
            (CONSULTATIONS, &staff),
            (MEDICAL_HISTORY, &staff),
            (INVENTORY, &[Nurse]),
            (REPORTS, &staff),
            (PROFILE, &[Nurse, Doctor, Student, Employee]),
        ];

        Self {
            resources: entries
                .into_iter()
                .map(|(name, roles)| (name.to_string(), roles.iter().copied().collect()))
                .collect(),
        }
    }
}

impl AccessPolicy {
    /// Policy with no resources.
    pub fn empty() -> Self {
        Self {
            resources: BTreeMap::new(),
        }
    }

    /// Set the allowed roles for a resource.
    pub fn with_resource(mut self, resource: &str, allowed: AllowedRoles) -> Self {
        self.resources.insert(resource.trim().to_lowercase(), allowed);
        self
    }

    /// Apply overrides of the form `resource=role|role;resource=role`.
    pub fn with_overrides(mut self, overrides: &str) -> Result<Self, PolicyError> {
        for entry in overrides.split(';') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let (resource, roles) = entry
                .split_once('=')
                .ok_or_else(|| PolicyError::MalformedEntry(entry.to_string()))?;
            let resource = resource.trim();
            if resource.is_empty() {
                return Err(PolicyError::MalformedEntry(entry.to_string()));
            }

            let allowed = AllowedRoles::from_names(
                roles.split(['|', ',']).map(str::trim).filter(|r| !r.is_empty()),
            )?;
            if allowed.is_empty() {
                return Err(PolicyError::EmptyRoleSet(resource.to_string()));
            }
            self = self.with_resource(resource, allowed);
        }
        Ok(self)
    }

    /// Allowed roles for a resource, if it is protected.
    pub fn allowed_for(&self, resource: &str) -> Option<&AllowedRoles> {
        self.resources.get(&resource.trim().to_lowercase())
    }

    /// All protected resources, ordered by name.
    pub fn resources(&self) -> impl Iterator<Item = (&str, &AllowedRoles)> {
        self.resources.iter().map(|(name, roles)| (name.as_str(), roles))
    }
}
