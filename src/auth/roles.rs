// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Clinic roles for authorization.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

/// Kind of clinic role.
///
/// ## Role Tiers
///
/// - `Nurse` - Clinic staff managing records and inventory
/// - `Doctor` - Consultations and reports
/// - `Student` - Patient self-service (default for new sign-ins)
/// - `Employee` - Patient self-service for staff members
///
/// Names parse case-insensitively, so stored rows written as `"Student"`
/// and `"student"` are the same role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RoleKind {
    Nurse,
    Doctor,
    Student,
    Employee,
}

/// A role name that is not one of the clinic roles.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl RoleKind {
    /// Every role kind, in declaration order.
    pub const ALL: [RoleKind; 4] = [
        RoleKind::Nurse,
        RoleKind::Doctor,
        RoleKind::Student,
        RoleKind::Employee,
    ];

    /// Parse a role name (case-insensitive, surrounding whitespace ignored).
    pub fn from_name(name: &str) -> Option<RoleKind> {
        match name.trim().to_lowercase().as_str() {
            "nurse" => Some(RoleKind::Nurse),
            "doctor" => Some(RoleKind::Doctor),
            "student" => Some(RoleKind::Student),
            "employee" => Some(RoleKind::Employee),
            _ => None,
        }
    }

    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleKind::Nurse => "nurse",
            RoleKind::Doctor => "doctor",
            RoleKind::Student => "student",
            RoleKind::Employee => "employee",
        }
    }

    /// Default role definition (level and capabilities) for this kind.
    pub fn default_role(self) -> Role {
        match self {
            RoleKind::Nurse => Role::new(self, 3, Capabilities::all()),
            RoleKind::Doctor => Role::new(
                self,
                2,
                Capabilities {
                    inventory_access: false,
                    reports_access: true,
                },
            ),
            RoleKind::Student | RoleKind::Employee => Role::new(self, 1, Capabilities::none()),
        }
    }
}

impl FromStr for RoleKind {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RoleKind::from_name(s).ok_or_else(|| UnknownRole(s.to_string()))
    }
}

impl<'de> Deserialize<'de> for RoleKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability flags attached to a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub struct Capabilities {
    /// May open the medicine/supply inventory.
    pub inventory_access: bool,
    /// May open clinic reports.
    pub reports_access: bool,
}

impl Capabilities {
    pub fn all() -> Self {
        Self {
            inventory_access: true,
            reports_access: true,
        }
    }

    pub fn none() -> Self {
        Self::default()
    }
}

/// A named permission tier in the role set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Role {
    /// Role kind (serialized as its lowercase name)
    pub kind: RoleKind,
    /// Ordinal level; higher is more privileged
    pub level: u8,
    /// Capability flags
    pub capabilities: Capabilities,
}

impl Role {
    pub fn new(kind: RoleKind, level: u8, capabilities: Capabilities) -> Self {
        Self {
            kind,
            level,
            capabilities,
        }
    }

    /// The full default role set, one entry per kind.
    pub fn default_set() -> Vec<Role> {
        RoleKind::ALL.iter().map(|k| k.default_role()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_name_is_case_insensitive() {
        assert_eq!(RoleKind::from_name("nurse"), Some(RoleKind::Nurse));
        assert_eq!(RoleKind::from_name("NURSE"), Some(RoleKind::Nurse));
        assert_eq!(RoleKind::from_name("Student"), Some(RoleKind::Student));
        assert_eq!(RoleKind::from_name(" employee "), Some(RoleKind::Employee));
        assert_eq!(RoleKind::from_name("admin"), None);
    }

    #[test]
    fn deserializes_mixed_case_names() {
        let kind: RoleKind = serde_json::from_str(r#""Student""#).unwrap();
        assert_eq!(kind, RoleKind::Student);

        let err = serde_json::from_str::<RoleKind>(r#""janitor""#).unwrap_err();
        assert!(err.to_string().contains("unknown role"));
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(serde_json::to_string(&RoleKind::Doctor).unwrap(), r#""doctor""#);
        assert_eq!(RoleKind::Employee.to_string(), "employee");
    }

    #[test]
    fn default_set_covers_every_kind() {
        let set = Role::default_set();
        assert_eq!(set.len(), RoleKind::ALL.len());
        for kind in RoleKind::ALL {
            assert!(set.iter().any(|r| r.kind == kind));
        }
    }

    #[test]
    fn nurse_outranks_student() {
        let nurse = RoleKind::Nurse.default_role();
        let student = RoleKind::Student.default_role();
        assert!(nurse.level > student.level);
        assert!(nurse.capabilities.inventory_access);
        assert!(!student.capabilities.reports_access);
    }
}
