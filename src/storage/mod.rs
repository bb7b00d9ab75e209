// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Identity Storage Module
//!
//! Persistent storage for users, the role set and the audit trail, kept in a
//! single embedded redb database under the data directory.
//!
//! ## Storage Layout
//!
//! ```text
//! /data/
//!   identity.redb   # users, email index, roles, audit events
//! ```
//!
//! Email uniqueness is enforced inside the write transaction that creates a
//! user. Updates are last-write-wins.

pub mod audit;
pub mod identity_db;

pub use audit::{AuditEvent, AuditEventType, AuditQuery, AuditRepository};
pub use identity_db::{IdentityDatabase, StoreError, StoreResult, StoredUser};
