// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication and Authorization Module
//!
//! ## Auth Flow
//!
//! 1. The frontend authenticates the user with the identity provider
//! 2. It posts the ID token (and optionally a profile payload) to
//!    `/v1/auth/login`
//! 3. The server:
//!    - Verifies the token (JWKS or shared secret), falling back to the
//!      profile payload when the token is unusable
//!    - Loads or creates the user and resolves their role
//!    - Opens a session and returns its bearer token
//! 4. Later requests send `Authorization: Bearer <session token>`; protected
//!    routes additionally pass through the access guard
//!
//! ## Roles
//!
//! Nurse assignments are never downgraded by automated resolution. Users
//! without a role are checked by the guard as its configured fallback
//! (nurse by default).

pub mod claims;
pub mod email;
pub mod error;
pub mod extractor;
pub mod guard;
pub mod identity;
pub mod jwks;
pub mod middleware;
pub mod policy;
pub mod resolver;
pub mod roles;
pub mod session;

pub use claims::AuthenticatedUser;
pub use error::AuthError;
pub use extractor::Auth;
pub use guard::{authorize, AccessDecision, AccessGuard, AllowedRoles, Denial, DenialReason, ResponseMode};
pub use identity::{FallbackProfile, IdentitySource, IdentityVerifier, VerifiedIdentity, VerifierMode};
pub use jwks::JwksManager;
pub use middleware::{enforce_access, AccessGate};
pub use policy::AccessPolicy;
pub use resolver::{IdentityStore, RoleAssignmentResult, RoleMapping, RoleResolver, SignIn};
pub use roles::{Capabilities, Role, RoleKind};
pub use session::{Session, SessionStore};
