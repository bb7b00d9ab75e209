// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;
use std::time::Instant;

use crate::auth::{AccessGuard, AccessPolicy, IdentityVerifier, RoleResolver, SessionStore};
use crate::storage::IdentityDatabase;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<IdentityDatabase>,
    pub sessions: Arc<SessionStore>,
    pub resolver: Arc<RoleResolver>,
    pub guard: AccessGuard,
    pub policy: Arc<AccessPolicy>,
    pub verifier: Arc<IdentityVerifier>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        db: IdentityDatabase,
        sessions: SessionStore,
        resolver: RoleResolver,
        verifier: IdentityVerifier,
    ) -> Self {
        Self {
            db: Arc::new(db),
            sessions: Arc::new(sessions),
            resolver: Arc::new(resolver),
            guard: AccessGuard::default(),
            policy: Arc::new(AccessPolicy::default()),
            verifier: Arc::new(verifier),
            started_at: Instant::now(),
        }
    }

    pub fn with_guard(mut self, guard: AccessGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn with_policy(mut self, policy: AccessPolicy) -> Self {
        self.policy = Arc::new(policy);
        self
    }
}
