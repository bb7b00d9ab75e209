// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process session store.
//!
//! A session is an opaque bearer token bound to a user id. Sessions expire
//! after a fixed TTL; when the store is full the least recently used session
//! is evicted.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lru::LruCache;
use tokio_util::sync::CancellationToken;

use super::error::AuthError;

/// An established session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Bounded session store with TTL.
pub struct SessionStore {
    sessions: Mutex<LruCache<String, Session>>,
    ttl: Duration,
}

impl SessionStore {
    /// - `capacity`: Max number of live sessions.
    /// - `ttl`: Lifetime of each session.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            ttl,
        }
    }

    /// Open a session for `user_id`.
    pub fn create(&self, user_id: &str) -> Result<Session, AuthError> {
        let now = Utc::now();
        let expires_at = expiry_after(now, self.ttl).ok_or_else(|| {
            AuthError::InternalError(format!("Session TTL out of range: {:?}", self.ttl))
        })?;
        let session = Session {
            token: uuid::Uuid::new_v4().simple().to_string(),
            user_id: user_id.to_string(),
            created_at: now,
            expires_at,
        };

        let mut sessions = self.lock()?;
        sessions.put(session.token.clone(), session.clone());
        Ok(session)
    }

    /// Look up a live session. Expired sessions are removed on access.
    pub fn get(&self, token: &str) -> Result<Session, AuthError> {
        let mut sessions = self.lock()?;
        let session = sessions.get(token).cloned().ok_or(AuthError::UnknownSession)?;
        if session.is_expired(Utc::now()) {
            sessions.pop(token);
            return Err(AuthError::SessionExpired);
        }
        Ok(session)
    }

    /// Revoke a session. Returns whether it existed.
    pub fn revoke(&self, token: &str) -> bool {
        self.lock()
            .map(|mut sessions| sessions.pop(token).is_some())
            .unwrap_or(false)
    }

    /// Drop every expired session. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let Ok(mut sessions) = self.lock() else {
            return 0;
        };
        let now = Utc::now();
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| s.is_expired(now))
            .map(|(token, _)| token.clone())
            .collect();
        for token in &expired {
            sessions.pop(token);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, LruCache<String, Session>>, AuthError> {
        self.sessions
            .lock()
            .map_err(|_| AuthError::InternalError("session store lock poisoned".to_string()))
    }
}

/// `now + ttl`, or `None` when the sum leaves the representable range.
pub fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> Option<DateTime<Utc>> {
    let ttl = chrono::Duration::from_std(ttl).ok()?;
    now.checked_add_signed(ttl)
}

/// Periodically purge expired sessions until `shutdown` is cancelled.
///
/// A zero `interval` disables the sweeper; expired sessions are then only
/// dropped on access.
pub async fn run_session_sweeper(
    store: std::sync::Arc<SessionStore>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    if interval.is_zero() {
        tracing::warn!("Session sweep interval is zero, sweeper not started");
        return;
    }
    tracing::info!(interval_secs = interval.as_secs(), "Session sweeper started");
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("Session sweeper shutting down");
                break;
            }
            _ = ticker.tick() => {
                let purged = store.purge_expired();
                if purged > 0 {
                    tracing::debug!(purged, "Purged expired sessions");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn create_and_get() {
        let store = SessionStore::new(10, Duration::from_secs(300));
        let session = store.create("user-1").unwrap();
        let found = store.get(&session.token).unwrap();
        assert_eq!(found.user_id, "user-1");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn unknown_token_is_rejected() {
        let store = SessionStore::new(10, Duration::from_secs(300));
        assert!(matches!(store.get("nope"), Err(AuthError::UnknownSession)));
    }

    #[test]
    fn expired_session_is_rejected_and_removed() {
        let store = SessionStore::new(10, Duration::from_millis(1));
        let session = store.create("user-1").unwrap();
        std::thread::sleep(Duration::from_millis(5));

        assert!(matches!(store.get(&session.token), Err(AuthError::SessionExpired)));
        assert!(matches!(store.get(&session.token), Err(AuthError::UnknownSession)));
    }

    #[test]
    fn revoke_removes_session() {
        let store = SessionStore::new(10, Duration::from_secs(300));
        let session = store.create("user-1").unwrap();
        assert!(store.revoke(&session.token));
        assert!(!store.revoke(&session.token));
        assert!(store.is_empty());
    }

    #[test]
    fn capacity_evicts_least_recent() {
        let store = SessionStore::new(2, Duration::from_secs(300));
        let first = store.create("a").unwrap();
        let second = store.create("b").unwrap();
        let _third = store.create("c").unwrap();

        assert!(store.get(&first.token).is_err());
        assert!(store.get(&second.token).is_ok());
    }

    #[test]
    fn purge_expired_counts() {
        let store = SessionStore::new(10, Duration::from_millis(1));
        store.create("a").unwrap();
        store.create("b").unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(store.purge_expired(), 2);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn sweeper_stops_on_cancel() {
        let store = Arc::new(SessionStore::new(10, Duration::from_secs(300)));
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run_session_sweeper(
            store,
            Duration::from_millis(10),
            shutdown.clone(),
        ));
        shutdown.cancel();
        handle.await.unwrap();
    }

    #[test]
    fn out_of_range_ttl_is_an_error() {
        let store = SessionStore::new(10, Duration::from_secs(1_000_000_000_000_000));
        assert!(matches!(store.create("u"), Err(AuthError::InternalError(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn expiry_after_rejects_overflow() {
        let now = Utc::now();
        assert!(expiry_after(now, Duration::from_secs(60)).is_some());
        assert!(expiry_after(now, Duration::from_secs(u64::MAX)).is_none());
        assert!(expiry_after(now, Duration::from_secs(400_000 * 365 * 86_400)).is_none());
    }

    #[tokio::test]
    async fn sweeper_with_zero_interval_returns() {
        let store = Arc::new(SessionStore::new(10, Duration::from_secs(300)));
        let handle = tokio::spawn(run_session_sweeper(
            store,
            Duration::ZERO,
            CancellationToken::new(),
        ));
        handle.await.unwrap();
    }
}
