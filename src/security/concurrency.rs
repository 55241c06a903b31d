//! Per-session concurrency control.
//!
//! Each caller-supplied session token may have at most one request in flight.
//! Admission hands out a [`SessionLease`] that releases its slot on `Drop`,
//! so release happens on every exit path: success, handled error, panic, or
//! a cancelled request future.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::security::deny::DenyReason;

#[derive(Debug, Clone)]
pub struct SessionGuardConfig {
    /// Ceiling on simultaneously held leases across all sessions.
    pub max_active_sessions: usize,
    /// Leases older than this are considered wedged and swept.
    pub stale_after: Duration,
}

impl Default for SessionGuardConfig {
    fn default() -> Self {
        Self {
            max_active_sessions: 100,
            stale_after: Duration::from_secs(600),
        }
    }
}

/// Tracks which session tokens currently have a request in flight.
#[derive(Clone)]
pub struct SessionGuard {
    config: Arc<SessionGuardConfig>,
    leases: Arc<DashMap<String, Instant>>,
}

impl SessionGuard {
    pub fn new(config: SessionGuardConfig) -> Self {
        Self {
            config: Arc::new(config),
            leases: Arc::new(DashMap::new()),
        }
    }

    /// Try to begin processing a request for `session_token`.
    ///
    /// Fails with `MissingSessionId` when no token is supplied, with
    /// `ConcurrentRequestInProgress` when the token already holds a lease,
    /// and with `SessionCapacityExceeded` when the global ceiling is reached.
    pub fn enter(&self, session_token: Option<&str>) -> Result<SessionLease, DenyReason> {
        let token = session_token
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(DenyReason::MissingSessionId)?;

        // A duplicate request for an active session must report the
        // concurrency conflict even when the table is full, so this check
        // comes before the capacity ceiling.
        if self.leases.contains_key(token) {
            return Err(DenyReason::ConcurrentRequestInProgress);
        }

        if self.leases.len() >= self.config.max_active_sessions {
            return Err(DenyReason::SessionCapacityExceeded);
        }

        match self.leases.entry(token.to_string()) {
            Entry::Occupied(_) => Err(DenyReason::ConcurrentRequestInProgress),
            Entry::Vacant(slot) => {
                slot.insert(Instant::now());
                Ok(SessionLease {
                    token: token.to_string(),
                    leases: Arc::clone(&self.leases),
                })
            }
        }
    }

    /// Drop leases older than the stale threshold.
    ///
    /// Defensive backstop only; the primary guarantee is `Drop` on
    /// [`SessionLease`]. A lease this old means a release was somehow missed.
    pub fn sweep(&self) {
        let now = Instant::now();
        let stale_after = self.config.stale_after;
        let before = self.leases.len();
        self.leases
            .retain(|_, started| now.duration_since(*started) < stale_after);
        // Other tasks may acquire leases while retain runs, so len() can
        // exceed the snapshot.
        let swept = before.saturating_sub(self.leases.len());
        if swept > 0 {
            tracing::warn!(swept, "Swept stale session leases");
        }
    }

    /// Number of sessions currently holding a lease.
    pub fn active_sessions(&self) -> usize {
        self.leases.len()
    }

    /// Drop all leases. Used on graceful shutdown.
    pub fn clear(&self) {
        self.leases.clear();
    }
}

/// Held while one request for a session is in flight; releases on `Drop`.
#[derive(Debug)]
pub struct SessionLease {
    token: String,
    leases: Arc<DashMap<String, Instant>>,
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.leases.remove(&self.token);
    }
}
