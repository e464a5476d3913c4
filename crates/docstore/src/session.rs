//! Session consistency context.
//!
//! The store hands out a session token with every write; sending it back on
//! reads gives read-your-writes freshness. The client keeps the latest token
//! in a [`SessionContainer`] that the retry policy engine owns. Readers take
//! an immutable [`ConsistencyContext`] snapshot, and updates or resets swap
//! in a fresh context instead of mutating the current one.
//!
//! Writes are advisory. Two operations may race on the token and one of the
//! updates may be lost; that only affects freshness, never the outcome of a
//! create/conflict decision, which the server arbitrates.

use std::sync::{Arc, RwLock};

/// Immutable snapshot of the session state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsistencyContext {
    session_token: Option<String>,
    generation: u64,
}

impl ConsistencyContext {
    /// Create a context holding `session_token`.
    pub fn new(session_token: Option<String>) -> Self {
        Self {
            session_token,
            generation: 0,
        }
    }

    /// Cached session token, if any.
    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    /// Number of updates and resets applied before this snapshot.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// A new context without a session token.
    pub fn reset(&self) -> Self {
        Self {
            session_token: None,
            generation: self.generation + 1,
        }
    }

    /// A new context carrying `token`.
    pub fn with_token(&self, token: impl Into<String>) -> Self {
        Self {
            session_token: Some(token.into()),
            generation: self.generation + 1,
        }
    }
}

/// Shared, injectable holder of the current [`ConsistencyContext`].
#[derive(Debug, Default)]
pub struct SessionContainer {
    current: RwLock<Arc<ConsistencyContext>>,
}

impl SessionContainer {
    /// Create a container starting from `context`.
    pub fn new(context: ConsistencyContext) -> Self {
        Self {
            current: RwLock::new(Arc::new(context)),
        }
    }

    /// Current context snapshot.
    pub fn snapshot(&self) -> Arc<ConsistencyContext> {
        // A poisoned lock still holds a whole Arc; the value is always usable.
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&*guard)
    }

    /// Record the token returned by a successful response.
    pub fn update_token(&self, token: &str) {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        if guard.session_token() == Some(token) {
            return;
        }
        *guard = Arc::new(guard.with_token(token));
    }

    /// Drop the cached token and return the new context.
    pub fn reset(&self) -> Arc<ConsistencyContext> {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        let next = Arc::new(guard.reset());
        *guard = Arc::clone(&next);
        tracing::debug!(generation = next.generation(), "Session token reset");
        next
    }
}
