//! In-memory handle to the authenticated session.

use std::sync::{Arc, Mutex, PoisonError};

use agora_shared::types::{Session, UserId};

/// Shared, cloneable handle to the current session.
///
/// Populated at login and cleared on logout or when the backend stops
/// accepting the session cookie.
#[derive(Debug, Clone, Default)]
pub struct SessionHandle {
    inner: Arc<Mutex<Option<Session>>>,
}

impl SessionHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the session established by a successful login.
    pub fn set(&self, session: Session) {
        *self.lock() = Some(session);
    }

    /// Forget the stored session.
    pub fn clear(&self) {
        *self.lock() = None;
    }

    /// Whether a session is currently stored.
    pub fn is_authenticated(&self) -> bool {
        self.lock().is_some()
    }

    /// The authenticated user, if any.
    pub fn current(&self) -> Option<Session> {
        self.lock().clone()
    }

    /// The authenticated user's id, if any.
    pub fn current_user_id(&self) -> Option<UserId> {
        self.lock().as_ref().map(|s| s.user_id)
    }

    // The only invariant here is the Option itself, so a poisoned lock is
    // still safe to read through.
    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Session>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
