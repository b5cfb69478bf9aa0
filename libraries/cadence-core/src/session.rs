//! Session context
//!
//! The signed-in identity lives in exactly one place. Every component that
//! talks to the backend gets a clone of the same [`SessionContext`] at
//! construction time and reads the current session from it per call.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// An authenticated identity
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub access_token: String,
}

impl Session {
    pub fn new(user_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            access_token: access_token.into(),
        }
    }
}

// Keep tokens out of logs
impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// Shared, watchable holder of the current session
///
/// Cloning is cheap; all clones observe the same state.
#[derive(Clone, Debug)]
pub struct SessionContext {
    tx: Arc<watch::Sender<Option<Session>>>,
}

impl SessionContext {
    /// Create a context with no session (guest)
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Create a context that is already signed in
    pub fn signed_in(session: Session) -> Self {
        let ctx = Self::new();
        ctx.sign_in(session);
        ctx
    }

    /// Current session, if any
    pub fn current(&self) -> Option<Session> {
        self.tx.borrow().clone()
    }

    pub fn user_id(&self) -> Option<String> {
        self.tx.borrow().as_ref().map(|s| s.user_id.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.tx.borrow().is_some()
    }

    pub fn sign_in(&self, session: Session) {
        info!(user_id = %session.user_id, "Session started");
        self.tx.send_replace(Some(session));
    }

    pub fn sign_out(&self) {
        if self.tx.send_replace(None).is_some() {
            info!("Session ended");
        }
    }

    /// Receiver that wakes on every sign in/out
    pub fn watch(&self) -> watch::Receiver<Option<Session>> {
        self.tx.subscribe()
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}
