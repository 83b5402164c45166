//! In-memory login state keyed by username.
//!
//! The checker itself is stateless; this wrapper stores only the boolean
//! verdict of the most recent attempt per user, never credential material.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::checker::CredentialChecker;

/// Thread-safe map of username to "last attempt succeeded".
#[derive(Debug, Default)]
pub struct SessionStore {
    verdicts: Mutex<HashMap<String, bool>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one authentication attempt and record its verdict.
    pub fn login(&self, checker: &CredentialChecker, username: &str, password: &str) -> bool {
        let valid = checker.authenticate(username, password);
        self.lock().insert(username.to_string(), valid);
        valid
    }

    /// Whether the most recent recorded attempt for `username` succeeded.
    /// Unknown usernames are not logged in.
    pub fn is_logged_in(&self, username: &str) -> bool {
        self.lock().get(username).copied().unwrap_or(false)
    }

    /// Forget `username`. Unknown names are fine.
    pub fn logout(&self, username: &str) {
        self.lock().remove(username);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, bool>> {
        // A poisoned map still holds nothing but booleans; keep serving it.
        self.verdicts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
