//! Local session cache
//!
//! Mirrors the last known identity so the app can decide which view to show at launch without
//! waiting for the identity provider. The cache performs no validation, it stores what it is
//! given. Storage failures are logged and otherwise ignored, reads fall back to defaults.

use std::sync::Arc;

use tracing::warn;

use crate::model::Session;
use crate::storage::KeyValueStore;

pub const USER_ID_KEY: &str = "user_id";
pub const USER_EMAIL_KEY: &str = "user_email";
pub const IS_LOGGED_IN_KEY: &str = "is_logged_in";

#[derive(Clone)]
pub struct SessionCache {
    store: Arc<dyn KeyValueStore>,
}

impl SessionCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Stores the identity and marks the session as active
    pub fn save(&self, user_id: &str, email: &str) {
        let results = [
            self.store.set_string(USER_ID_KEY, user_id),
            self.store.set_string(USER_EMAIL_KEY, email),
            self.store.set_bool(IS_LOGGED_IN_KEY, true),
        ];

        for err in results.into_iter().filter_map(Result::err) {
            warn!(%err, "Cannot save session");
        }
    }

    /// Reads the cached session
    pub fn get(&self) -> Session {
        Session {
            user_id: self.store.get_string(USER_ID_KEY),
            email: self.store.get_string(USER_EMAIL_KEY),
            is_logged_in: self.is_logged_in(),
        }
    }

    /// Forgets the identity and marks the session as inactive
    pub fn clear(&self) {
        let results = [
            self.store.remove(USER_ID_KEY),
            self.store.remove(USER_EMAIL_KEY),
            self.store.set_bool(IS_LOGGED_IN_KEY, false),
        ];

        for err in results.into_iter().filter_map(Result::err) {
            warn!(%err, "Cannot clear session");
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.store.get_bool(IS_LOGGED_IN_KEY).unwrap_or(false)
    }
}
