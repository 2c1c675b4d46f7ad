//! Authentication gateway
//!
//! Thin layer over the identity provider keeping the local session cache in sync. Provider
//! failures are returned as [`Error`] values carrying the provider message, nothing is retried.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::cache::SessionCache;
use crate::model::User;
use crate::provider::{IdentityProvider, ProviderError};
use crate::subscription::Subscription;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Failure reported by the identity provider, including its input validation
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

#[derive(Clone)]
pub struct AuthGateway {
    provider: Arc<dyn IdentityProvider>,
    cache: SessionCache,
}

impl AuthGateway {
    pub fn new(provider: Arc<dyn IdentityProvider>, cache: SessionCache) -> Self {
        Self { provider, cache }
    }

    /// Session cache this gateway writes to
    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    /// Creates an account, caching the session on success
    #[instrument(skip(self, password))]
    pub async fn register(&self, email: &str, password: &str) -> Result<User, Error> {
        let user = self
            .provider
            .create_user_with_email_and_password(email, password)
            .await
            .inspect_err(|err| warn!(%err, "Registration rejected"))?;

        self.write_through(&user);
        info!(uid = %user.uid, "Account registered");
        Ok(user)
    }

    /// Signs in an existing account, caching the session on success
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<User, Error> {
        let user = self
            .provider
            .sign_in_with_email_and_password(email, password)
            .await
            .inspect_err(|err| warn!(%err, "Login rejected"))?;

        self.write_through(&user);
        info!(uid = %user.uid, "Logged in");
        Ok(user)
    }

    /// Signs out remotely. The cache is cleared even if the provider fails.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<(), Error> {
        let result = self.provider.sign_out().await;
        self.cache.clear();

        match result {
            Ok(()) => {
                info!("Logged out");
                Ok(())
            }
            Err(err) => {
                warn!(%err, "Remote sign out failed, local session cleared anyway");
                Err(err.into())
            }
        }
    }

    /// Provider's in-memory identity, `None` if nobody signed in during this process
    pub fn current_user(&self) -> Option<User> {
        self.provider.current_user()
    }

    /// Observes identity transitions
    ///
    /// The cache is reconciled before `callback` runs: an email-bearing identity is saved,
    /// anything else clears the cache.
    pub fn on_auth_state_changed(
        &self,
        mut callback: impl FnMut(Option<User>) + Send + 'static,
    ) -> Subscription {
        let cache = self.cache.clone();
        self.provider.on_auth_state_changed(Box::new(move |user| {
            match user.as_ref().and_then(|user| Some((&user.uid, user.email()?))) {
                Some((uid, email)) => cache.save(uid, email),
                None => cache.clear(),
            }
            callback(user);
        }))
    }

    fn write_through(&self, user: &User) {
        if let Some(email) = user.email() {
            self.cache.save(&user.uid, email);
        }
    }
}
