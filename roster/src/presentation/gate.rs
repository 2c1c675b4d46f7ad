//! Root navigation gate

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use crate::auth::{self, AuthGateway};
use crate::subscription::Subscription;

/// Top level view selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Before the cached session was consulted
    Initializing,
    LoggedOut,
    LoggedIn,
}

/// Chooses between the login and the roster views
///
/// The initial route comes from the session cache, so it is known before anything is drawn.
/// Afterwards the route follows the identity provider.
#[derive(Debug)]
pub struct RootGate {
    route: Arc<watch::Sender<Route>>,
    subscription: Option<Subscription>,
}

impl RootGate {
    pub fn new() -> Self {
        let (route, _) = watch::channel(Route::Initializing);
        Self {
            route: Arc::new(route),
            subscription: None,
        }
    }

    /// Resolves the initial route and starts following auth state
    ///
    /// Mounting an already mounted gate replaces the previous subscription.
    pub fn mount(&mut self, auth: &AuthGateway) -> Route {
        let initial = if auth.cache().is_logged_in() {
            Route::LoggedIn
        } else {
            Route::LoggedOut
        };
        self.route.send_replace(initial);
        info!(route = ?initial, "Initial route resolved from cached session");

        let route = self.route.clone();
        let subscription = auth.on_auth_state_changed(move |user| {
            let next = match user.as_ref().and_then(|user| user.email()) {
                Some(_) => Route::LoggedIn,
                None => Route::LoggedOut,
            };
            route.send_if_modified(|current| {
                let changed = *current != next;
                if changed {
                    info!(from = ?*current, to = ?next, "Route changed");
                    *current = next;
                }
                changed
            });
        });

        if let Some(mut previous) = self.subscription.replace(subscription) {
            previous.unsubscribe();
        }
        self.route()
    }

    pub fn route(&self) -> Route {
        *self.route.borrow()
    }

    /// Receiver following route changes
    pub fn watch(&self) -> watch::Receiver<Route> {
        self.route.subscribe()
    }

    /// Explicit logout, the gate switches to the login view even if the provider fails
    pub async fn logout(&self, auth: &AuthGateway) -> Result<(), auth::Error> {
        let result = auth.logout().await;
        self.route.send_replace(Route::LoggedOut);
        result
    }

    /// Stops following auth state
    pub fn unmount(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}

impl Default for RootGate {
    fn default() -> Self {
        Self::new()
    }
}
