//! Long-lived callback registrations
//!
//! Providers deliver events by calling back into the registering code. Every registration hands
//! out a [`Subscription`], and cancelling it guarantees the callback is never invoked again once
//! `unsubscribe` returns. Delivery order follows the provider, not the order of registration.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use derivative::Derivative;

/// Handle to a live registration
///
/// Unsubscribing is idempotent. Dropping the handle unsubscribes as well.
#[must_use = "dropping a subscription cancels it"]
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Subscription {
    #[derivative(Debug = "ignore")]
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Creates subscription running `cancel` on the first unsubscribe
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Checks if the subscription was not cancelled yet
    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }

    /// Cancels the registration. No-op when already cancelled.
    pub fn unsubscribe(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

type Callback<T> = Box<dyn FnMut(T) + Send>;

/// Callback slot shared between a provider and the subscription handle
///
/// The callback runs under the slot lock, so cancelling from another task waits for an ongoing
/// delivery to finish. Cancelling from inside the callback itself would deadlock.
#[derive(Derivative)]
#[derivative(Debug(bound = ""), Clone(bound = ""))]
pub struct Listener<T> {
    #[derivative(Debug = "ignore")]
    slot: Arc<Mutex<Option<Callback<T>>>>,
}

impl<T> Listener<T> {
    pub fn new(callback: impl FnMut(T) + Send + 'static) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(Box::new(callback)))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Callback<T>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Invokes the callback, returns `false` if the listener is cancelled
    pub fn deliver(&self, value: T) -> bool {
        match self.lock().as_mut() {
            Some(callback) => {
                callback(value);
                true
            }
            None => false,
        }
    }

    /// Drops the callback
    pub fn cancel(&self) {
        self.lock().take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.lock().is_none()
    }
}

impl<T: 'static> Listener<T> {
    /// Handle cancelling this listener
    pub fn subscription(&self) -> Subscription {
        let listener = self.clone();
        Subscription::new(move || listener.cancel())
    }
}
