//! In-memory providers for tests
//!
//! Both doubles deliver callbacks synchronously, inside the call that caused them, which keeps
//! the tests deterministic on a single threaded runtime.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;

use crate::model::User;
use crate::provider::{
    AuthStateCallback, Document, DocumentStore, Fields, IdentityProvider, OrderBy, ProviderError,
    SnapshotCallback, WriteFields, resolve_fields,
};
use crate::subscription::{Listener, Subscription};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct Identities {
    /// email -> (uid, password)
    accounts: HashMap<String, (String, String)>,
    current: Option<User>,
    listeners: Vec<Listener<Option<User>>>,
    next_uid: u64,
    failure: Option<ProviderError>,
}

/// Identity provider double
#[derive(Default)]
pub struct MemoryIdentityProvider {
    inner: Mutex<Identities>,
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every following call fails with `err` until reset with `None`
    pub fn fail_with(&self, err: Option<ProviderError>) {
        lock(&self.inner).failure = err;
    }

    /// Simulates a transition triggered outside of this client (token expiry, login elsewhere)
    pub fn emit(&self, user: Option<User>) {
        lock(&self.inner).current = user;
        self.notify();
    }

    fn check(&self) -> Result<(), ProviderError> {
        match &lock(&self.inner).failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn notify(&self) {
        let (current, listeners) = {
            let mut inner = lock(&self.inner);
            inner.listeners.retain(|listener| !listener.is_cancelled());
            (inner.current.clone(), inner.listeners.clone())
        };

        for listener in listeners {
            listener.deliver(current.clone());
        }
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn create_user_with_email_and_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<User, ProviderError> {
        self.check()?;
        let user = {
            let mut inner = lock(&self.inner);
            if inner.accounts.contains_key(email) {
                return Err(ProviderError::new(
                    "auth/email-already-in-use",
                    "The email address is already in use by another account.",
                ));
            }
            if password.len() < 6 {
                return Err(ProviderError::new(
                    "auth/weak-password",
                    "The given password is invalid.",
                ));
            }

            inner.next_uid += 1;
            let uid = format!("uid{}", inner.next_uid);
            inner
                .accounts
                .insert(email.to_owned(), (uid.clone(), password.to_owned()));

            let user = User::new(uid, email);
            inner.current = Some(user.clone());
            user
        };

        self.notify();
        Ok(user)
    }

    async fn sign_in_with_email_and_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<User, ProviderError> {
        self.check()?;
        let user = {
            let mut inner = lock(&self.inner);
            let (uid, expected) = inner.accounts.get(email).ok_or_else(|| {
                ProviderError::new(
                    "auth/user-not-found",
                    "There is no user record corresponding to this identifier.",
                )
            })?;
            if expected != password {
                return Err(ProviderError::new(
                    "auth/wrong-password",
                    "The password is invalid.",
                ));
            }

            let user = User::new(uid.clone(), email);
            inner.current = Some(user.clone());
            user
        };

        self.notify();
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        self.check()?;
        lock(&self.inner).current = None;
        self.notify();
        Ok(())
    }

    fn current_user(&self) -> Option<User> {
        lock(&self.inner).current.clone()
    }

    fn on_auth_state_changed(&self, callback: AuthStateCallback) -> Subscription {
        let listener = Listener::new(callback);
        let current = {
            let mut inner = lock(&self.inner);
            inner.listeners.push(listener.clone());
            inner.current.clone()
        };

        listener.deliver(current);
        listener.subscription()
    }
}

struct Watch {
    collection: String,
    order: OrderBy,
    listener: Listener<Result<Vec<Document>, ProviderError>>,
}

#[derive(Default)]
struct Collections {
    documents: HashMap<String, BTreeMap<String, Fields>>,
    next_id: u64,
    watches: Vec<Watch>,
    failure: Option<ProviderError>,
}

impl Collections {
    fn query(&self, collection: &str, order: &OrderBy) -> Vec<Document> {
        let mut documents: Vec<_> = self
            .documents
            .get(collection)
            .into_iter()
            .flatten()
            .filter(|(_, fields)| fields.contains_key(&order.field))
            .map(|(id, fields)| Document {
                id: id.clone(),
                fields: fields.clone(),
            })
            .collect();

        documents.sort_by(|lhs, rhs| order.compare(lhs, rhs));
        documents
    }
}

/// Document store double, ids are assigned as `S1`, `S2`, ...
#[derive(Default)]
pub struct MemoryDocumentStore {
    inner: Mutex<Collections>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every following call fails with `err` until reset with `None`
    pub fn fail_with(&self, err: Option<ProviderError>) {
        lock(&self.inner).failure = err;
    }

    /// Fails all live queries, which ends them
    pub fn break_listeners(&self, err: ProviderError) {
        let watches = std::mem::take(&mut lock(&self.inner).watches);
        for watch in watches {
            watch.listener.deliver(Err(err.clone()));
            watch.listener.cancel();
        }
    }

    fn check(&self) -> Result<(), ProviderError> {
        match &lock(&self.inner).failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn notify(&self, collection: &str) {
        let snapshots: Vec<_> = {
            let mut inner = lock(&self.inner);
            inner.watches.retain(|watch| !watch.listener.is_cancelled());
            inner
                .watches
                .iter()
                .filter(|watch| watch.collection == collection)
                .map(|watch| (watch.listener.clone(), inner.query(collection, &watch.order)))
                .collect()
        };

        for (listener, documents) in snapshots {
            listener.deliver(Ok(documents));
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn query(
        &self,
        collection: &str,
        order: &OrderBy,
    ) -> Result<Vec<Document>, ProviderError> {
        self.check()?;
        Ok(lock(&self.inner).query(collection, order))
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, ProviderError> {
        self.check()?;
        let inner = lock(&self.inner);
        let fields = inner
            .documents
            .get(collection)
            .and_then(|documents| documents.get(id));

        Ok(fields.map(|fields| Document {
            id: id.to_owned(),
            fields: fields.clone(),
        }))
    }

    async fn add(&self, collection: &str, fields: WriteFields) -> Result<String, ProviderError> {
        self.check()?;
        let id = {
            let mut inner = lock(&self.inner);
            inner.next_id += 1;
            let id = format!("S{}", inner.next_id);
            inner
                .documents
                .entry(collection.to_owned())
                .or_default()
                .insert(id.clone(), resolve_fields(fields, Utc::now()));
            id
        };

        self.notify(collection);
        Ok(id)
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: WriteFields,
    ) -> Result<(), ProviderError> {
        self.check()?;
        {
            let mut inner = lock(&self.inner);
            let document = inner
                .documents
                .get_mut(collection)
                .and_then(|documents| documents.get_mut(id))
                .ok_or_else(|| {
                    ProviderError::new(
                        "firestore/not-found",
                        "Some requested document was not found.",
                    )
                })?;
            document.extend(resolve_fields(fields, Utc::now()));
        }

        self.notify(collection);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), ProviderError> {
        self.check()?;
        if let Some(documents) = lock(&self.inner).documents.get_mut(collection) {
            documents.remove(id);
        }

        self.notify(collection);
        Ok(())
    }

    fn listen(&self, collection: &str, order: OrderBy, callback: SnapshotCallback) -> Subscription {
        let listener = Listener::new(callback);
        let initial = {
            let mut inner = lock(&self.inner);
            let initial = match &inner.failure {
                Some(err) => Err(err.clone()),
                None => Ok(inner.query(collection, &order)),
            };
            if initial.is_ok() {
                inner.watches.push(Watch {
                    collection: collection.to_owned(),
                    order,
                    listener: listener.clone(),
                });
            }
            initial
        };

        listener.deliver(initial);
        listener.subscription()
    }
}
