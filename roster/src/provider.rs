//! Remote collaborators the gateways talk to
//!
//! The identity provider and the document store are external services. The gateways only see
//! them through the traits below, so the hosted services, the SQLite backed implementations of
//! the app and the in-memory test doubles are interchangeable.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::model::User;
use crate::subscription::Subscription;

/// Failure reported by a remote provider
///
/// `code` is a provider specific machine readable tag (eg. `auth/weak-password`), `message` is
/// meant to be shown to the user as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ProviderError {
    pub code: String,
    pub message: String,
}

impl ProviderError {
    /// Builds an error, the message is prefixed with the code the way hosted SDKs do it
    pub fn new(code: impl Into<String>, message: impl AsRef<str>) -> Self {
        let code = code.into();
        let message = format!("[{code}] {}", message.as_ref());
        Self { code, message }
    }
}

/// Callback invoked on every authentication state transition
pub type AuthStateCallback = Box<dyn FnMut(Option<User>) + Send>;

/// Hosted email/password identity provider
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Creates an account and signs it in
    async fn create_user_with_email_and_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<User, ProviderError>;

    /// Signs in an existing account
    async fn sign_in_with_email_and_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<User, ProviderError>;

    async fn sign_out(&self) -> Result<(), ProviderError>;

    /// In-memory snapshot of the signed in identity, never touches the network
    fn current_user(&self) -> Option<User>;

    /// Registers for identity transitions. The callback is invoked with the current identity
    /// right after registration and on every transition afterwards.
    fn on_auth_state_changed(&self, callback: AuthStateCallback) -> Subscription;
}

/// Document body as returned by the store
pub type Fields = Map<String, Value>;

/// Stored document, the id is kept next to the body
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

/// Value written to a single document field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Stored as given
    Value(Value),
    /// Replaced with the store clock at commit time
    ServerTimestamp,
}

impl FieldValue {
    pub fn string(value: impl Into<String>) -> Self {
        Self::Value(Value::String(value.into()))
    }
}

/// Fields of a single write
pub type WriteFields = BTreeMap<String, FieldValue>;

/// Resolves server side sentinels into stored values
pub fn resolve_fields(fields: WriteFields, now: DateTime<Utc>) -> Fields {
    fields
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                FieldValue::Value(value) => value,
                FieldValue::ServerTimestamp => {
                    Value::String(now.to_rfc3339_opts(SecondsFormat::Micros, true))
                }
            };
            (key, value)
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Single field ordering of a collection query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Ascending,
        }
    }

    /// Compares two documents the way the store orders them
    ///
    /// Values of different types are ordered by type (null, bool, number, string, others),
    /// strings compare byte-wise. Equal values fall back to the document id.
    pub fn compare(&self, lhs: &Document, rhs: &Document) -> Ordering {
        let ordering = match (lhs.fields.get(&self.field), rhs.fields.get(&self.field)) {
            (Some(l), Some(r)) => compare_values(l, r),
            (l, r) => l.is_some().cmp(&r.is_some()),
        };

        let ordering = match self.direction {
            Direction::Ascending => ordering,
            Direction::Descending => ordering.reverse(),
        };

        ordering.then_with(|| lhs.id.cmp(&rhs.id))
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn compare_values(lhs: &Value, rhs: &Value) -> Ordering {
    match (lhs, rhs) {
        (Value::Bool(l), Value::Bool(r)) => l.cmp(r),
        (Value::Number(l), Value::Number(r)) => {
            let l = l.as_f64().unwrap_or(f64::NAN);
            let r = r.as_f64().unwrap_or(f64::NAN);
            l.total_cmp(&r)
        }
        (Value::String(l), Value::String(r)) => l.as_bytes().cmp(r.as_bytes()),
        (l, r) => type_rank(l).cmp(&type_rank(r)),
    }
}

/// Callback receiving the full ordered result of a live query
pub type SnapshotCallback = Box<dyn FnMut(Result<Vec<Document>, ProviderError>) + Send>;

/// Hosted document database
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Every document of the collection having the order field, ordered
    async fn query(&self, collection: &str, order: &OrderBy)
    -> Result<Vec<Document>, ProviderError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, ProviderError>;

    /// Creates a document, returns the store assigned id
    async fn add(&self, collection: &str, fields: WriteFields) -> Result<String, ProviderError>;

    /// Merges fields into an existing document. Fails if the document doesn't exist.
    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: WriteFields,
    ) -> Result<(), ProviderError>;

    /// Removes a document, removing a missing document is not an error
    async fn delete(&self, collection: &str, id: &str) -> Result<(), ProviderError>;

    /// Live ordered query. The callback gets the current result right away and again after
    /// every change. A failure is delivered once and ends the subscription.
    fn listen(&self, collection: &str, order: OrderBy, callback: SnapshotCallback) -> Subscription;
}
