//! On-device key-value engine abstraction

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Cannot persist key-value store: {0}")]
    Persist(String),
}

/// Durable store of primitive values
///
/// Reads never fail, a missing or mistyped value reads as `None`.
pub trait KeyValueStore: Send + Sync {
    fn get_string(&self, key: &str) -> Option<String>;

    fn get_bool(&self, key: &str) -> Option<bool>;

    fn set_string(&self, key: &str, value: &str) -> Result<(), Error>;

    fn set_bool(&self, key: &str, value: bool) -> Result<(), Error>;

    fn remove(&self, key: &str) -> Result<(), Error>;
}

/// Value kept by the in-memory store
#[derive(Debug, Clone, PartialEq)]
enum Stored {
    String(String),
    Bool(bool),
}

/// Non-durable store, for tests and throwaway sessions
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Stored>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_values<T>(&self, f: impl FnOnce(&mut HashMap<String, Stored>) -> T) -> T {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut values)
    }
}

impl KeyValueStore for MemoryStore {
    fn get_string(&self, key: &str) -> Option<String> {
        self.with_values(|values| match values.get(key) {
            Some(Stored::String(value)) => Some(value.clone()),
            _ => None,
        })
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        self.with_values(|values| match values.get(key) {
            Some(Stored::Bool(value)) => Some(*value),
            _ => None,
        })
    }

    fn set_string(&self, key: &str, value: &str) -> Result<(), Error> {
        self.with_values(|values| values.insert(key.to_owned(), Stored::String(value.to_owned())));
        Ok(())
    }

    fn set_bool(&self, key: &str, value: bool) -> Result<(), Error> {
        self.with_values(|values| values.insert(key.to_owned(), Stored::Bool(value)));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), Error> {
        self.with_values(|values| values.remove(key));
        Ok(())
    }
}
