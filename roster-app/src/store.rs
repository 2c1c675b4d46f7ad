//! Durable key-value store kept in a TOML file

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use roster::storage::{self, KeyValueStore};
use toml::{Table, Value};
use tracing::{debug, warn};

/// Key-value store persisted to a single TOML file
///
/// Every write rewrites the whole file through a temporary file and a rename, so the file is
/// never left half written. A missing file is an empty store, an unreadable one is reported and
/// treated as empty.
#[derive(Debug)]
pub struct TomlStore {
    path: PathBuf,
    values: Mutex<Table>,
}

impl TomlStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match Self::load(&path) {
            Ok(values) => values,
            Err(err) => {
                warn!(path = %path.display(), %err, "Cannot read session store, starting empty");
                Table::new()
            }
        };

        Self {
            path,
            values: Mutex::new(values),
        }
    }

    fn load(path: &Path) -> Result<Table, String> {
        match fs::read_to_string(path) {
            Ok(content) => content.parse::<Table>().map_err(|err| err.to_string()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Table::new()),
            Err(err) => Err(err.to_string()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, values: &Table) -> Result<(), storage::Error> {
        let content =
            toml::to_string(values).map_err(|err| storage::Error::Persist(err.to_string()))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, content)
            .and_then(|()| fs::rename(&tmp, &self.path))
            .map_err(|err| {
                storage::Error::Persist(format!("{}: {err}", self.path.display()))
            })?;

        debug!(path = %self.path.display(), "Session store persisted");
        Ok(())
    }

    /// Applies `f` to a copy of the values, memory is updated only once the file is
    fn write(&self, f: impl FnOnce(&mut Table)) -> Result<(), storage::Error> {
        let mut values = self.lock();
        let mut updated = values.clone();
        f(&mut updated);
        self.persist(&updated)?;
        *values = updated;
        Ok(())
    }
}

impl KeyValueStore for TomlStore {
    fn get_string(&self, key: &str) -> Option<String> {
        match self.lock().get(key) {
            Some(Value::String(value)) => Some(value.clone()),
            _ => None,
        }
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        match self.lock().get(key) {
            Some(Value::Boolean(value)) => Some(*value),
            _ => None,
        }
    }

    fn set_string(&self, key: &str, value: &str) -> Result<(), storage::Error> {
        self.write(|values| {
            values.insert(key.to_owned(), Value::String(value.to_owned()));
        })
    }

    fn set_bool(&self, key: &str, value: bool) -> Result<(), storage::Error> {
        self.write(|values| {
            values.insert(key.to_owned(), Value::Boolean(value));
        })
    }

    fn remove(&self, key: &str) -> Result<(), storage::Error> {
        self.write(|values| {
            values.remove(key);
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use roster::SessionCache;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn values_survive_reopening() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.toml");

        let store = TomlStore::open(&path);
        store.set_string("user_email", "a@b.com").unwrap();
        store.set_bool("is_logged_in", true).unwrap();
        store.set_string("gone", "soon").unwrap();
        store.remove("gone").unwrap();
        drop(store);

        let store = TomlStore::open(&path);
        assert_eq!(store.get_string("user_email").as_deref(), Some("a@b.com"));
        assert_eq!(store.get_bool("is_logged_in"), Some(true));
        assert_eq!(store.get_string("gone"), None);
        assert!(!dir.path().join("session.toml.tmp").exists());
    }

    #[test]
    fn missing_file_is_empty_store() {
        let dir = TempDir::new().unwrap();
        let store = TomlStore::open(dir.path().join("missing.toml"));

        assert_eq!(store.get_bool("is_logged_in"), None);
    }

    #[test]
    fn corrupted_file_is_empty_store() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.toml");
        fs::write(&path, "this is = = not toml").unwrap();

        let store = TomlStore::open(&path);
        assert_eq!(store.get_string("user_email"), None);

        // Next write replaces the broken file
        store.set_bool("is_logged_in", false).unwrap();
        assert_eq!(TomlStore::open(&path).get_bool("is_logged_in"), Some(false));
    }

    #[test]
    fn unwritable_location_reports_error() {
        let dir = TempDir::new().unwrap();
        let store = TomlStore::open(dir.path().join("no-such-dir").join("session.toml"));

        let _ = store.set_bool("is_logged_in", true).unwrap_err();
        let _ = store.set_string("user_email", "a@b.com").unwrap_err();

        // Nothing unpersisted is visible
        assert_eq!(store.get_bool("is_logged_in"), None);
        assert_eq!(store.get_string("user_email"), None);
    }

    #[test]
    fn failed_write_keeps_persisted_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.toml");
        let store = TomlStore::open(&path);
        store.set_bool("is_logged_in", false).unwrap();

        // Directory in place of the temporary file makes the next write fail
        fs::create_dir(dir.path().join("session.toml.tmp")).unwrap();
        let _ = store.set_bool("is_logged_in", true).unwrap_err();

        assert_eq!(store.get_bool("is_logged_in"), Some(false));
        assert_eq!(TomlStore::open(&path).get_bool("is_logged_in"), Some(false));
    }

    #[test]
    fn session_cache_survives_restart() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.toml");

        let cache = SessionCache::new(Arc::new(TomlStore::open(&path)));
        cache.save("u1", "a@b.com");

        let cache = SessionCache::new(Arc::new(TomlStore::open(&path)));
        assert!(cache.is_logged_in());
        assert_eq!(cache.get().email.as_deref(), Some("a@b.com"));

        cache.clear();
        let cache = SessionCache::new(Arc::new(TomlStore::open(&path)));
        assert!(!cache.is_logged_in());
        assert_eq!(cache.get().user_id, None);
    }
}
