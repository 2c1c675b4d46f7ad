//! SQLite backed identity provider and document store

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use color_eyre::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use thiserror::Error;

use crate::config;

pub mod documents;
pub mod identity;

pub use documents::SqliteDocumentStore;
pub use identity::SqliteIdentityProvider;

#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("Invalid SQLite path: {path}")]
    InvalidSQLitePath { path: PathBuf },
}

/// Converts a failure of the underlying database into a provider error tagged with `code`
fn internal(code: &str, err: impl std::fmt::Display) -> roster::provider::ProviderError {
    roster::provider::ProviderError::new(code, err.to_string())
}

/// Database backed remote services
#[derive(Clone)]
pub struct Backend {
    identity: Arc<SqliteIdentityProvider>,
    documents: Arc<SqliteDocumentStore>,
}

impl Backend {
    /// Backend for testing purposes - using the in-memory SQLite database
    #[cfg(test)]
    pub async fn test() -> Result<Self> {
        Self::with_config(config::Backend::Memory {
            poll_interval_ms: 50,
        })
        .await
    }

    /// Backend from configuration
    ///
    /// An in-memory database is always migrated. A file based one is migrated only if requested
    /// by configuration.
    pub async fn with_config(config: config::Backend) -> Result<Self> {
        use config::Backend::*;

        let poll_interval = config.poll_interval();
        let db = match config {
            Memory { .. } => {
                let opts = "sqlite::memory:"
                    .parse::<SqliteConnectOptions>()?
                    .foreign_keys(true);

                // Single connection living as long as the pool, the database dies with it
                let pool = SqlitePoolOptions::new()
                    .max_connections(1)
                    .min_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None)
                    .connect_with(opts)
                    .await?;

                sqlx::migrate!("./migrations").run(&pool).await?;
                pool
            }

            SqLite {
                path,
                max_connections,
                migrate,
                ..
            } => {
                let path = path
                    .to_str()
                    .ok_or_else(|| Error::InvalidSQLitePath { path: path.clone() })?;

                let opts = SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(true)
                    .foreign_keys(true);

                let pool = SqlitePoolOptions::new()
                    .max_connections(max_connections)
                    .connect_with(opts)
                    .await?;

                if migrate {
                    sqlx::migrate!("./migrations").run(&pool).await?;
                }

                pool
            }
        };

        Self::with_pool(db, poll_interval).await
    }

    async fn with_pool(db: sqlx::SqlitePool, poll_interval: Duration) -> Result<Self> {
        let identity = SqliteIdentityProvider::connect(db.clone()).await?;
        let documents = SqliteDocumentStore::new(db, poll_interval);

        Ok(Self {
            identity: Arc::new(identity),
            documents: Arc::new(documents),
        })
    }

    pub fn identity(&self) -> Arc<SqliteIdentityProvider> {
        self.identity.clone()
    }

    pub fn documents(&self) -> Arc<SqliteDocumentStore> {
        self.documents.clone()
    }
}
