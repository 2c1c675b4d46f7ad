//! Schemaless documents grouped in collections

use std::time::Duration;

use async_trait::async_trait;
use base64::prelude::*;
use chrono::Utc;
use roster::provider::{
    Document, DocumentStore, Fields, OrderBy, ProviderError, SnapshotCallback, WriteFields,
    resolve_fields,
};
use roster::subscription::{Listener, Subscription};
use sqlx::SqlitePool;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::MissedTickBehavior;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Capacity of the local change feed, lagging listeners just query again
const CHANGES_CAPACITY: usize = 64;

fn internal(err: impl std::fmt::Display) -> ProviderError {
    super::internal("firestore/internal", err)
}

fn not_found() -> ProviderError {
    ProviderError::new(
        "firestore/not-found",
        "Some requested document was not found.",
    )
}

/// New random document id, 22 url safe characters
fn generate_id() -> String {
    BASE64_URL_SAFE_NO_PAD.encode(Uuid::new_v4().as_bytes())
}

fn parse_body(id: &str, body: &str) -> Result<Fields, ProviderError> {
    serde_json::from_str(body).map_err(|err| internal(format!("Document {id} malformed: {err}")))
}

/// Document store keeping JSON bodies in SQLite
///
/// Writes made through this instance wake its live queries right away. Writes of other
/// processes sharing the database file are picked up by polling.
#[derive(Clone)]
pub struct SqliteDocumentStore {
    db: SqlitePool,
    /// Names of collections written through this instance
    changes: broadcast::Sender<String>,
    poll_interval: Duration,
}

impl SqliteDocumentStore {
    pub fn new(db: SqlitePool, poll_interval: Duration) -> Self {
        let (changes, _) = broadcast::channel(CHANGES_CAPACITY);
        Self {
            db,
            changes,
            poll_interval,
        }
    }

    fn changed(&self, collection: &str) {
        // Nobody listening is fine
        let _ = self.changes.send(collection.to_owned());
    }

    /// Keeps delivering snapshots until a query fails or the listener is cancelled
    async fn follow(
        self,
        collection: String,
        order: OrderBy,
        listener: Listener<Result<Vec<Document>, ProviderError>>,
    ) {
        let mut changes = self.changes.subscribe();
        let mut ticks = tokio::time::interval(self.poll_interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticks.tick().await;

        let mut last = None;
        loop {
            let snapshot = match self.query(&collection, &order).await {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    warn!(%collection, %err, "Live query failed");
                    listener.deliver(Err(err));
                    listener.cancel();
                    return;
                }
            };

            if last.as_ref() != Some(&snapshot) {
                if !listener.deliver(Ok(snapshot.clone())) {
                    return;
                }
                last = Some(snapshot);
            }

            tokio::select! {
                change = changes.recv() => {
                    if let Err(RecvError::Closed) = change {
                        return;
                    }
                }
                _ = ticks.tick() => {}
            }
        }
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    #[instrument(skip(self))]
    async fn query(
        &self,
        collection: &str,
        order: &OrderBy,
    ) -> Result<Vec<Document>, ProviderError> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("select id, body from documents where collection = ?")
                .bind(collection)
                .fetch_all(&self.db)
                .await
                .map_err(internal)?;

        let mut documents = Vec::with_capacity(rows.len());
        for (id, body) in rows {
            let fields = parse_body(&id, &body)?;
            if fields.contains_key(&order.field) {
                documents.push(Document { id, fields });
            }
        }

        documents.sort_by(|lhs, rhs| order.compare(lhs, rhs));
        Ok(documents)
    }

    #[instrument(skip(self))]
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, ProviderError> {
        let body: Option<(String,)> =
            sqlx::query_as("select body from documents where collection = ? and id = ?")
                .bind(collection)
                .bind(id)
                .fetch_optional(&self.db)
                .await
                .map_err(internal)?;

        body.map(|(body,)| {
            Ok(Document {
                id: id.to_owned(),
                fields: parse_body(id, &body)?,
            })
        })
        .transpose()
    }

    #[instrument(skip(self, fields))]
    async fn add(&self, collection: &str, fields: WriteFields) -> Result<String, ProviderError> {
        let id = generate_id();
        let body = serde_json::to_string(&resolve_fields(fields, Utc::now())).map_err(internal)?;

        sqlx::query("insert into documents (collection, id, body) values (?, ?, ?)")
            .bind(collection)
            .bind(&id)
            .bind(body)
            .execute(&self.db)
            .await
            .map_err(internal)?;

        debug!(%id, "Document added");
        self.changed(collection);
        Ok(id)
    }

    #[instrument(skip(self, fields))]
    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: WriteFields,
    ) -> Result<(), ProviderError> {
        let mut tx = self.db.begin().await.map_err(internal)?;

        let (body,): (String,) =
            sqlx::query_as("select body from documents where collection = ? and id = ?")
                .bind(collection)
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(internal)?
                .ok_or_else(not_found)?;

        let mut document = parse_body(id, &body)?;
        document.extend(resolve_fields(fields, Utc::now()));
        let body = serde_json::to_string(&document).map_err(internal)?;

        sqlx::query("update documents set body = ? where collection = ? and id = ?")
            .bind(body)
            .bind(collection)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(internal)?;

        tx.commit().await.map_err(internal)?;

        self.changed(collection);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, collection: &str, id: &str) -> Result<(), ProviderError> {
        let deletion = sqlx::query("delete from documents where collection = ? and id = ?")
            .bind(collection)
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(internal)?;

        if deletion.rows_affected() == 0 {
            debug!("Nothing to delete");
        } else {
            self.changed(collection);
        }
        Ok(())
    }

    fn listen(&self, collection: &str, order: OrderBy, callback: SnapshotCallback) -> Subscription {
        let listener = Listener::new(callback);
        let task = tokio::spawn(self.clone().follow(
            collection.to_owned(),
            order,
            listener.clone(),
        ));

        let task = task.abort_handle();
        Subscription::new(move || {
            listener.cancel();
            task.abort();
        })
    }
}
