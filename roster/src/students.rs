//! Roster gateway over the `students` collection

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::model::{NewStudent, Student, StudentPatch};
use crate::provider::{Document, DocumentStore, OrderBy, ProviderError};
use crate::subscription::Subscription;

/// Remote collection holding the roster
pub const COLLECTION: &str = "students";

/// Field the roster is ordered by
const ORDER_FIELD: &str = "name";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Failure reported by the document store
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// Lookup by id resolved to no document
    #[error("Student not found")]
    NotFound { id: String },
    /// Stored document doesn't have the student shape
    #[error("Student {id} is malformed: {reason}")]
    Malformed { id: String, reason: String },
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

fn decode(document: Document) -> Result<Student, Error> {
    let id = document.id.clone();
    Student::from_document(document).map_err(|err| Error::Malformed {
        id,
        reason: err.to_string(),
    })
}

fn decode_all(documents: Vec<Document>) -> Result<Vec<Student>, Error> {
    documents.into_iter().map(decode).collect()
}

#[derive(Clone)]
pub struct RosterGateway {
    store: Arc<dyn DocumentStore>,
}

impl RosterGateway {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// The whole roster ordered by name
    #[instrument(skip(self))]
    pub async fn get_all(&self) -> Result<Vec<Student>, Error> {
        let documents = self
            .store
            .query(COLLECTION, &OrderBy::ascending(ORDER_FIELD))
            .await
            .inspect_err(|err| warn!(%err, "Cannot fetch students"))?;

        debug!(count = documents.len(), "Fetched students");
        decode_all(documents)
    }

    #[instrument(skip(self))]
    pub async fn get_by_id(&self, id: &str) -> Result<Student, Error> {
        let document = self
            .store
            .get(COLLECTION, id)
            .await?
            .ok_or_else(|| Error::NotFound { id: id.to_owned() })?;

        decode(document)
    }

    /// Adds a student, returns the store assigned id
    #[instrument(skip(self))]
    pub async fn add(&self, student: NewStudent) -> Result<String, Error> {
        let id = self.store.add(COLLECTION, student.into_fields()).await?;
        info!(%id, "Student added");
        Ok(id)
    }

    /// Merges given fields into the student
    #[instrument(skip(self))]
    pub async fn update(&self, id: &str, patch: StudentPatch) -> Result<(), Error> {
        self.store.update(COLLECTION, id, patch.into_fields()).await?;
        info!("Student updated");
        Ok(())
    }

    /// Removes the student. Removing an unknown id succeeds.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<(), Error> {
        self.store.delete(COLLECTION, id).await?;
        info!("Student deleted");
        Ok(())
    }

    /// Observes the ordered roster
    ///
    /// `callback` receives the full roster on every change, or the error that ended the
    /// subscription.
    pub fn listen(
        &self,
        mut callback: impl FnMut(Result<Vec<Student>, Error>) + Send + 'static,
    ) -> Subscription {
        self.store.listen(
            COLLECTION,
            OrderBy::ascending(ORDER_FIELD),
            Box::new(move |snapshot| {
                let students = snapshot.map_err(Error::from).and_then(decode_all);
                if let Err(err) = &students {
                    warn!(%err, "Roster subscription failed");
                }
                callback(students);
            }),
        )
    }
}
