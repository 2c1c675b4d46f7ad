//! Roster domain data

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::provider::{Document, FieldValue, WriteFields};

/// Identity as reported by the identity provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Provider assigned user id
    pub uid: String,
    /// Account email, providers may report identities without one
    pub email: Option<String>,
}

impl User {
    /// Helper to build an email-bearing identity
    pub fn new(uid: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: Some(email.into()),
        }
    }

    /// Email of this identity, if it carries a non-empty one
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref().filter(|email| !email.is_empty())
    }
}

/// Identity summary mirrored in the local session cache
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Session {
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub is_logged_in: bool,
}

/// Roster entry
#[derive(Debug, Clone, PartialEq)]
pub struct Student {
    /// Store assigned document id
    pub id: String,
    pub name: String,
    pub email: String,
    pub major: String,
    /// Set by the store when the document is added
    pub created_at: Option<DateTime<Utc>>,
    /// Set by the store on every update
    pub updated_at: Option<DateTime<Utc>>,
}

/// Document body as kept in the `students` collection
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StudentBody {
    name: String,
    email: String,
    major: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

impl Student {
    /// Decodes a student from a store document. The id lives next to the body, never inside it.
    pub fn from_document(document: Document) -> Result<Self, serde_json::Error> {
        let Document { id, fields } = document;
        let body: StudentBody = serde_json::from_value(Value::Object(fields))?;

        Ok(Self {
            id,
            name: body.name,
            email: body.email,
            major: body.major,
            created_at: body.created_at,
            updated_at: body.updated_at,
        })
    }
}

/// Student data for a document that doesn't exist yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStudent {
    pub name: String,
    pub email: String,
    pub major: String,
}

impl NewStudent {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        major: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            major: major.into(),
        }
    }

    /// Fields written on creation, `createdAt` is left to the store clock
    pub(crate) fn into_fields(self) -> WriteFields {
        BTreeMap::from([
            ("name".to_owned(), FieldValue::string(self.name)),
            ("email".to_owned(), FieldValue::string(self.email)),
            ("major".to_owned(), FieldValue::string(self.major)),
            ("createdAt".to_owned(), FieldValue::ServerTimestamp),
        ])
    }
}

/// Partial student update, `None` fields are left untouched
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StudentPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub major: Option<String>,
}

impl StudentPatch {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn major(mut self, major: impl Into<String>) -> Self {
        self.major = Some(major.into());
        self
    }

    /// Fields merged into the document, `updatedAt` is always refreshed
    pub(crate) fn into_fields(self) -> WriteFields {
        let mut fields = WriteFields::new();
        let given = [
            ("name", self.name),
            ("email", self.email),
            ("major", self.major),
        ];
        for (key, value) in given {
            if let Some(value) = value {
                fields.insert(key.to_owned(), FieldValue::string(value));
            }
        }
        fields.insert("updatedAt".to_owned(), FieldValue::ServerTimestamp);
        fields
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn document(id: &str, body: Value) -> Document {
        let Value::Object(fields) = body else {
            panic!("document body must be an object");
        };
        Document {
            id: id.to_owned(),
            fields,
        }
    }

    #[test]
    fn decoding_student_document() {
        let student = Student::from_document(document(
            "S1",
            json!({
                "name": "Ann",
                "email": "ann@x.com",
                "major": "CS",
                "createdAt": "2026-01-02T03:04:05Z",
            }),
        ))
        .unwrap();

        assert_eq!(student.id, "S1");
        assert_eq!(student.name, "Ann");
        assert_eq!(student.major, "CS");
        assert_eq!(
            student.created_at.unwrap().to_rfc3339(),
            "2026-01-02T03:04:05+00:00"
        );
        assert_eq!(student.updated_at, None);
    }

    #[test]
    fn decoding_document_without_required_field_fails() {
        let _ = Student::from_document(document("S1", json!({ "name": "Ann" }))).unwrap_err();
    }

    #[test]
    fn patch_writes_only_given_fields() {
        let fields = StudentPatch::default().major("CS").into_fields();

        assert_eq!(fields.len(), 2);
        assert_eq!(fields.get("major"), Some(&FieldValue::string("CS")));
        assert_eq!(fields.get("updatedAt"), Some(&FieldValue::ServerTimestamp));
        assert!(!fields.contains_key("name"));
    }

    #[test]
    fn user_with_empty_email_has_no_email_identity() {
        let user = User::new("u1", "");
        assert_eq!(user.email(), None);

        let user = User {
            uid: "u1".to_owned(),
            email: None,
        };
        assert_eq!(user.email(), None);

        assert_eq!(User::new("u1", "a@b.com").email(), Some("a@b.com"));
    }
}
