use std::fmt;

use async_trait::async_trait;

use crate::models::MedicationSchedule;

/// Resource name of a stored document, either the full form
/// `projects/{p}/databases/(default)/documents/users/{uid}/medical_meds/{id}`
/// or the part after `documents/`. Owner identity is purely structural: the
/// med's grandparent document is the owning user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentName(String);

impl DocumentName {
    pub fn new(name: impl Into<String>) -> DocumentName {
        DocumentName(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Identifying key: the last path segment.
    pub fn id(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// The document above the immediate parent collection, e.g.
    /// `users/u1/medical_meds/m1` -> `users/u1`. None when the document sits
    /// in a top-level collection, which marks an orphaned record.
    pub fn parent_document(&self) -> Option<DocumentName> {
        let relative = self.relative_path();
        let segments: Vec<&str> = relative.split('/').collect();
        if segments.len() < 4 {
            return None;
        }
        let prefix = &self.0[..self.0.len() - relative.len()];
        let parent = segments[..segments.len() - 2].join("/");
        Some(DocumentName(format!("{prefix}{parent}")))
    }

    fn relative_path(&self) -> &str {
        match self.0.split_once("/documents/") {
            Some((_, relative)) => relative,
            None => &self.0,
        }
    }
}

impl fmt::Display for DocumentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A schedule entry due at the current minute, with where it was found.
#[derive(Clone, Debug)]
pub struct DueMedication {
    pub doc: DocumentName,
    pub med: MedicationSchedule,
}

/// Read side of the user data store. Implemented by the Firestore client in
/// production and by in-memory fakes in tests; the pipeline never writes back.
#[async_trait]
pub trait ReminderStore: Send + Sync {
    /// Every schedule entry across all owners whose `schedule.time` equals
    /// `time` exactly. Order follows the underlying store.
    async fn due_medications(&self, time: &str) -> Result<Vec<DueMedication>, StoreError>;

    /// All push device tokens registered by `uid`.
    async fn device_tokens(&self, uid: &str) -> Result<Vec<String>, StoreError>;
}

#[derive(Debug)]
pub enum StoreError {
    Http(reqwest::Error),
    Status(u16, String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Http(e) => write!(f, "request failed: {e}"),
            StoreError::Status(status, body) => write!(f, "store responded {status}: {body}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_is_the_grandparent_document() {
        let doc = DocumentName::new(
            "projects/demo/databases/(default)/documents/users/u-17/medical_meds/m-3",
        );
        let parent = doc.parent_document().unwrap();
        assert_eq!(
            parent.as_str(),
            "projects/demo/databases/(default)/documents/users/u-17"
        );
        assert_eq!(parent.id(), "u-17");
        assert_eq!(doc.id(), "m-3");
    }

    #[test]
    fn relative_names_resolve_too() {
        let doc = DocumentName::new("users/u-1/medical_meds/m-1");
        assert_eq!(doc.parent_document().unwrap().id(), "u-1");
    }

    #[test]
    fn top_level_document_is_an_orphan() {
        let doc = DocumentName::new("projects/demo/databases/(default)/documents/medical_meds/m-9");
        assert!(doc.parent_document().is_none());
    }
}
