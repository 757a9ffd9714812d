//! Credential record types.
//!
//! A [`CredentialRecord`] is what the store holds; a [`CredentialDraft`] is
//! what callers hand to [`CredentialStore::save`](crate::store::CredentialStore::save).
//! Required and optional fields are spelled out in the types rather than
//! inferred from which JSON keys happen to be present.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

/// Opaque, immutable identifier of a credential record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Mint a fresh identifier from the OS CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A stored website/username/secret/notes tuple.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub id: RecordId,
    pub website: String,
    pub username: String,
    pub secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Last time the record was created or replaced.
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl CredentialRecord {
    /// Whether `needle` (already lowercased) occurs in the website or username.
    pub(crate) fn matches(&self, needle: &str) -> bool {
        self.website.to_lowercase().contains(needle)
            || self.username.to_lowercase().contains(needle)
    }
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("id", &self.id)
            .field("website", &self.website)
            .field("username", &self.username)
            .field("secret", &"[REDACTED]")
            .field("notes", &self.notes)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Input to `save`: no `id` creates a record, a known `id` replaces one.
///
/// Missing fields deserialize as blank so that [`validate`](Self::validate)
/// can name them.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct CredentialDraft {
    pub id: Option<RecordId>,
    pub website: String,
    pub username: String,
    pub secret: String,
    pub notes: Option<String>,
}

impl CredentialDraft {
    /// Check required fields and normalize blank notes to `None`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] naming the first blank required field.
    pub fn validate(mut self) -> Result<Self, StoreError> {
        for (field, value) in [
            ("website", &self.website),
            ("username", &self.username),
            ("secret", &self.secret),
        ] {
            if value.trim().is_empty() {
                return Err(StoreError::Validation { field });
            }
        }
        if self.notes.as_deref().is_some_and(|n| n.trim().is_empty()) {
            self.notes = None;
        }
        Ok(self)
    }

    pub(crate) fn into_record(self, id: RecordId) -> CredentialRecord {
        CredentialRecord {
            id,
            website: self.website,
            username: self.username,
            secret: self.secret,
            notes: self.notes,
            updated_at: Utc::now(),
        }
    }
}

impl fmt::Debug for CredentialDraft {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialDraft")
            .field("id", &self.id)
            .field("website", &self.website)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn draft() -> CredentialDraft {
        CredentialDraft {
            id: None,
            website: "example.com".to_owned(),
            username: "alice".to_owned(),
            secret: "hunter2".to_owned(),
            notes: None,
        }
    }

    #[test]
    fn validate_rejects_blank_required_fields() {
        let blank_site = CredentialDraft {
            website: "   ".to_owned(),
            ..draft()
        };
        assert!(matches!(
            blank_site.validate(),
            Err(StoreError::Validation { field: "website" })
        ));

        let blank_secret = CredentialDraft {
            secret: String::new(),
            ..draft()
        };
        assert!(matches!(
            blank_secret.validate(),
            Err(StoreError::Validation { field: "secret" })
        ));
    }

    #[test]
    fn validate_drops_blank_notes() {
        let d = CredentialDraft {
            notes: Some("  ".to_owned()),
            ..draft()
        };
        assert_eq!(d.validate().unwrap().notes, None);
    }

    #[test]
    fn record_without_notes_or_timestamp_deserializes() {
        let json = r#"{"id":"6f1c0c3e-2f4b-4b7e-9a59-8d8f0d7b1c2a","website":"a","username":"b","secret":"c"}"#;
        let record: CredentialRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.notes, None);
        assert_eq!(record.id.to_string(), "6f1c0c3e-2f4b-4b7e-9a59-8d8f0d7b1c2a");
    }

    #[test]
    fn debug_redacts_secret() {
        let record = draft().into_record(RecordId::generate());
        let debug = format!("{record:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn record_id_parses_its_own_display() {
        let id = RecordId::generate();
        assert_eq!(id.to_string().parse::<RecordId>().unwrap(), id);
    }
}
