//! Credential store for `PinVault`.
//!
//! Owns the ordered collection of [`CredentialRecord`]s. The collection is
//! read from the long-lived partition once, at [`CredentialStore::load`],
//! and served from memory afterwards. Every mutation writes the whole
//! collection back before returning.
//!
//! # Concurrency
//!
//! Writes go through [`StorageBackend::compare_and_swap`] against the bytes
//! this store last read or wrote. If another writer replaced the blob in the
//! meantime the mutation fails with [`StoreError::Conflict`] and nothing
//! changes; the caller can [`reload`](CredentialStore::reload) and retry.

use std::sync::Arc;

use pinvault_storage::StorageBackend;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::StoreError;
use crate::record::{CredentialDraft, CredentialRecord, RecordId};

/// Long-lived partition key holding the JSON array of records.
pub const RECORDS_KEY: &str = "records";

/// What a successful [`CredentialStore::save`] did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "record", rename_all = "snake_case")]
pub enum SaveOutcome {
    /// A new record was appended.
    Created(CredentialRecord),
    /// An existing record was replaced in place.
    Updated(CredentialRecord),
}

impl SaveOutcome {
    /// The record as stored.
    #[must_use]
    pub fn record(&self) -> &CredentialRecord {
        match self {
            Self::Created(r) | Self::Updated(r) => r,
        }
    }
}

#[derive(Debug, Default)]
struct Collection {
    records: Vec<CredentialRecord>,
    /// Bytes last seen in storage, the expectation for the next write.
    persisted: Option<Vec<u8>>,
}

/// The credential collection and its persistence.
pub struct CredentialStore {
    storage: Arc<dyn StorageBackend>,
    collection: RwLock<Collection>,
}

impl CredentialStore {
    /// Load the collection from the long-lived partition.
    ///
    /// A missing key yields an empty collection. Malformed JSON also yields
    /// an empty collection (logged, not surfaced); the next write replaces it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] if the backend read fails.
    pub async fn load(storage: Arc<dyn StorageBackend>) -> Result<Self, StoreError> {
        let collection = read_collection(storage.as_ref()).await?;
        info!(records = collection.records.len(), "credential store loaded");
        Ok(Self {
            storage,
            collection: RwLock::new(collection),
        })
    }

    /// Discard the in-memory copy and read the collection again.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] if the backend read fails.
    pub async fn reload(&self) -> Result<(), StoreError> {
        let fresh = read_collection(self.storage.as_ref()).await?;
        *self.collection.write().await = fresh;
        Ok(())
    }

    /// Records whose website or username contains `search`, ignoring case.
    ///
    /// Only the empty term returns every record; whitespace is matched
    /// literally. The result is a snapshot in insertion order.
    pub async fn list(&self, search: &str) -> Vec<CredentialRecord> {
        let needle = search.to_lowercase();
        let collection = self.collection.read().await;
        collection
            .records
            .iter()
            .filter(|r| needle.is_empty() || r.matches(&needle))
            .cloned()
            .collect()
    }

    /// Look up a single record.
    pub async fn get(&self, id: RecordId) -> Option<CredentialRecord> {
        self.collection
            .read()
            .await
            .records
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    /// Number of records held.
    pub async fn len(&self) -> usize {
        self.collection.read().await.records.len()
    }

    /// Whether the collection is empty.
    pub async fn is_empty(&self) -> bool {
        self.collection.read().await.records.is_empty()
    }

    /// Create or replace a record.
    ///
    /// Without an id a fresh [`RecordId`] is minted and the record appended.
    /// With an id the matching record's fields are replaced and it keeps its
    /// position.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Validation`] if a required field is blank.
    /// - [`StoreError::NotFound`] if the id matches no record.
    /// - [`StoreError::Conflict`] if storage changed underneath this store.
    /// - [`StoreError::Storage`] / [`StoreError::Serialization`] on write failure.
    pub async fn save(&self, draft: CredentialDraft) -> Result<SaveOutcome, StoreError> {
        let draft = draft.validate()?;
        let mut collection = self.collection.write().await;
        let mut records = collection.records.clone();

        let outcome = match draft.id {
            None => {
                let record = draft.into_record(RecordId::generate());
                records.push(record.clone());
                SaveOutcome::Created(record)
            }
            Some(id) => {
                let slot = records
                    .iter_mut()
                    .find(|r| r.id == id)
                    .ok_or(StoreError::NotFound { id })?;
                *slot = draft.into_record(id);
                SaveOutcome::Updated(slot.clone())
            }
        };

        self.persist(&mut collection, records).await?;

        match &outcome {
            SaveOutcome::Created(r) => info!(id = %r.id, website = %r.website, "credential created"),
            SaveOutcome::Updated(r) => info!(id = %r.id, website = %r.website, "credential updated"),
        }
        Ok(outcome)
    }

    /// Remove the record with `id`.
    ///
    /// Returns `false`, without touching storage, if no such record exists.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Conflict`] if storage changed underneath this store.
    /// - [`StoreError::Storage`] / [`StoreError::Serialization`] on write failure.
    pub async fn delete(&self, id: RecordId) -> Result<bool, StoreError> {
        let mut collection = self.collection.write().await;
        if !collection.records.iter().any(|r| r.id == id) {
            return Ok(false);
        }
        let records = collection
            .records
            .iter()
            .filter(|r| r.id != id)
            .cloned()
            .collect();

        self.persist(&mut collection, records).await?;

        info!(id = %id, "credential deleted");
        Ok(true)
    }

    /// Write `records` and, only on success, make them the in-memory copy.
    async fn persist(
        &self,
        collection: &mut Collection,
        records: Vec<CredentialRecord>,
    ) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(&records).map_err(|e| StoreError::Serialization {
            reason: e.to_string(),
        })?;

        let swapped = self
            .storage
            .compare_and_swap(RECORDS_KEY, collection.persisted.as_deref(), &bytes)
            .await?;
        if !swapped {
            warn!("credential collection changed by another writer; write rejected");
            return Err(StoreError::Conflict);
        }

        collection.records = records;
        collection.persisted = Some(bytes);
        Ok(())
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore").finish_non_exhaustive()
    }
}

async fn read_collection(storage: &dyn StorageBackend) -> Result<Collection, StoreError> {
    let Some(bytes) = storage.get(RECORDS_KEY).await? else {
        return Ok(Collection::default());
    };

    let records = match serde_json::from_slice::<Vec<CredentialRecord>>(&bytes) {
        Ok(records) => records,
        Err(e) => {
            warn!(error = %e, "stored credentials are malformed; starting with an empty collection");
            Vec::new()
        }
    };

    Ok(Collection {
        records,
        persisted: Some(bytes),
    })
}
