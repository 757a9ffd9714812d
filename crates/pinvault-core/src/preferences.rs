//! User preferences persisted in the long-lived partition.

use std::sync::Arc;

use pinvault_storage::StorageBackend;
use tracing::{debug, warn};

use crate::error::StoreError;

/// Long-lived partition key for the autosave flag.
pub const AUTOSAVE_KEY: &str = "autosave";

/// Read and write user preferences.
#[derive(Clone)]
pub struct Preferences {
    storage: Arc<dyn StorageBackend>,
}

impl Preferences {
    #[must_use]
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    /// Whether the credential form saves as the user types.
    ///
    /// Defaults to `false` when unset or unreadable.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] if the backend read fails.
    pub async fn autosave(&self) -> Result<bool, StoreError> {
        let Some(bytes) = self.storage.get(AUTOSAVE_KEY).await? else {
            return Ok(false);
        };
        Ok(serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            warn!(error = %e, "stored autosave preference is malformed; using default");
            false
        }))
    }

    /// Persist the autosave flag.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] if the backend write fails.
    pub async fn set_autosave(&self, enabled: bool) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(&enabled).map_err(|e| StoreError::Serialization {
            reason: e.to_string(),
        })?;
        self.storage.put(AUTOSAVE_KEY, &bytes).await?;
        debug!(enabled, "autosave preference updated");
        Ok(())
    }
}

impl std::fmt::Debug for Preferences {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Preferences").finish_non_exhaustive()
    }
}
