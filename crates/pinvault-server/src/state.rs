//! Shared application state for the `PinVault` server.
//!
//! A single [`AppState`] is constructed at startup and shared across all
//! Axum handlers via `Arc`. One server process is one browsing session: the
//! session partition is an in-memory backend that dies with the process.

use std::sync::Arc;

use anyhow::Context;
use pinvault_core::gate::{GateConfig, PinGate};
use pinvault_core::preferences::Preferences;
use pinvault_core::store::CredentialStore;
use pinvault_storage::{MemoryBackend, StorageBackend};

/// Shared application state passed to all HTTP handlers.
pub struct AppState {
    /// PIN gate, recovery flow and session.
    pub gate: Arc<PinGate>,
    /// The credential collection.
    pub store: CredentialStore,
    /// User preferences.
    pub preferences: Preferences,
}

impl AppState {
    /// Open every subsystem over `long` with a fresh session partition.
    ///
    /// # Errors
    ///
    /// Fails if the gate or store cannot read the long-lived partition, or
    /// if `gate_config` is invalid.
    pub async fn open(
        long: Arc<dyn StorageBackend>,
        gate_config: GateConfig,
    ) -> anyhow::Result<Self> {
        let session: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
        let gate = PinGate::open(Arc::clone(&long), session, gate_config)
            .await
            .context("failed to open PIN gate")?;
        let store = CredentialStore::load(Arc::clone(&long))
            .await
            .context("failed to load credential store")?;
        let preferences = Preferences::new(long);

        Ok(Self {
            gate: Arc::new(gate),
            store,
            preferences,
        })
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}
