//! Storage partitions for `PinVault`.
//!
//! This crate defines the [`StorageBackend`] trait, a plain key-value
//! interface that knows nothing about credentials or PINs. `pinvault-core`
//! holds two of these: a long-lived partition (PIN, preferences, records)
//! and a session partition that is discarded when the session ends.
//!
//! Two implementations are provided:
//!
//! - [`RedbBackend`] — on-disk default, backed by redb (feature `redb-backend`)
//! - [`MemoryBackend`] — in-memory, used for the session partition and tests

mod error;
mod memory;
#[cfg(feature = "redb-backend")]
mod redb_backend;

pub use error::StorageError;
pub use memory::MemoryBackend;
#[cfg(feature = "redb-backend")]
pub use redb_backend::RedbBackend;

/// A pluggable key-value storage backend.
///
/// Keys are short UTF-8 names (`pin`, `records`, `session`). Values are
/// opaque bytes; every caller in this workspace stores JSON.
///
/// Implementations must be safe to share across async tasks (`Send + Sync`).
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Retrieve a value by key.
    ///
    /// Returns `Ok(None)` if the key does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the underlying backend fails.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Store a key-value pair, overwriting any existing value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the underlying backend fails.
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Delete a key. Deleting a non-existent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Delete`] if the underlying backend fails.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Atomically replace the value at `key` if it currently equals
    /// `expected`.
    ///
    /// `expected = None` means the key must be absent. Returns `Ok(true)` if
    /// the write happened and `Ok(false)` if the current value differed, in
    /// which case nothing is written.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Transaction`] or [`StorageError::Write`] if the
    /// underlying backend fails.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        value: &[u8],
    ) -> Result<bool, StorageError>;

    /// Check whether a key exists in storage.
    ///
    /// The default implementation calls [`get`](StorageBackend::get) and checks
    /// for `Some`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the underlying backend fails.
    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.get(key).await?.is_some())
    }
}
