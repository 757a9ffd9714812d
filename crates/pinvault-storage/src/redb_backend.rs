//! Pure-Rust redb storage backend for the long-lived partition.
//!
//! Feature-gated behind `redb-backend`. redb is a single-file B-tree with
//! ACID transactions; every call here is one transaction, so
//! [`compare_and_swap`](StorageBackend::compare_and_swap) is atomic with
//! respect to any other writer of the same database.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};

use crate::{StorageBackend, StorageError};

/// The single table holding every key.
const DATA_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("pinvault");

/// A storage backend backed by a redb database file.
///
/// Blocking redb calls are offloaded to the Tokio blocking thread pool.
///
/// # Examples
///
/// ```no_run
/// # use pinvault_storage::RedbBackend;
/// let backend = RedbBackend::open("/var/lib/pinvault/pinvault.redb").unwrap();
/// ```
#[derive(Clone)]
pub struct RedbBackend {
    db: Arc<Database>,
    path: PathBuf,
}

impl std::fmt::Debug for RedbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbBackend")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl RedbBackend {
    /// Open or create a redb database at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if redb fails to open or create the
    /// file, or [`StorageError::MissingTable`] if the table cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let db = Database::create(path).map_err(|e| StorageError::Open {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        // Opening the table inside a write transaction creates it.
        write_txn(&db, |txn| {
            txn.open_table(DATA_TABLE)
                .map(drop)
                .map_err(|e| StorageError::MissingTable {
                    name: format!("pinvault: {e}"),
                })
        })?;

        tracing::debug!(path = %path.display(), "redb storage opened");

        Ok(Self {
            db: Arc::new(db),
            path: path.to_path_buf(),
        })
    }

    /// Return the filesystem path of this database.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `op` against the database on the blocking pool.
    async fn blocking<T, F>(&self, key: &str, op: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Database, String) -> Result<T, StorageError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        let key = key.to_owned();
        tokio::task::spawn_blocking(move || op(&db, key))
            .await
            .map_err(|e| StorageError::Transaction {
                reason: format!("blocking task panicked: {e}"),
            })?
    }
}

/// Begin a write transaction, run `body`, and commit.
fn write_txn<T>(
    db: &Database,
    body: impl FnOnce(&WriteTransaction) -> Result<T, StorageError>,
) -> Result<T, StorageError> {
    let txn = db.begin_write().map_err(|e| StorageError::Transaction {
        reason: e.to_string(),
    })?;
    let out = body(&txn)?;
    txn.commit().map_err(|e| StorageError::Transaction {
        reason: e.to_string(),
    })?;
    Ok(out)
}

fn missing_table(e: impl std::fmt::Display) -> StorageError {
    StorageError::MissingTable {
        name: format!("pinvault: {e}"),
    }
}

#[async_trait::async_trait]
impl StorageBackend for RedbBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.blocking(key, |db, key| {
            let txn = db.begin_read().map_err(|e| StorageError::Transaction {
                reason: e.to_string(),
            })?;
            let table = txn.open_table(DATA_TABLE).map_err(missing_table)?;
            let value = table
                .get(key.as_str())
                .map_err(|e| StorageError::Read {
                    key: key.clone(),
                    reason: e.to_string(),
                })?
                .map(|v| v.value().to_vec());
            Ok(value)
        })
        .await
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let value = value.to_vec();
        self.blocking(key, move |db, key| {
            write_txn(db, |txn| {
                let mut table = txn.open_table(DATA_TABLE).map_err(missing_table)?;
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(|e| StorageError::Write {
                        key: key.clone(),
                        reason: e.to_string(),
                    })?;
                Ok(())
            })
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.blocking(key, |db, key| {
            write_txn(db, |txn| {
                let mut table = txn.open_table(DATA_TABLE).map_err(missing_table)?;
                table
                    .remove(key.as_str())
                    .map_err(|e| StorageError::Delete {
                        key: key.clone(),
                        reason: e.to_string(),
                    })?;
                Ok(())
            })
        })
        .await
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        value: &[u8],
    ) -> Result<bool, StorageError> {
        let expected = expected.map(<[u8]>::to_vec);
        let value = value.to_vec();
        self.blocking(key, move |db, key| {
            write_txn(db, |txn| {
                let mut table = txn.open_table(DATA_TABLE).map_err(missing_table)?;
                let current = table
                    .get(key.as_str())
                    .map_err(|e| StorageError::Read {
                        key: key.clone(),
                        reason: e.to_string(),
                    })?
                    .map(|v| v.value().to_vec());
                if current != expected {
                    return Ok(false);
                }
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(|e| StorageError::Write {
                        key: key.clone(),
                        reason: e.to_string(),
                    })?;
                Ok(true)
            })
        })
        .await
    }
}
