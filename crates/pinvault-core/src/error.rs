//! Error types for `pinvault-core`.
//!
//! Validation failures are recoverable and carry a message fit to show the
//! user. PINs, secrets and security answers never appear in any variant.

use pinvault_storage::StorageError;

use crate::gate::GatePhase;
use crate::record::RecordId;

/// Errors from the credential store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A required field was missing or blank.
    #[error("{field} is required")]
    Validation { field: &'static str },

    /// `save` named an id that is not in the collection.
    #[error("credential not found: {id}")]
    NotFound { id: RecordId },

    /// Another writer replaced the stored collection since it was loaded.
    #[error("stored credentials changed since they were loaded; reload and retry")]
    Conflict,

    /// The collection could not be encoded.
    #[error("credential serialization failed: {reason}")]
    Serialization { reason: String },

    /// The underlying storage backend returned an error.
    #[error("credential storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Errors from the recovery sub-flow.
#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    /// The email step was submitted blank.
    #[error("an email address is required")]
    MissingEmail,

    /// The submitted questions were not acceptable.
    #[error("invalid security questions: {reason}")]
    InvalidQuestions { reason: String },

    /// The answers did not match the registered ones.
    #[error("security answers do not match")]
    AnswersRejected,

    /// The flow was cancelled or restarted while a step was pending.
    #[error("recovery step was cancelled")]
    Cancelled,
}

/// Errors from the PIN gate.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// The PIN does not have the expected shape.
    #[error("invalid PIN: {reason}")]
    InvalidPin { reason: String },

    /// The PIN did not match the stored PIN.
    #[error("incorrect PIN")]
    IncorrectPin,

    /// A PIN and its confirmation differed.
    #[error("PINs do not match")]
    PinMismatch,

    /// The session is not granted.
    #[error("vault is locked")]
    Locked,

    /// The action is not available in the current phase.
    #[error("cannot {action} while {phase}")]
    InvalidTransition {
        action: &'static str,
        phase: GatePhase,
    },

    /// A recovery step failed.
    #[error(transparent)]
    Recovery(#[from] RecoveryError),

    /// Persisted gate state could not be encoded.
    #[error("gate serialization failed: {reason}")]
    Serialization { reason: String },

    /// The underlying storage backend returned an error.
    #[error("gate storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Errors from the password generator.
#[derive(Debug, thiserror::Error)]
pub enum StrengthError {
    /// No character class was selected.
    #[error("at least one character class must be selected")]
    NoCharacterClass,

    /// The requested length cannot hold one character of every selected class.
    #[error("length {length} is outside {min}..={max}")]
    InvalidLength { length: usize, min: usize, max: usize },
}
