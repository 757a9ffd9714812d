//! Core library for `PinVault`.
//!
//! Contains the credential store, the PIN gate state machine with its
//! recovery sub-flow and inactivity watchdog, the autosave preference, and
//! the password-strength heuristics. This crate depends on
//! `pinvault-storage` for the partition trait and knows nothing about HTTP.

pub mod error;
pub mod gate;
pub mod preferences;
pub mod record;
pub mod recovery;
pub mod store;
pub mod strength;
pub mod watchdog;
