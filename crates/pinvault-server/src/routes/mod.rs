//! HTTP route handlers for `PinVault`.
//!
//! Routes are organized by subsystem:
//! - `sys`: health check
//! - `gate`: PIN entry, PIN change, logout, session status
//! - `recovery`: forgotten-PIN flow and security questions
//! - `credentials`: credential CRUD and search (session required)
//! - `preferences`: user preferences (session required)
//! - `tools`: password strength and generation

pub mod credentials;
pub mod gate;
pub mod preferences;
pub mod recovery;
pub mod sys;
pub mod tools;
