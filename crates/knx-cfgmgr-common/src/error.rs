//! Error types for KNX manager operations.
//!
//! This module defines the error types shared by the KNX manager crates.
//! All errors implement `std::error::Error` via `thiserror`.

use thiserror::Error;

use crate::storage::StoreError;

/// Result type alias for KNX manager operations.
pub type KnxMgrResult<T> = Result<T, KnxMgrError>;

/// Errors that can occur during KNX manager operations.
#[derive(Debug, Error)]
pub enum KnxMgrError {
    /// A table entry with this identifier already occupies a slot.
    #[error("Group Object Table ID {id} already in use")]
    DuplicateId {
        /// The rejected identifier.
        id: i32,
    },

    /// Every slot of the table is occupied.
    #[error("Group Object Table is full ({capacity} entries)")]
    TableFull {
        /// Number of slots in the table.
        capacity: usize,
    },

    /// No table entry carries this identifier.
    #[error("Group Object Table ID {id} not found")]
    NotFound {
        /// The identifier that was looked up.
        id: i32,
    },

    /// Malformed administrative or provisioning input.
    #[error("Invalid argument for {field}: {message}")]
    InvalidArgument {
        /// The argument that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// The device is not in a state that allows the operation.
    #[error("Invalid state: {message}")]
    InvalidState {
        /// Error message.
        message: String,
    },

    /// Persistence store failure.
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// Internal error (unexpected state).
    #[error("Internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl KnxMgrError {
    /// Creates an invalid argument error.
    pub fn invalid_argument(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if the request was rejected before any state change.
    ///
    /// Validation failures are reported to the operator as invalid
    /// arguments; they never leave partial writes behind.
    pub fn is_validation_failure(&self) -> bool {
        matches!(
            self,
            KnxMgrError::DuplicateId { .. }
                | KnxMgrError::TableFull { .. }
                | KnxMgrError::NotFound { .. }
                | KnxMgrError::InvalidArgument { .. }
        )
    }
}
