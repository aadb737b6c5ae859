//! Error taxonomy shared by the registry, the codec and the rebuilder.

use std::collections::TryReserveError;

use thiserror::Error;

use crate::types::TypeTag;

/// Everything that can go wrong while snapshotting or restoring state.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// A value the codec has no representation for (native function, coroutine,
    /// dead entity handle).
    #[error("non-serializable value: {0}")]
    NonSerializableValue(String),

    /// Structural violation found while decoding or rebuilding.
    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    /// Allocation failed while growing a buffer or a node table.
    #[error("allocation failure: {0}")]
    AllocationFailure(#[from] TryReserveError),

    /// A type tag with no registered behavior appeared in a buffer.
    #[error("unknown entity type {0}")]
    UnknownEntityType(TypeTag),
}

impl SnapshotError {
    pub fn corrupt(msg: impl Into<String>) -> Self {
        SnapshotError::CorruptSnapshot(msg.into())
    }

    pub fn non_serializable(msg: impl Into<String>) -> Self {
        SnapshotError::NonSerializableValue(msg.into())
    }

    /// True when the data itself is bad. Unknown entity types count as corrupt
    /// for restore purposes.
    pub fn is_corrupt(&self) -> bool {
        matches!(
            self,
            SnapshotError::CorruptSnapshot(_) | SnapshotError::UnknownEntityType(_)
        )
    }
}

/// Result type for snapshot operations.
pub type SnapshotResult<T> = Result<T, SnapshotError>;
