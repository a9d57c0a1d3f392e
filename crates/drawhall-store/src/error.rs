//! Error types for the persisted store.

use drawhall_protocol::RoundId;

/// Errors a [`RoundStore`](crate::RoundStore) implementation can report.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The backing store could not be reached or the write did not land.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// No record exists for this round.
    #[error("round {0} not found in store")]
    RoundNotFound(RoundId),

    /// The store refused the operation (constraint violation, bad state).
    #[error("store rejected operation: {0}")]
    Rejected(String),
}
