use rcaflow_model::{RecordId, UserId};
use uuid::Uuid;

use crate::children::ChildRef;

/// All errors that can be returned by an RcaStorage implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No record with the given id.
    #[error("record not found: {0}")]
    RecordNotFound(RecordId),

    /// A question, candidate, final or action item does not exist.
    #[error("{0} not found")]
    ChildNotFound(ChildRef),

    #[error("user not found: {0}")]
    UserNotFound(UserId),

    /// A write touched a record (or one of its children) without holding the
    /// record's row lock in this snapshot.
    #[error("record {0} is not locked by this snapshot")]
    LockNotHeld(RecordId),

    /// Two finals reference the same candidate. Raised at commit.
    #[error("candidate {candidate_id} is already referenced by a final")]
    DuplicateCandidateReference { candidate_id: Uuid },

    /// A backend-specific storage error (DB connection, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}
