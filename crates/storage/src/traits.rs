use async_trait::async_trait;
use rcaflow_model::{
    ActionItem, ActionItemCandidate, ActionItemId, AppUser, AuditEvent, FollowupQuestion, Record,
    RecordId, RootCauseCandidate, RootCauseFinal, RootCauseFinalId, UserId,
};

use crate::children::{ChildRef, RecordChildren};
use crate::error::StorageError;

/// The persistence trait for rcaflow backends.
///
/// An `RcaStorage` implementation provides transactional storage for
/// records, their child rows (questions, candidates, finals, action items)
/// and the audit ledger.
///
/// ## Snapshot Semantics
///
/// All mutating operations take `&mut Self::Snapshot`, a type representing an
/// in-progress transaction. The lifecycle is:
///
/// 1. `begin_snapshot()`: start a transaction, returns a `Snapshot`
/// 2. Lock the record with `get_record_for_update`, then read and write
/// 3. `commit_snapshot(snapshot)`: commit and consume the transaction
///    OR `abort_snapshot(snapshot)`: roll back and consume the transaction
///
/// If a `Snapshot` is dropped without committing, the underlying transaction
/// MUST be rolled back and every lock it holds released.
///
/// ## Row Locking
///
/// `get_record_for_update` has `SELECT ... FOR UPDATE` semantics: a second
/// snapshot asking for the same record waits until the first commits or
/// aborts, then sees the committed result. Every write to a record or one of
/// its children requires that record's lock in the same snapshot, otherwise
/// the write fails with `StorageError::LockNotHeld`. Inserting a new record
/// takes its lock.
///
/// ## Candidate References
///
/// At most one root-cause final may carry a given
/// `selected_from_candidate_id`, and likewise for action items. Backends
/// enforce this as a uniqueness constraint at commit and report violations
/// as `StorageError::DuplicateCandidateReference`.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` to be used in axum
/// application state and across async task boundaries.
#[async_trait]
pub trait RcaStorage: Send + Sync + 'static {
    /// The snapshot (transaction) type used by this storage backend.
    type Snapshot: Send;

    // ── Snapshot lifecycle ────────────────────────────────────────────────────

    async fn begin_snapshot(&self) -> Result<Self::Snapshot, StorageError>;

    /// Commit a snapshot, making all staged writes visible at once.
    async fn commit_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    /// Abort (roll back) a snapshot, discarding all staged writes.
    async fn abort_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    // ── Sequence ──────────────────────────────────────────────────────────────

    /// Allocate the next display number. Numbers are never reused, so an
    /// aborted snapshot leaves a gap.
    async fn next_display_number(&self, snapshot: &mut Self::Snapshot)
        -> Result<i64, StorageError>;

    // ── Record rows (within snapshot) ─────────────────────────────────────────

    /// Insert a new record and take its row lock.
    async fn insert_record(
        &self,
        snapshot: &mut Self::Snapshot,
        record: Record,
    ) -> Result<(), StorageError>;

    /// Read a record, locking the row for update.
    ///
    /// Returns the snapshot's own staged version when it has already written
    /// the record. Returns `Err(StorageError::RecordNotFound)` if the record
    /// does not exist.
    async fn get_record_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
        id: RecordId,
    ) -> Result<Record, StorageError>;

    /// Replace a record row. Requires the record's lock.
    async fn update_record(
        &self,
        snapshot: &mut Self::Snapshot,
        record: Record,
    ) -> Result<(), StorageError>;

    // ── Child rows (within snapshot, record lock required) ────────────────────

    /// All child rows of a locked record, including this snapshot's staged
    /// writes.
    async fn children_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
        record_id: RecordId,
    ) -> Result<RecordChildren, StorageError>;

    /// Audit events of a locked record, including staged ones.
    async fn audit_events_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
        record_id: RecordId,
    ) -> Result<Vec<AuditEvent>, StorageError>;

    /// Insert or replace a follow-up question.
    async fn put_question(
        &self,
        snapshot: &mut Self::Snapshot,
        question: FollowupQuestion,
    ) -> Result<(), StorageError>;

    async fn put_root_cause_candidate(
        &self,
        snapshot: &mut Self::Snapshot,
        candidate: RootCauseCandidate,
    ) -> Result<(), StorageError>;

    async fn put_action_item_candidate(
        &self,
        snapshot: &mut Self::Snapshot,
        candidate: ActionItemCandidate,
    ) -> Result<(), StorageError>;

    async fn put_root_cause_final(
        &self,
        snapshot: &mut Self::Snapshot,
        row: RootCauseFinal,
    ) -> Result<(), StorageError>;

    async fn delete_root_cause_final(
        &self,
        snapshot: &mut Self::Snapshot,
        record_id: RecordId,
        id: RootCauseFinalId,
    ) -> Result<(), StorageError>;

    async fn put_action_item(
        &self,
        snapshot: &mut Self::Snapshot,
        item: ActionItem,
    ) -> Result<(), StorageError>;

    async fn delete_action_item(
        &self,
        snapshot: &mut Self::Snapshot,
        record_id: RecordId,
        id: ActionItemId,
    ) -> Result<(), StorageError>;

    /// Append to the ledger. Events are listed back in append order.
    async fn append_audit_event(
        &self,
        snapshot: &mut Self::Snapshot,
        event: AuditEvent,
    ) -> Result<(), StorageError>;

    // ── Query operations (committed state, no locks) ──────────────────────────

    /// Read a record without locking. Soft-deleted records are returned as-is.
    async fn get_record(&self, id: RecordId) -> Result<Record, StorageError>;

    /// All records ordered by display number.
    async fn list_records(&self) -> Result<Vec<Record>, StorageError>;

    async fn get_children(&self, record_id: RecordId) -> Result<RecordChildren, StorageError>;

    async fn list_audit_events(&self, record_id: RecordId)
        -> Result<Vec<AuditEvent>, StorageError>;

    /// The record a child row belongs to.
    ///
    /// Returns `Err(StorageError::ChildNotFound)` if no such row is committed.
    async fn owner_of(&self, child: ChildRef) -> Result<RecordId, StorageError>;

    // ── User directory ────────────────────────────────────────────────────────

    /// Committed read; the directory takes no part in snapshots or record locks.
    async fn get_user(&self, id: UserId) -> Result<AppUser, StorageError>;

    async fn list_users(&self) -> Result<Vec<AppUser>, StorageError>;

    /// Insert or replace a directory entry. Not transactional.
    async fn put_user(&self, user: AppUser) -> Result<(), StorageError>;
}
