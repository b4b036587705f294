//! Snapshot helpers shared by the workflow controller and promotion manager.

use rcaflow_model::{Record, RecordId, RecordStatus};
use rcaflow_storage::RcaStorage;
use tracing::{debug, warn};

use crate::error::WorkflowError;

/// Commit on `Ok`, abort on `Err`.
///
/// A failed commit is reported like any other failure; the snapshot is
/// consumed either way so its locks are released.
pub(crate) async fn settle<S: RcaStorage, T>(
    storage: &S,
    snapshot: S::Snapshot,
    result: Result<T, WorkflowError>,
    operation: &'static str,
) -> Result<T, WorkflowError> {
    match result {
        Ok(value) => match storage.commit_snapshot(snapshot).await {
            Ok(()) => {
                debug!(operation, "committed");
                Ok(value)
            }
            Err(e) => {
                let err = WorkflowError::from(e);
                warn!(operation, error = %err, "commit rejected");
                Err(err)
            }
        },
        Err(err) => {
            warn!(operation, kind = err.kind().as_str(), error = %err, "rolling back");
            if let Err(abort) = storage.abort_snapshot(snapshot).await {
                warn!(operation, error = %abort, "abort failed");
            }
            Err(err)
        }
    }
}

/// Lock a record and treat soft-deleted rows as missing.
pub(crate) async fn lock_live_record<S: RcaStorage>(
    storage: &S,
    snapshot: &mut S::Snapshot,
    id: RecordId,
) -> Result<Record, WorkflowError> {
    let record = storage.get_record_for_update(snapshot, id).await?;
    if record.is_deleted() {
        return Err(WorkflowError::NotFound(format!("record {id}")));
    }
    Ok(record)
}

/// Committed, non-deleted record without taking a lock.
pub(crate) async fn read_live_record<S: RcaStorage>(
    storage: &S,
    id: RecordId,
) -> Result<Record, WorkflowError> {
    let record = storage.get_record(id).await?;
    if record.is_deleted() {
        return Err(WorkflowError::NotFound(format!("record {id}")));
    }
    Ok(record)
}

pub(crate) fn require_status(
    record: &Record,
    allowed: &[RecordStatus],
) -> Result<(), WorkflowError> {
    if allowed.contains(&record.status) {
        Ok(())
    } else {
        Err(WorkflowError::status(allowed, record.status))
    }
}

pub(crate) const WORKABLE: &[RecordStatus] =
    &[RecordStatus::Investigation, RecordStatus::ActionsOpen];

pub(crate) const EDITABLE: &[RecordStatus] = &[
    RecordStatus::Draft,
    RecordStatus::Investigation,
    RecordStatus::ActionsOpen,
];

/// Trimmed text, or a validation failure naming the field when blank.
pub(crate) fn required_text(field: &str, value: &str) -> Result<String, WorkflowError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(WorkflowError::ValidationFailed(format!("{field} must not be blank")))
    } else {
        Ok(trimmed.to_string())
    }
}

/// Blank optional text is stored as absent.
pub(crate) fn optional_text(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}
