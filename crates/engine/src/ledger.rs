//! Audit ledger writer and the two reads the engine makes of it.

use rcaflow_model::{
    AuditEvent, AuditEventId, AuditPayload, FollowupQuestion, GenerationSummary, Record, RecordId,
    UserId,
};
use rcaflow_storage::RcaStorage;
use time::OffsetDateTime;
use tracing::debug;

use crate::error::WorkflowError;

/// Append one event. Callers make this the last write of the snapshot.
pub(crate) async fn append<S: RcaStorage>(
    storage: &S,
    snapshot: &mut S::Snapshot,
    record_id: RecordId,
    actor: UserId,
    at: OffsetDateTime,
    payload: AuditPayload,
) -> Result<AuditEvent, WorkflowError> {
    let event = AuditEvent {
        id: AuditEventId::new(),
        record_id,
        actor_user_id: actor,
        created_at: at,
        payload,
    };
    debug!(record_id = %record_id, event_type = %event.event_type(), "audit event staged");
    storage.append_audit_event(snapshot, event.clone()).await?;
    Ok(event)
}

/// Timestamp of the most recent analysis run recorded for a record.
pub fn last_generation_at(events: &[AuditEvent]) -> Option<OffsetDateTime> {
    last_generation(events).map(|(at, _)| at)
}

fn last_generation(events: &[AuditEvent]) -> Option<(OffsetDateTime, &GenerationSummary)> {
    events
        .iter()
        .filter_map(|e| e.payload.generation().map(|g| (e.created_at, g)))
        .max_by_key(|(at, _)| *at)
}

/// Newest answer or notes timestamp on a record. Taken from the same read
/// that builds an analysis request, it marks how far that request reaches.
pub fn latest_evidence_at(
    record: &Record,
    questions: &[FollowupQuestion],
) -> Option<OffsetDateTime> {
    questions
        .iter()
        .filter_map(|q| q.answered_at)
        .chain(record.investigation_notes_updated_at)
        .max()
}

/// Whether anything was answered or noted that the last analysis run did
/// not see.
///
/// With no run on record, any answer or notes entry counts. Runs are
/// compared by the evidence they were shown, not by when they committed, so
/// an answer saved while the service was working still counts as new.
pub fn has_new_evidence(
    record: &Record,
    questions: &[FollowupQuestion],
    events: &[AuditEvent],
) -> bool {
    let Some(latest) = latest_evidence_at(record, questions) else {
        return false;
    };
    match last_generation(events) {
        None => true,
        Some((_, run)) => run.evidence_through.map_or(true, |seen| latest > seen),
    }
}
