//! Audit ledger entries.
//!
//! Each entry records exactly one mutation to a record. The payload is a
//! tagged union keyed by event type, so every shape is known at compile time
//! and serializes as `{"event_type": "...", "data": {...}}`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::ids::{
    ActionItemCandidateId, ActionItemId, AuditEventId, QuestionId, RecordId,
    RootCauseCandidateId, RootCauseFinalId, UserId,
};
use crate::record::RecordStatus;

/// Closed set of ledger event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    StatusChanged,
    CandidateGenerated,
    CandidateUpdated,
    PromotedToFinal,
    FinalCreated,
    FinalUpdated,
    FinalDeleted,
    ActionItemPromoted,
    ActionItemCreated,
    ActionItemUpdated,
    ActionItemDeleted,
    ActionCompleted,
    OwnerChanged,
    AnswerSubmitted,
    AnswerUpdated,
    RecordCreated,
    RecordUpdated,
    RecordDeleted,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::StatusChanged => "status_changed",
            AuditEventType::CandidateGenerated => "candidate_generated",
            AuditEventType::CandidateUpdated => "candidate_updated",
            AuditEventType::PromotedToFinal => "promoted_to_final",
            AuditEventType::FinalCreated => "final_created",
            AuditEventType::FinalUpdated => "final_updated",
            AuditEventType::FinalDeleted => "final_deleted",
            AuditEventType::ActionItemPromoted => "action_item_promoted",
            AuditEventType::ActionItemCreated => "action_item_created",
            AuditEventType::ActionItemUpdated => "action_item_updated",
            AuditEventType::ActionItemDeleted => "action_item_deleted",
            AuditEventType::ActionCompleted => "action_completed",
            AuditEventType::OwnerChanged => "owner_changed",
            AuditEventType::AnswerSubmitted => "answer_submitted",
            AuditEventType::AnswerUpdated => "answer_updated",
            AuditEventType::RecordCreated => "record_created",
            AuditEventType::RecordUpdated => "record_updated",
            AuditEventType::RecordDeleted => "record_deleted",
        }
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a batch of candidates came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationSource {
    /// First analysis, bundled with the start of the investigation.
    Initial,
    /// Re-analysis that produced new material.
    Reanalysis,
    /// Re-analysis that found nothing new. Still recorded so the new-evidence
    /// check advances past the answers it has already seen.
    NoMaterialChange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationSummary {
    pub source: GenerationSource,
    pub root_causes: usize,
    pub action_items: usize,
    pub questions: usize,
    /// Newest answer or notes timestamp the service was shown. Evidence
    /// after this point has not been analyzed, however late the run
    /// itself committed.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub evidence_through: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateKind {
    RootCause,
    ActionItem,
}

/// Before/after values for one changed field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub from: Value,
    pub to: Value,
}

/// Field name to change, ordered for stable output.
pub type FieldChanges = BTreeMap<String, FieldChange>;

/// Event-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "data", rename_all = "snake_case")]
pub enum AuditPayload {
    StatusChanged {
        from: RecordStatus,
        to: RecordStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        closing_notes: Option<String>,
        /// Present when the transition also persisted an analysis run.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        generation: Option<GenerationSummary>,
    },
    CandidateGenerated(GenerationSummary),
    CandidateUpdated {
        kind: CandidateKind,
        candidate_id: Uuid,
        changes: FieldChanges,
    },
    PromotedToFinal {
        candidate_id: RootCauseCandidateId,
        final_id: RootCauseFinalId,
    },
    FinalCreated {
        final_id: RootCauseFinalId,
        cause_text: String,
    },
    FinalUpdated {
        final_id: RootCauseFinalId,
        changes: FieldChanges,
    },
    FinalDeleted {
        final_id: RootCauseFinalId,
        cause_text: String,
    },
    ActionItemPromoted {
        candidate_id: ActionItemCandidateId,
        action_item_id: ActionItemId,
    },
    ActionItemCreated {
        action_item_id: ActionItemId,
        action_text: String,
    },
    ActionItemUpdated {
        action_item_id: ActionItemId,
        changes: FieldChanges,
    },
    ActionItemDeleted {
        action_item_id: ActionItemId,
        action_text: String,
    },
    ActionCompleted {
        action_item_id: ActionItemId,
        changes: FieldChanges,
    },
    OwnerChanged {
        previous_owner_id: UserId,
        previous_owner_name: Option<String>,
        new_owner_id: UserId,
        new_owner_name: String,
    },
    AnswerSubmitted {
        question_id: QuestionId,
        answer_text: String,
    },
    AnswerUpdated {
        question_id: QuestionId,
        previous_answer: Option<String>,
        answer_text: String,
    },
    RecordCreated {
        display_number: i64,
        title: String,
    },
    RecordUpdated {
        changes: FieldChanges,
    },
    RecordDeleted {
        display_number: i64,
    },
}

impl AuditPayload {
    pub fn event_type(&self) -> AuditEventType {
        match self {
            AuditPayload::StatusChanged { .. } => AuditEventType::StatusChanged,
            AuditPayload::CandidateGenerated(_) => AuditEventType::CandidateGenerated,
            AuditPayload::CandidateUpdated { .. } => AuditEventType::CandidateUpdated,
            AuditPayload::PromotedToFinal { .. } => AuditEventType::PromotedToFinal,
            AuditPayload::FinalCreated { .. } => AuditEventType::FinalCreated,
            AuditPayload::FinalUpdated { .. } => AuditEventType::FinalUpdated,
            AuditPayload::FinalDeleted { .. } => AuditEventType::FinalDeleted,
            AuditPayload::ActionItemPromoted { .. } => AuditEventType::ActionItemPromoted,
            AuditPayload::ActionItemCreated { .. } => AuditEventType::ActionItemCreated,
            AuditPayload::ActionItemUpdated { .. } => AuditEventType::ActionItemUpdated,
            AuditPayload::ActionItemDeleted { .. } => AuditEventType::ActionItemDeleted,
            AuditPayload::ActionCompleted { .. } => AuditEventType::ActionCompleted,
            AuditPayload::OwnerChanged { .. } => AuditEventType::OwnerChanged,
            AuditPayload::AnswerSubmitted { .. } => AuditEventType::AnswerSubmitted,
            AuditPayload::AnswerUpdated { .. } => AuditEventType::AnswerUpdated,
            AuditPayload::RecordCreated { .. } => AuditEventType::RecordCreated,
            AuditPayload::RecordUpdated { .. } => AuditEventType::RecordUpdated,
            AuditPayload::RecordDeleted { .. } => AuditEventType::RecordDeleted,
        }
    }

    /// The analysis run this event records, if any.
    pub fn generation(&self) -> Option<&GenerationSummary> {
        match self {
            AuditPayload::CandidateGenerated(summary) => Some(summary),
            AuditPayload::StatusChanged { generation, .. } => generation.as_ref(),
            _ => None,
        }
    }
}

/// One row of the append-only ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: AuditEventId,
    pub record_id: RecordId,
    pub actor_user_id: UserId,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub payload: AuditPayload,
}

impl AuditEvent {
    pub fn event_type(&self) -> AuditEventType {
        self.payload.event_type()
    }
}

/// Field-level diff between two serializable rows.
///
/// Both values are projected to JSON objects; keys listed in `ignore`
/// (bookkeeping such as `updated_at`) are skipped. Keys are compared as a
/// union so a field that appears on only one side is reported against
/// `null`.
pub fn diff_fields<T: Serialize>(before: &T, after: &T, ignore: &[&str]) -> FieldChanges {
    let before = serde_json::to_value(before).unwrap_or(Value::Null);
    let after = serde_json::to_value(after).unwrap_or(Value::Null);
    let empty = serde_json::Map::new();
    let before = before.as_object().unwrap_or(&empty);
    let after = after.as_object().unwrap_or(&empty);

    let mut changes = FieldChanges::new();
    for key in before.keys().chain(after.keys()) {
        if ignore.contains(&key.as_str()) || changes.contains_key(key) {
            continue;
        }
        let from = before.get(key).cloned().unwrap_or(Value::Null);
        let to = after.get(key).cloned().unwrap_or(Value::Null);
        if from != to {
            changes.insert(key.clone(), FieldChange { from, to });
        }
    }
    changes
}
