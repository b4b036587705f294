//! Candidate (machine-suggested) and final (curated) findings.
//!
//! Candidates are produced by the analysis collaborator and are never worked
//! directly. A candidate becomes actionable only by promotion, which copies
//! it into a [`RootCauseFinal`] or [`ActionItem`] carrying a back-reference
//! to the candidate. At most one final may reference a given candidate.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::ids::{
    ActionItemCandidateId, ActionItemId, RecordId, RootCauseCandidateId, RootCauseFinalId, UserId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionItemStatus {
    Open,
    InProgress,
    Blocked,
    Done,
    Canceled,
}

impl ActionItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionItemStatus::Open => "open",
            ActionItemStatus::InProgress => "in_progress",
            ActionItemStatus::Blocked => "blocked",
            ActionItemStatus::Done => "done",
            ActionItemStatus::Canceled => "canceled",
        }
    }

    /// Done and canceled items no longer hold a record open.
    pub fn is_resolved(&self) -> bool {
        matches!(self, ActionItemStatus::Done | ActionItemStatus::Canceled)
    }
}

impl fmt::Display for ActionItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A root cause proposed by analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootCauseCandidate {
    pub id: RootCauseCandidateId,
    pub record_id: RecordId,
    pub cause_text: String,
    pub confidence: Confidence,
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
}

/// An action item proposed by analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionItemCandidate {
    pub id: ActionItemCandidateId,
    pub record_id: RecordId,
    pub action_text: String,
    pub priority: Priority,
    pub timeframe: Option<String>,
    pub success_criteria: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
}

/// A curated root cause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootCauseFinal {
    pub id: RootCauseFinalId,
    pub record_id: RecordId,
    pub cause_text: String,
    pub evidence: Option<String>,
    pub confidence: Option<Confidence>,
    pub selected_from_candidate_id: Option<RootCauseCandidateId>,
    pub created_by_user_id: UserId,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl RootCauseFinal {
    /// Copy a candidate into a curated root cause.
    pub fn promoted_from(
        candidate: &RootCauseCandidate,
        actor: UserId,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            id: RootCauseFinalId::new(),
            record_id: candidate.record_id,
            cause_text: candidate.cause_text.clone(),
            evidence: None,
            confidence: Some(candidate.confidence),
            selected_from_candidate_id: Some(candidate.id),
            created_by_user_id: actor,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Fields `finalize` requires on every action item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionItemField {
    ActionText,
    OwnerUserId,
    DueDate,
    Priority,
}

impl fmt::Display for ActionItemField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionItemField::ActionText => "action_text",
            ActionItemField::OwnerUserId => "owner_user_id",
            ActionItemField::DueDate => "due_date",
            ActionItemField::Priority => "priority",
        };
        f.write_str(name)
    }
}

/// A curated, owned unit of corrective work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionItem {
    pub id: ActionItemId,
    pub record_id: RecordId,
    pub action_text: String,
    pub status: ActionItemStatus,
    pub priority: Option<Priority>,
    pub owner_user_id: Option<UserId>,
    pub due_date: Option<Date>,
    pub success_criteria: Option<String>,
    pub completion_notes: Option<String>,
    pub work_completed_date: Option<Date>,
    pub selected_from_candidate_id: Option<ActionItemCandidateId>,
    pub created_by_user_id: UserId,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl ActionItem {
    /// Copy a candidate into an open action item. Owner and due date are left
    /// for the team to fill in before the record is finalized.
    pub fn promoted_from(
        candidate: &ActionItemCandidate,
        actor: UserId,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            id: ActionItemId::new(),
            record_id: candidate.record_id,
            action_text: candidate.action_text.clone(),
            status: ActionItemStatus::Open,
            priority: Some(candidate.priority),
            owner_user_id: None,
            due_date: None,
            success_criteria: candidate.success_criteria.clone(),
            completion_notes: None,
            work_completed_date: None,
            selected_from_candidate_id: Some(candidate.id),
            created_by_user_id: actor,
            created_at: now,
            updated_at: now,
        }
    }

    /// Required fields that are absent or blank, in a stable order.
    pub fn missing_fields(&self) -> Vec<ActionItemField> {
        let mut missing = Vec::new();
        if self.action_text.trim().is_empty() {
            missing.push(ActionItemField::ActionText);
        }
        if self.owner_user_id.is_none() {
            missing.push(ActionItemField::OwnerUserId);
        }
        if self.due_date.is_none() {
            missing.push(ActionItemField::DueDate);
        }
        if self.priority.is_none() {
            missing.push(ActionItemField::Priority);
        }
        missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn candidate() -> ActionItemCandidate {
        ActionItemCandidate {
            id: ActionItemCandidateId::new(),
            record_id: RecordId::new(),
            action_text: "Replace seal with PTFE variant".to_string(),
            priority: Priority::High,
            timeframe: Some("2 weeks".to_string()),
            success_criteria: Some("No weeping for 30 days".to_string()),
            generated_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn promoted_item_references_candidate_and_lacks_owner() {
        let c = candidate();
        let item = ActionItem::promoted_from(&c, UserId::new(), OffsetDateTime::now_utc());
        assert_eq!(item.selected_from_candidate_id, Some(c.id));
        assert_eq!(item.status, ActionItemStatus::Open);
        assert_eq!(
            item.missing_fields(),
            vec![ActionItemField::OwnerUserId, ActionItemField::DueDate]
        );
    }

    #[test]
    fn complete_item_has_no_missing_fields() {
        let mut item =
            ActionItem::promoted_from(&candidate(), UserId::new(), OffsetDateTime::now_utc());
        item.owner_user_id = Some(UserId::new());
        item.due_date = Some(date!(2026 - 11 - 30));
        assert!(item.missing_fields().is_empty());
    }

    #[test]
    fn blank_text_counts_as_missing() {
        let mut item =
            ActionItem::promoted_from(&candidate(), UserId::new(), OffsetDateTime::now_utc());
        item.action_text = "   ".to_string();
        item.priority = None;
        let missing = item.missing_fields();
        assert!(missing.contains(&ActionItemField::ActionText));
        assert!(missing.contains(&ActionItemField::Priority));
    }

    #[test]
    fn resolved_statuses() {
        assert!(ActionItemStatus::Done.is_resolved());
        assert!(ActionItemStatus::Canceled.is_resolved());
        assert!(!ActionItemStatus::Blocked.is_resolved());
        assert!(!ActionItemStatus::InProgress.is_resolved());
        assert!(!ActionItemStatus::Open.is_resolved());
    }
}
