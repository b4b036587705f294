//! The investigation record and its follow-up questions.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::ids::{QuestionId, RecordId, UserId};

/// Workflow stage of a record.
///
/// ```text
/// draft --start--> investigation --finalize--> actions_open --close--> closed
///                  investigation <------------ actions_open
///                                              actions_open <--reopen-- closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Draft,
    Investigation,
    ActionsOpen,
    Closed,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Draft => "draft",
            RecordStatus::Investigation => "investigation",
            RecordStatus::ActionsOpen => "actions_open",
            RecordStatus::Closed => "closed",
        }
    }

    /// Whether findings and answers on the record may still be worked.
    pub fn is_workable(&self) -> bool {
        matches!(self, RecordStatus::Investigation | RecordStatus::ActionsOpen)
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Free-text intake supplied when a record is opened.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordIntake {
    pub title: String,
    pub failure_description: String,
    #[serde(default)]
    pub impact: Option<String>,
    #[serde(default)]
    pub supporting_notes: Option<String>,
}

/// A failure investigation case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    /// Sequential, human-facing number. Gaps are possible after rollbacks.
    pub display_number: i64,
    pub status: RecordStatus,
    pub owner_user_id: UserId,
    pub created_by_user_id: UserId,
    pub title: String,
    pub failure_description: String,
    pub impact: Option<String>,
    pub supporting_notes: Option<String>,
    /// Bumped whenever `supporting_notes` changes; compared against the last
    /// analysis run to detect new evidence.
    #[serde(with = "time::serde::rfc3339::option")]
    pub investigation_notes_updated_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub closed_at: Option<OffsetDateTime>,
    pub closed_by_user_id: Option<UserId>,
    pub closing_notes: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub deleted_at: Option<OffsetDateTime>,
}

impl Record {
    /// A fresh draft owned by its creator.
    pub fn new_draft(
        display_number: i64,
        creator: UserId,
        intake: RecordIntake,
        now: OffsetDateTime,
    ) -> Self {
        let notes_at = intake.supporting_notes.as_ref().map(|_| now);
        Self {
            id: RecordId::new(),
            display_number,
            status: RecordStatus::Draft,
            owner_user_id: creator,
            created_by_user_id: creator,
            title: intake.title,
            failure_description: intake.failure_description,
            impact: intake.impact,
            supporting_notes: intake.supporting_notes,
            investigation_notes_updated_at: notes_at,
            closed_at: None,
            closed_by_user_id: None,
            closing_notes: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// A question raised by analysis, answered by the investigation team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowupQuestion {
    pub id: QuestionId,
    pub record_id: RecordId,
    pub question_text: String,
    pub answer_text: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub answered_at: Option<OffsetDateTime>,
    pub answered_by_user_id: Option<UserId>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl FollowupQuestion {
    pub fn new(record_id: RecordId, question_text: String, now: OffsetDateTime) -> Self {
        Self {
            id: QuestionId::new(),
            record_id,
            question_text,
            answer_text: None,
            answered_at: None,
            answered_by_user_id: None,
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intake(notes: Option<&str>) -> RecordIntake {
        RecordIntake {
            title: "Pump seal leak".to_string(),
            failure_description: "Seal on P-101 weeping after restart".to_string(),
            impact: None,
            supporting_notes: notes.map(str::to_string),
        }
    }

    #[test]
    fn new_draft_is_owned_by_creator() {
        let creator = UserId::new();
        let now = OffsetDateTime::now_utc();
        let record = Record::new_draft(7, creator, intake(None), now);
        assert_eq!(record.status, RecordStatus::Draft);
        assert_eq!(record.owner_user_id, creator);
        assert_eq!(record.display_number, 7);
        assert!(record.closed_at.is_none());
        assert!(record.investigation_notes_updated_at.is_none());
    }

    #[test]
    fn initial_notes_stamp_the_notes_timestamp() {
        let now = OffsetDateTime::now_utc();
        let record = Record::new_draft(1, UserId::new(), intake(Some("photos attached")), now);
        assert_eq!(record.investigation_notes_updated_at, Some(now));
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&RecordStatus::ActionsOpen).unwrap();
        assert_eq!(json, "\"actions_open\"");
        assert!(RecordStatus::ActionsOpen.is_workable());
        assert!(!RecordStatus::Closed.is_workable());
    }
}
