use std::fmt;

use rcaflow_model::{AccessDenied, ActionItemField, ActionItemId, ActionItemStatus, RecordStatus};
use rcaflow_storage::StorageError;
use serde::Serialize;
use uuid::Uuid;

use crate::analysis::AnalysisError;

/// Caller-facing failure classes. Adapters map these to their own codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Unauthorized,
    Forbidden,
    NotFound,
    PreconditionFailed,
    ValidationFailed,
    IncompleteDependents,
    DuplicatePromotion,
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Unauthorized => "unauthorized",
            FailureKind::Forbidden => "forbidden",
            FailureKind::NotFound => "not_found",
            FailureKind::PreconditionFailed => "precondition_failed",
            FailureKind::ValidationFailed => "validation_failed",
            FailureKind::IncompleteDependents => "incomplete_dependents",
            FailureKind::DuplicatePromotion => "duplicate_promotion",
            FailureKind::Internal => "internal",
        }
    }
}

/// Which precondition a request failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Precondition {
    /// The record is not in any of the stages the operation accepts.
    Status {
        required: Vec<RecordStatus>,
        actual: RecordStatus,
    },
    /// Nothing was answered or noted since the last analysis run.
    NoNewEvidence,
}

impl fmt::Display for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precondition::Status { required, actual } => {
                let required: Vec<&str> = required.iter().map(|s| s.as_str()).collect();
                write!(
                    f,
                    "record is {actual}, operation requires {}",
                    required.join(" or ")
                )
            }
            Precondition::NoNewEvidence => {
                f.write_str("no answers or notes added since the last analysis")
            }
        }
    }
}

/// One reason a record cannot advance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "problem", rename_all = "snake_case")]
pub enum DependentProblem {
    NoActionItems,
    NoRootCause,
    MissingFields {
        action_item_id: ActionItemId,
        fields: Vec<ActionItemField>,
    },
    UnresolvedActionItem {
        action_item_id: ActionItemId,
        status: ActionItemStatus,
    },
}

impl fmt::Display for DependentProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependentProblem::NoActionItems => f.write_str("at least one action item required"),
            DependentProblem::NoRootCause => f.write_str("at least one root cause required"),
            DependentProblem::MissingFields {
                action_item_id,
                fields,
            } => {
                let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
                write!(
                    f,
                    "action item {action_item_id} is missing {}",
                    fields.join(", ")
                )
            }
            DependentProblem::UnresolvedActionItem {
                action_item_id,
                status,
            } => write!(f, "action item {action_item_id} is still {status}"),
        }
    }
}

fn join_problems(problems: &[DependentProblem]) -> String {
    problems
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Every way an engine operation can fail.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("authentication required")]
    Unauthorized,

    #[error(transparent)]
    Forbidden(#[from] AccessDenied),

    #[error("{0} not found")]
    NotFound(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(Precondition),

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("incomplete dependents: {}", join_problems(.problems))]
    IncompleteDependents { problems: Vec<DependentProblem> },

    #[error("candidate {0} has already been promoted")]
    DuplicatePromotion(Uuid),

    #[error("internal error: {0}")]
    Internal(String),
}

impl WorkflowError {
    pub fn kind(&self) -> FailureKind {
        match self {
            WorkflowError::Unauthorized => FailureKind::Unauthorized,
            WorkflowError::Forbidden(_) => FailureKind::Forbidden,
            WorkflowError::NotFound(_) => FailureKind::NotFound,
            WorkflowError::PreconditionFailed(_) => FailureKind::PreconditionFailed,
            WorkflowError::ValidationFailed(_) => FailureKind::ValidationFailed,
            WorkflowError::IncompleteDependents { .. } => FailureKind::IncompleteDependents,
            WorkflowError::DuplicatePromotion(_) => FailureKind::DuplicatePromotion,
            WorkflowError::Internal(_) => FailureKind::Internal,
        }
    }

    /// Structured detail for callers, when the failure carries any.
    pub fn detail(&self) -> Option<serde_json::Value> {
        match self {
            WorkflowError::PreconditionFailed(p) => serde_json::to_value(p).ok(),
            WorkflowError::IncompleteDependents { problems } => serde_json::to_value(problems).ok(),
            WorkflowError::DuplicatePromotion(id) => {
                Some(serde_json::json!({ "candidate_id": id }))
            }
            _ => None,
        }
    }

    pub(crate) fn status(required: &[RecordStatus], actual: RecordStatus) -> Self {
        WorkflowError::PreconditionFailed(Precondition::Status {
            required: required.to_vec(),
            actual,
        })
    }
}

impl From<StorageError> for WorkflowError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::RecordNotFound(id) => WorkflowError::NotFound(format!("record {id}")),
            StorageError::ChildNotFound(child) => WorkflowError::NotFound(child.to_string()),
            StorageError::UserNotFound(id) => WorkflowError::NotFound(format!("user {id}")),
            StorageError::DuplicateCandidateReference { candidate_id } => {
                WorkflowError::DuplicatePromotion(candidate_id)
            }
            other @ (StorageError::LockNotHeld(_) | StorageError::Backend(_)) => {
                WorkflowError::Internal(other.to_string())
            }
        }
    }
}

impl From<AnalysisError> for WorkflowError {
    fn from(e: AnalysisError) -> Self {
        WorkflowError::Internal(format!("analysis service: {e}"))
    }
}
