//! Failure investigation domain model.
//!
//! Entities moved through the investigation lifecycle, the typed audit
//! payloads written alongside every mutation, the completion gate that
//! decides whether a record may close, and the access policy consulted
//! before any mutating operation.
//!
//! Everything in this crate is pure and synchronous. Persistence lives in
//! `rcaflow-storage`; transactional orchestration in `rcaflow-engine`.

pub mod audit;
pub mod completion;
pub mod finding;
pub mod ids;
pub mod policy;
pub mod record;
pub mod user;

pub use audit::{
    diff_fields, AuditEvent, AuditEventType, AuditPayload, CandidateKind, FieldChange,
    FieldChanges, GenerationSource, GenerationSummary,
};
pub use completion::{all_complete, progress, CompletionProgress};
pub use finding::{
    ActionItem, ActionItemCandidate, ActionItemField, ActionItemStatus, Confidence, Priority,
    RootCauseCandidate, RootCauseFinal,
};
pub use ids::{
    ActionItemCandidateId, ActionItemId, AuditEventId, QuestionId, RecordId,
    RootCauseCandidateId, RootCauseFinalId, UserId,
};
pub use policy::{AccessDenied, Actor, Permission};
pub use record::{FollowupQuestion, Record, RecordIntake, RecordStatus};
pub use user::{AppUser, Role, UserStatus};
