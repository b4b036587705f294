//! Lifecycle and integrity engine for failure investigations.
//!
//! [`WorkflowController`] moves records between stages, [`PromotionManager`]
//! curates findings, and [`Engine`] bundles both with read-only views. Every
//! mutating operation runs in one storage snapshot: lock the record,
//! re-check preconditions, write the change and exactly one audit event,
//! then commit. Any failure aborts the snapshot.

pub mod analysis;
mod clock;
mod engine;
mod error;
mod ledger;
mod promotion;
mod txn;
mod workflow;

pub use clock::{Clock, SystemClock};
pub use engine::{Engine, RecordView};
pub use error::{DependentProblem, FailureKind, Precondition, WorkflowError};
pub use ledger::{has_new_evidence, last_generation_at, latest_evidence_at};
pub use promotion::{
    ActionItemDraft, ActionItemEdit, FinalDraft, FinalEdit, ItemProgress, PromotionManager,
};
pub use workflow::{RecordEdit, WorkflowController};
