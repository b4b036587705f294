//! Curation of findings: promoting candidates, manual edits of finals and
//! action items, and the narrower progress capability for item owners.
//!
//! Root-cause finals can only change while the record is in investigation.
//! Action items stay editable through actions_open so the team can work them.

use std::sync::Arc;

use rcaflow_model::policy::{authorize_edit, authorize_item_progress};
use rcaflow_model::{
    diff_fields, ActionItem, ActionItemCandidateId, ActionItemId, ActionItemStatus, Actor,
    AuditPayload, CandidateKind, Confidence, Priority, Record, RecordId, RecordStatus,
    RootCauseCandidateId, RootCauseFinal, RootCauseFinalId, UserId,
};
use rcaflow_storage::{ChildRef, RcaStorage, RecordChildren, StorageError};
use serde::Deserialize;
use time::Date;
use tracing::{info, instrument};

use crate::clock::Clock;
use crate::error::WorkflowError;
use crate::ledger;
use crate::txn::{lock_live_record, optional_text, require_status, required_text, settle, WORKABLE};

const INVESTIGATION: &[RecordStatus] = &[RecordStatus::Investigation];

/// A root cause written by hand rather than promoted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FinalDraft {
    pub cause_text: String,
    #[serde(default)]
    pub evidence: Option<String>,
    #[serde(default)]
    pub confidence: Option<Confidence>,
}

/// Partial edit of a root-cause final. A blank `evidence` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FinalEdit {
    pub cause_text: Option<String>,
    pub evidence: Option<String>,
    pub confidence: Option<Confidence>,
}

/// An action item written by hand rather than promoted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ActionItemDraft {
    pub action_text: String,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub owner_user_id: Option<UserId>,
    #[serde(default)]
    pub due_date: Option<Date>,
    #[serde(default)]
    pub success_criteria: Option<String>,
}

/// Partial edit of an action item's plan. Progress fields are edited
/// through [`ItemProgress`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ActionItemEdit {
    pub action_text: Option<String>,
    pub priority: Option<Priority>,
    pub owner_user_id: Option<UserId>,
    pub due_date: Option<Date>,
    pub success_criteria: Option<String>,
}

/// The fields an item owner may change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ItemProgress {
    pub status: Option<ActionItemStatus>,
    pub completion_notes: Option<String>,
    pub work_completed_date: Option<Date>,
}

pub struct PromotionManager<S: RcaStorage> {
    storage: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S: RcaStorage> Clone for PromotionManager<S> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<S: RcaStorage> PromotionManager<S> {
    pub fn new(storage: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    // ── Promotion ─────────────────────────────────────────────────────────────

    /// Copy a root-cause candidate into a final. A candidate can be
    /// promoted once; later attempts fail with `DuplicatePromotion`.
    #[instrument(skip_all, fields(candidate_id = %candidate_id, actor = %actor.id))]
    pub async fn promote_root_cause(
        &self,
        candidate_id: RootCauseCandidateId,
        actor: &Actor,
    ) -> Result<RootCauseFinal, WorkflowError> {
        let storage = self.storage.as_ref();
        let record_id = storage
            .owner_of(ChildRef::RootCauseCandidate(candidate_id))
            .await?;
        let mut snapshot = storage.begin_snapshot().await?;
        let result = self
            .promote_root_cause_in(&mut snapshot, record_id, candidate_id, actor)
            .await;
        let promoted = settle(storage, snapshot, result, "promote_root_cause").await?;
        info!(final_id = %promoted.id, "root cause promoted");
        Ok(promoted)
    }

    async fn promote_root_cause_in(
        &self,
        snapshot: &mut S::Snapshot,
        record_id: RecordId,
        candidate_id: RootCauseCandidateId,
        actor: &Actor,
    ) -> Result<RootCauseFinal, WorkflowError> {
        let storage = self.storage.as_ref();
        let (_, children) = self
            .lock_for_edit(snapshot, record_id, actor, INVESTIGATION)
            .await?;
        let candidate = children
            .root_cause_candidate(candidate_id)
            .cloned()
            .ok_or_else(|| not_found(ChildRef::RootCauseCandidate(candidate_id)))?;
        if children.final_for_candidate(candidate_id).is_some() {
            return Err(WorkflowError::DuplicatePromotion(candidate_id.0));
        }

        let now = self.clock.now();
        let promoted = RootCauseFinal::promoted_from(&candidate, actor.id, now);
        storage.put_root_cause_final(snapshot, promoted.clone()).await?;
        ledger::append(
            storage,
            snapshot,
            record_id,
            actor.id,
            now,
            AuditPayload::PromotedToFinal {
                candidate_id,
                final_id: promoted.id,
            },
        )
        .await?;
        Ok(promoted)
    }

    /// Copy an action-item candidate into an open action item.
    #[instrument(skip_all, fields(candidate_id = %candidate_id, actor = %actor.id))]
    pub async fn promote_action_item(
        &self,
        candidate_id: ActionItemCandidateId,
        actor: &Actor,
    ) -> Result<ActionItem, WorkflowError> {
        let storage = self.storage.as_ref();
        let record_id = storage
            .owner_of(ChildRef::ActionItemCandidate(candidate_id))
            .await?;
        let mut snapshot = storage.begin_snapshot().await?;
        let result = self
            .promote_action_item_in(&mut snapshot, record_id, candidate_id, actor)
            .await;
        let item = settle(storage, snapshot, result, "promote_action_item").await?;
        info!(action_item_id = %item.id, "action item promoted");
        Ok(item)
    }

    async fn promote_action_item_in(
        &self,
        snapshot: &mut S::Snapshot,
        record_id: RecordId,
        candidate_id: ActionItemCandidateId,
        actor: &Actor,
    ) -> Result<ActionItem, WorkflowError> {
        let storage = self.storage.as_ref();
        let (_, children) = self
            .lock_for_edit(snapshot, record_id, actor, INVESTIGATION)
            .await?;
        let candidate = children
            .action_item_candidate(candidate_id)
            .cloned()
            .ok_or_else(|| not_found(ChildRef::ActionItemCandidate(candidate_id)))?;
        if children.item_for_candidate(candidate_id).is_some() {
            return Err(WorkflowError::DuplicatePromotion(candidate_id.0));
        }

        let now = self.clock.now();
        let item = ActionItem::promoted_from(&candidate, actor.id, now);
        storage.put_action_item(snapshot, item.clone()).await?;
        ledger::append(
            storage,
            snapshot,
            record_id,
            actor.id,
            now,
            AuditPayload::ActionItemPromoted {
                candidate_id,
                action_item_id: item.id,
            },
        )
        .await?;
        Ok(item)
    }

    // ── Candidate relabeling ──────────────────────────────────────────────────

    #[instrument(skip_all, fields(candidate_id = %candidate_id, actor = %actor.id))]
    pub async fn relabel_root_cause_candidate(
        &self,
        candidate_id: RootCauseCandidateId,
        actor: &Actor,
        confidence: Confidence,
    ) -> Result<(), WorkflowError> {
        let storage = self.storage.as_ref();
        let record_id = storage
            .owner_of(ChildRef::RootCauseCandidate(candidate_id))
            .await?;
        let mut snapshot = storage.begin_snapshot().await?;
        let result: Result<_, WorkflowError> = async {
            let (_, children) = self
                .lock_for_edit(&mut snapshot, record_id, actor, INVESTIGATION)
                .await?;
            let before = children
                .root_cause_candidate(candidate_id)
                .cloned()
                .ok_or_else(|| not_found(ChildRef::RootCauseCandidate(candidate_id)))?;
            let mut after = before.clone();
            after.confidence = confidence;
            let changes = diff_fields(&before, &after, &[]);
            if changes.is_empty() {
                return Ok(());
            }
            let now = self.clock.now();
            storage.put_root_cause_candidate(&mut snapshot, after).await?;
            ledger::append(
                storage,
                &mut snapshot,
                record_id,
                actor.id,
                now,
                AuditPayload::CandidateUpdated {
                    kind: CandidateKind::RootCause,
                    candidate_id: candidate_id.0,
                    changes,
                },
            )
            .await?;
            Ok(())
        }
        .await;
        settle(storage, snapshot, result, "relabel_root_cause_candidate").await
    }

    #[instrument(skip_all, fields(candidate_id = %candidate_id, actor = %actor.id))]
    pub async fn relabel_action_item_candidate(
        &self,
        candidate_id: ActionItemCandidateId,
        actor: &Actor,
        priority: Priority,
    ) -> Result<(), WorkflowError> {
        let storage = self.storage.as_ref();
        let record_id = storage
            .owner_of(ChildRef::ActionItemCandidate(candidate_id))
            .await?;
        let mut snapshot = storage.begin_snapshot().await?;
        let result: Result<_, WorkflowError> = async {
            let (_, children) = self
                .lock_for_edit(&mut snapshot, record_id, actor, INVESTIGATION)
                .await?;
            let before = children
                .action_item_candidate(candidate_id)
                .cloned()
                .ok_or_else(|| not_found(ChildRef::ActionItemCandidate(candidate_id)))?;
            let mut after = before.clone();
            after.priority = priority;
            let changes = diff_fields(&before, &after, &[]);
            if changes.is_empty() {
                return Ok(());
            }
            let now = self.clock.now();
            storage.put_action_item_candidate(&mut snapshot, after).await?;
            ledger::append(
                storage,
                &mut snapshot,
                record_id,
                actor.id,
                now,
                AuditPayload::CandidateUpdated {
                    kind: CandidateKind::ActionItem,
                    candidate_id: candidate_id.0,
                    changes,
                },
            )
            .await?;
            Ok(())
        }
        .await;
        settle(storage, snapshot, result, "relabel_action_item_candidate").await
    }

    // ── Root-cause finals ─────────────────────────────────────────────────────

    #[instrument(skip_all, fields(record_id = %record_id, actor = %actor.id))]
    pub async fn create_final(
        &self,
        record_id: RecordId,
        actor: &Actor,
        draft: FinalDraft,
    ) -> Result<RootCauseFinal, WorkflowError> {
        let cause_text = required_text("cause_text", &draft.cause_text)?;
        let storage = self.storage.as_ref();
        let mut snapshot = storage.begin_snapshot().await?;
        let result: Result<_, WorkflowError> = async {
            self.lock_for_edit(&mut snapshot, record_id, actor, INVESTIGATION)
                .await?;
            let now = self.clock.now();
            let row = RootCauseFinal {
                id: RootCauseFinalId::new(),
                record_id,
                cause_text,
                evidence: optional_text(draft.evidence),
                confidence: draft.confidence,
                selected_from_candidate_id: None,
                created_by_user_id: actor.id,
                created_at: now,
                updated_at: now,
            };
            storage.put_root_cause_final(&mut snapshot, row.clone()).await?;
            ledger::append(
                storage,
                &mut snapshot,
                record_id,
                actor.id,
                now,
                AuditPayload::FinalCreated {
                    final_id: row.id,
                    cause_text: row.cause_text.clone(),
                },
            )
            .await?;
            Ok(row)
        }
        .await;
        let row = settle(storage, snapshot, result, "create_final").await?;
        info!(final_id = %row.id, "root cause created");
        Ok(row)
    }

    /// Edit a final, recording a field-level diff. An edit that changes
    /// nothing writes nothing.
    #[instrument(skip_all, fields(final_id = %final_id, actor = %actor.id))]
    pub async fn update_final(
        &self,
        final_id: RootCauseFinalId,
        actor: &Actor,
        edit: FinalEdit,
    ) -> Result<RootCauseFinal, WorkflowError> {
        let cause_text = edit
            .cause_text
            .map(|t| required_text("cause_text", &t))
            .transpose()?;
        let storage = self.storage.as_ref();
        let record_id = storage.owner_of(ChildRef::RootCauseFinal(final_id)).await?;
        let mut snapshot = storage.begin_snapshot().await?;
        let result: Result<_, WorkflowError> = async {
            let (_, children) = self
                .lock_for_edit(&mut snapshot, record_id, actor, INVESTIGATION)
                .await?;
            let before = children
                .root_cause_final(final_id)
                .cloned()
                .ok_or_else(|| not_found(ChildRef::RootCauseFinal(final_id)))?;
            let mut after = before.clone();
            if let Some(text) = cause_text {
                after.cause_text = text;
            }
            if let Some(evidence) = edit.evidence {
                after.evidence = optional_text(Some(evidence));
            }
            if let Some(confidence) = edit.confidence {
                after.confidence = Some(confidence);
            }
            let changes = diff_fields(&before, &after, &["updated_at"]);
            if changes.is_empty() {
                return Ok(before);
            }
            let now = self.clock.now();
            after.updated_at = now;
            storage.put_root_cause_final(&mut snapshot, after.clone()).await?;
            ledger::append(
                storage,
                &mut snapshot,
                record_id,
                actor.id,
                now,
                AuditPayload::FinalUpdated { final_id, changes },
            )
            .await?;
            Ok(after)
        }
        .await;
        settle(storage, snapshot, result, "update_final").await
    }

    #[instrument(skip_all, fields(final_id = %final_id, actor = %actor.id))]
    pub async fn delete_final(
        &self,
        final_id: RootCauseFinalId,
        actor: &Actor,
    ) -> Result<(), WorkflowError> {
        let storage = self.storage.as_ref();
        let record_id = storage.owner_of(ChildRef::RootCauseFinal(final_id)).await?;
        let mut snapshot = storage.begin_snapshot().await?;
        let result: Result<_, WorkflowError> = async {
            let (_, children) = self
                .lock_for_edit(&mut snapshot, record_id, actor, INVESTIGATION)
                .await?;
            let row = children
                .root_cause_final(final_id)
                .cloned()
                .ok_or_else(|| not_found(ChildRef::RootCauseFinal(final_id)))?;
            storage
                .delete_root_cause_final(&mut snapshot, record_id, final_id)
                .await?;
            ledger::append(
                storage,
                &mut snapshot,
                record_id,
                actor.id,
                self.clock.now(),
                AuditPayload::FinalDeleted {
                    final_id,
                    cause_text: row.cause_text,
                },
            )
            .await?;
            Ok(())
        }
        .await;
        settle(storage, snapshot, result, "delete_final").await
    }

    // ── Action items ──────────────────────────────────────────────────────────

    #[instrument(skip_all, fields(record_id = %record_id, actor = %actor.id))]
    pub async fn create_action_item(
        &self,
        record_id: RecordId,
        actor: &Actor,
        draft: ActionItemDraft,
    ) -> Result<ActionItem, WorkflowError> {
        let action_text = required_text("action_text", &draft.action_text)?;
        self.require_active_owner(draft.owner_user_id).await?;
        let storage = self.storage.as_ref();
        let mut snapshot = storage.begin_snapshot().await?;
        let result: Result<_, WorkflowError> = async {
            let (record, _) = self
                .lock_for_edit(&mut snapshot, record_id, actor, WORKABLE)
                .await?;
            let now = self.clock.now();
            let item = ActionItem {
                id: ActionItemId::new(),
                record_id,
                action_text,
                status: ActionItemStatus::Open,
                priority: draft.priority,
                owner_user_id: draft.owner_user_id,
                due_date: draft.due_date,
                success_criteria: optional_text(draft.success_criteria),
                completion_notes: None,
                work_completed_date: None,
                selected_from_candidate_id: None,
                created_by_user_id: actor.id,
                created_at: now,
                updated_at: now,
            };
            if record.status == RecordStatus::ActionsOpen {
                require_complete(&item)?;
            }
            storage.put_action_item(&mut snapshot, item.clone()).await?;
            ledger::append(
                storage,
                &mut snapshot,
                record_id,
                actor.id,
                now,
                AuditPayload::ActionItemCreated {
                    action_item_id: item.id,
                    action_text: item.action_text.clone(),
                },
            )
            .await?;
            Ok(item)
        }
        .await;
        let item = settle(storage, snapshot, result, "create_action_item").await?;
        info!(action_item_id = %item.id, "action item created");
        Ok(item)
    }

    /// Edit an item's plan, recording a field-level diff.
    #[instrument(skip_all, fields(action_item_id = %item_id, actor = %actor.id))]
    pub async fn update_action_item(
        &self,
        item_id: ActionItemId,
        actor: &Actor,
        edit: ActionItemEdit,
    ) -> Result<ActionItem, WorkflowError> {
        let action_text = edit
            .action_text
            .map(|t| required_text("action_text", &t))
            .transpose()?;
        self.require_active_owner(edit.owner_user_id).await?;
        let storage = self.storage.as_ref();
        let record_id = storage.owner_of(ChildRef::ActionItem(item_id)).await?;
        let mut snapshot = storage.begin_snapshot().await?;
        let result: Result<_, WorkflowError> = async {
            let (_, children) = self
                .lock_for_edit(&mut snapshot, record_id, actor, WORKABLE)
                .await?;
            let before = children
                .action_item(item_id)
                .cloned()
                .ok_or_else(|| not_found(ChildRef::ActionItem(item_id)))?;
            let mut after = before.clone();
            if let Some(text) = action_text {
                after.action_text = text;
            }
            if let Some(priority) = edit.priority {
                after.priority = Some(priority);
            }
            if let Some(owner) = edit.owner_user_id {
                after.owner_user_id = Some(owner);
            }
            if let Some(due) = edit.due_date {
                after.due_date = Some(due);
            }
            if let Some(criteria) = edit.success_criteria {
                after.success_criteria = optional_text(Some(criteria));
            }
            let changes = diff_fields(&before, &after, &["updated_at"]);
            if changes.is_empty() {
                return Ok(before);
            }
            let now = self.clock.now();
            after.updated_at = now;
            storage.put_action_item(&mut snapshot, after.clone()).await?;
            ledger::append(
                storage,
                &mut snapshot,
                record_id,
                actor.id,
                now,
                AuditPayload::ActionItemUpdated {
                    action_item_id: item_id,
                    changes,
                },
            )
            .await?;
            Ok(after)
        }
        .await;
        settle(storage, snapshot, result, "update_action_item").await
    }

    #[instrument(skip_all, fields(action_item_id = %item_id, actor = %actor.id))]
    pub async fn delete_action_item(
        &self,
        item_id: ActionItemId,
        actor: &Actor,
    ) -> Result<(), WorkflowError> {
        let storage = self.storage.as_ref();
        let record_id = storage.owner_of(ChildRef::ActionItem(item_id)).await?;
        let mut snapshot = storage.begin_snapshot().await?;
        let result: Result<_, WorkflowError> = async {
            let (_, children) = self
                .lock_for_edit(&mut snapshot, record_id, actor, WORKABLE)
                .await?;
            let item = children
                .action_item(item_id)
                .cloned()
                .ok_or_else(|| not_found(ChildRef::ActionItem(item_id)))?;
            storage
                .delete_action_item(&mut snapshot, record_id, item_id)
                .await?;
            ledger::append(
                storage,
                &mut snapshot,
                record_id,
                actor.id,
                self.clock.now(),
                AuditPayload::ActionItemDeleted {
                    action_item_id: item_id,
                    action_text: item.action_text,
                },
            )
            .await?;
            Ok(())
        }
        .await;
        settle(storage, snapshot, result, "delete_action_item").await
    }

    /// Progress an item: status, completion notes, work-completed date.
    ///
    /// Open to the item's owner as well as record editors. Moving to done
    /// stamps today's date when none was given and records
    /// `action_completed`; anything else records `action_item_updated`.
    #[instrument(skip_all, fields(action_item_id = %item_id, actor = %actor.id))]
    pub async fn update_action_item_progress(
        &self,
        item_id: ActionItemId,
        actor: &Actor,
        progress: ItemProgress,
    ) -> Result<ActionItem, WorkflowError> {
        let storage = self.storage.as_ref();
        let record_id = storage.owner_of(ChildRef::ActionItem(item_id)).await?;
        let mut snapshot = storage.begin_snapshot().await?;
        let result: Result<_, WorkflowError> = async {
            let record = lock_live_record(storage, &mut snapshot, record_id).await?;
            let children = storage
                .children_for_update(&mut snapshot, record_id)
                .await?;
            let before = children
                .action_item(item_id)
                .cloned()
                .ok_or_else(|| not_found(ChildRef::ActionItem(item_id)))?;
            authorize_item_progress(actor, &record, &before)?;
            require_status(&record, WORKABLE)?;

            let now = self.clock.now();
            let mut after = before.clone();
            if let Some(status) = progress.status {
                after.status = status;
            }
            if let Some(notes) = progress.completion_notes {
                after.completion_notes = optional_text(Some(notes));
            }
            if let Some(date) = progress.work_completed_date {
                after.work_completed_date = Some(date);
            }
            let completed =
                before.status != ActionItemStatus::Done && after.status == ActionItemStatus::Done;
            if completed && after.work_completed_date.is_none() {
                after.work_completed_date = Some(now.date());
            }

            let changes = diff_fields(&before, &after, &["updated_at"]);
            if changes.is_empty() {
                return Ok(before);
            }
            after.updated_at = now;
            storage.put_action_item(&mut snapshot, after.clone()).await?;
            let payload = if completed {
                AuditPayload::ActionCompleted {
                    action_item_id: item_id,
                    changes,
                }
            } else {
                AuditPayload::ActionItemUpdated {
                    action_item_id: item_id,
                    changes,
                }
            };
            ledger::append(storage, &mut snapshot, record_id, actor.id, now, payload).await?;
            Ok(after)
        }
        .await;
        let item = settle(storage, snapshot, result, "update_action_item_progress").await?;
        info!(status = item.status.as_str(), "action item progressed");
        Ok(item)
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    /// Lock the record, check edit rights and stage, and read its children
    /// under the lock.
    async fn lock_for_edit(
        &self,
        snapshot: &mut S::Snapshot,
        record_id: RecordId,
        actor: &Actor,
        allowed: &[RecordStatus],
    ) -> Result<(Record, RecordChildren), WorkflowError> {
        let storage = self.storage.as_ref();
        let record = lock_live_record(storage, snapshot, record_id).await?;
        authorize_edit(actor, &record)?;
        require_status(&record, allowed)?;
        let children = storage.children_for_update(snapshot, record_id).await?;
        Ok((record, children))
    }

    async fn require_active_owner(&self, owner: Option<UserId>) -> Result<(), WorkflowError> {
        let Some(id) = owner else {
            return Ok(());
        };
        match self.storage.get_user(id).await {
            Ok(user) if user.is_active() => Ok(()),
            Ok(user) => Err(WorkflowError::ValidationFailed(format!(
                "user {id} is {}; only active users may own action items",
                user.status
            ))),
            Err(StorageError::UserNotFound(_)) => Err(WorkflowError::ValidationFailed(format!(
                "owner user {id} does not exist"
            ))),
            Err(e) => Err(e.into()),
        }
    }
}

/// Items added once actions are open must carry a full plan.
fn require_complete(item: &ActionItem) -> Result<(), WorkflowError> {
    let missing = item.missing_fields();
    if missing.is_empty() {
        return Ok(());
    }
    let names: Vec<String> = missing.iter().map(ToString::to_string).collect();
    Err(WorkflowError::ValidationFailed(format!(
        "action item is missing {} while actions are open",
        names.join(", ")
    )))
}

fn not_found(child: ChildRef) -> WorkflowError {
    WorkflowError::NotFound(child.to_string())
}
