//! Workflow controller: one operation per lifecycle transition, plus the
//! intake operations that create and edit a record.
//!
//! ```text
//! draft --start--> investigation --finalize--> actions_open --close--> closed
//!                  investigation <------------ actions_open
//!                                              actions_open <--reopen-- closed
//! ```
//!
//! Each operation opens one snapshot, locks the record, re-validates the
//! guard and the stage under the lock, writes the change and one audit
//! event, and settles. Analysis calls happen before the snapshot opens.

use std::collections::HashSet;
use std::sync::Arc;

use rcaflow_model::policy::{authorize_admin, authorize_edit};
use rcaflow_model::{
    all_complete, diff_fields, ActionItemCandidate, ActionItemCandidateId, Actor, AuditPayload,
    FollowupQuestion, GenerationSource, GenerationSummary, QuestionId, Record, RecordId,
    RecordIntake, RecordStatus, RootCauseCandidate, RootCauseCandidateId, UserId,
};
use rcaflow_storage::{ChildRef, RcaStorage, RecordChildren, StorageError};
use serde::Deserialize;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use crate::analysis::{AnalysisClient, AnalysisRequest, AnalysisResponse};
use crate::clock::Clock;
use crate::error::{DependentProblem, Precondition, WorkflowError};
use crate::ledger::{self, has_new_evidence, latest_evidence_at};
use crate::txn::{
    lock_live_record, optional_text, read_live_record, require_status, required_text, settle,
    EDITABLE, WORKABLE,
};

/// Partial edit of a record's intake fields. Absent fields are left alone;
/// a blank `impact` or `supporting_notes` clears the field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RecordEdit {
    pub title: Option<String>,
    pub failure_description: Option<String>,
    pub impact: Option<String>,
    pub supporting_notes: Option<String>,
}

pub struct WorkflowController<S: RcaStorage> {
    storage: Arc<S>,
    analysis: Arc<dyn AnalysisClient>,
    clock: Arc<dyn Clock>,
}

impl<S: RcaStorage> Clone for WorkflowController<S> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            analysis: self.analysis.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<S: RcaStorage> WorkflowController<S> {
    pub fn new(storage: Arc<S>, analysis: Arc<dyn AnalysisClient>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            analysis,
            clock,
        }
    }

    // ── Intake ────────────────────────────────────────────────────────────────

    #[instrument(skip_all, fields(actor = %actor.id))]
    pub async fn create_record(
        &self,
        actor: &Actor,
        intake: RecordIntake,
    ) -> Result<Record, WorkflowError> {
        let intake = RecordIntake {
            title: required_text("title", &intake.title)?,
            failure_description: required_text(
                "failure_description",
                &intake.failure_description,
            )?,
            impact: optional_text(intake.impact),
            supporting_notes: optional_text(intake.supporting_notes),
        };
        let storage = self.storage.as_ref();
        let mut snapshot = storage.begin_snapshot().await?;
        let result = self.create_record_in(&mut snapshot, actor, intake).await;
        let record = settle(storage, snapshot, result, "create_record").await?;
        info!(record_id = %record.id, display_number = record.display_number, "record created");
        Ok(record)
    }

    async fn create_record_in(
        &self,
        snapshot: &mut S::Snapshot,
        actor: &Actor,
        intake: RecordIntake,
    ) -> Result<Record, WorkflowError> {
        let storage = self.storage.as_ref();
        let now = self.clock.now();
        let display_number = storage.next_display_number(snapshot).await?;
        let record = Record::new_draft(display_number, actor.id, intake, now);
        storage.insert_record(snapshot, record.clone()).await?;
        ledger::append(
            storage,
            snapshot,
            record.id,
            actor.id,
            now,
            AuditPayload::RecordCreated {
                display_number,
                title: record.title.clone(),
            },
        )
        .await?;
        Ok(record)
    }

    /// Edit intake fields. Changing the supporting notes counts as new
    /// evidence for re-analysis. An edit that changes nothing writes nothing.
    #[instrument(skip_all, fields(record_id = %record_id, actor = %actor.id))]
    pub async fn update_record_details(
        &self,
        record_id: RecordId,
        actor: &Actor,
        edit: RecordEdit,
    ) -> Result<Record, WorkflowError> {
        let edit = RecordEdit {
            title: edit
                .title
                .map(|t| required_text("title", &t))
                .transpose()?,
            failure_description: edit
                .failure_description
                .map(|d| required_text("failure_description", &d))
                .transpose()?,
            impact: edit.impact,
            supporting_notes: edit.supporting_notes,
        };
        let storage = self.storage.as_ref();
        let mut snapshot = storage.begin_snapshot().await?;
        let result = self
            .update_record_details_in(&mut snapshot, record_id, actor, edit)
            .await;
        settle(storage, snapshot, result, "update_record_details").await
    }

    async fn update_record_details_in(
        &self,
        snapshot: &mut S::Snapshot,
        record_id: RecordId,
        actor: &Actor,
        edit: RecordEdit,
    ) -> Result<Record, WorkflowError> {
        let storage = self.storage.as_ref();
        let before = lock_live_record(storage, snapshot, record_id).await?;
        authorize_edit(actor, &before)?;
        require_status(&before, EDITABLE)?;

        let now = self.clock.now();
        let mut after = before.clone();
        if let Some(title) = edit.title {
            after.title = title;
        }
        if let Some(description) = edit.failure_description {
            after.failure_description = description;
        }
        if let Some(impact) = edit.impact {
            after.impact = optional_text(Some(impact));
        }
        if let Some(notes) = edit.supporting_notes {
            after.supporting_notes = optional_text(Some(notes));
        }
        if after.supporting_notes != before.supporting_notes {
            after.investigation_notes_updated_at = Some(now);
        }

        let changes = diff_fields(
            &before,
            &after,
            &["updated_at", "investigation_notes_updated_at"],
        );
        if changes.is_empty() {
            return Ok(before);
        }
        after.updated_at = now;
        storage.update_record(snapshot, after.clone()).await?;
        ledger::append(
            storage,
            snapshot,
            record_id,
            actor.id,
            now,
            AuditPayload::RecordUpdated { changes },
        )
        .await?;
        Ok(after)
    }

    /// Record an answer to a follow-up question. Re-submitting the same text
    /// is a no-op.
    #[instrument(skip_all, fields(question_id = %question_id, actor = %actor.id))]
    pub async fn answer_question(
        &self,
        question_id: QuestionId,
        actor: &Actor,
        answer: &str,
    ) -> Result<FollowupQuestion, WorkflowError> {
        let answer = required_text("answer_text", answer)?;
        let storage = self.storage.as_ref();
        let record_id = storage.owner_of(ChildRef::Question(question_id)).await?;
        let mut snapshot = storage.begin_snapshot().await?;
        let result = self
            .answer_question_in(&mut snapshot, record_id, question_id, actor, answer)
            .await;
        settle(storage, snapshot, result, "answer_question").await
    }

    async fn answer_question_in(
        &self,
        snapshot: &mut S::Snapshot,
        record_id: RecordId,
        question_id: QuestionId,
        actor: &Actor,
        answer: String,
    ) -> Result<FollowupQuestion, WorkflowError> {
        let storage = self.storage.as_ref();
        let record = lock_live_record(storage, snapshot, record_id).await?;
        authorize_edit(actor, &record)?;
        require_status(&record, WORKABLE)?;

        let children = storage.children_for_update(snapshot, record_id).await?;
        let mut question = children
            .question(question_id)
            .cloned()
            .ok_or_else(|| WorkflowError::NotFound(ChildRef::Question(question_id).to_string()))?;
        if question.answer_text.as_deref() == Some(answer.as_str()) {
            return Ok(question);
        }

        let now = self.clock.now();
        let previous_answer = question.answer_text.replace(answer.clone());
        question.answered_at = Some(now);
        question.answered_by_user_id = Some(actor.id);
        storage.put_question(snapshot, question.clone()).await?;

        let payload = match previous_answer {
            None => AuditPayload::AnswerSubmitted {
                question_id,
                answer_text: answer,
            },
            Some(previous) => AuditPayload::AnswerUpdated {
                question_id,
                previous_answer: Some(previous),
                answer_text: answer,
            },
        };
        ledger::append(storage, snapshot, record_id, actor.id, now, payload).await?;
        Ok(question)
    }

    /// Soft-delete a record. Admin only.
    #[instrument(skip_all, fields(record_id = %record_id, actor = %actor.id))]
    pub async fn delete_record(
        &self,
        record_id: RecordId,
        actor: &Actor,
    ) -> Result<(), WorkflowError> {
        authorize_admin(actor)?;
        let storage = self.storage.as_ref();
        let mut snapshot = storage.begin_snapshot().await?;
        let result = self.delete_record_in(&mut snapshot, record_id, actor).await;
        settle(storage, snapshot, result, "delete_record").await?;
        info!("record deleted");
        Ok(())
    }

    async fn delete_record_in(
        &self,
        snapshot: &mut S::Snapshot,
        record_id: RecordId,
        actor: &Actor,
    ) -> Result<(), WorkflowError> {
        let storage = self.storage.as_ref();
        let mut record = lock_live_record(storage, snapshot, record_id).await?;
        let now = self.clock.now();
        record.deleted_at = Some(now);
        record.updated_at = now;
        let display_number = record.display_number;
        storage.update_record(snapshot, record).await?;
        ledger::append(
            storage,
            snapshot,
            record_id,
            actor.id,
            now,
            AuditPayload::RecordDeleted { display_number },
        )
        .await?;
        Ok(())
    }

    // ── Transitions ───────────────────────────────────────────────────────────

    /// draft → investigation, without analysis.
    #[instrument(skip_all, fields(record_id = %record_id, actor = %actor.id))]
    pub async fn start_investigation(
        &self,
        record_id: RecordId,
        actor: &Actor,
    ) -> Result<Record, WorkflowError> {
        let storage = self.storage.as_ref();
        let mut snapshot = storage.begin_snapshot().await?;
        let result = self
            .start_investigation_in(&mut snapshot, record_id, actor)
            .await;
        let record = settle(storage, snapshot, result, "start_investigation").await?;
        info!("investigation started");
        Ok(record)
    }

    async fn start_investigation_in(
        &self,
        snapshot: &mut S::Snapshot,
        record_id: RecordId,
        actor: &Actor,
    ) -> Result<Record, WorkflowError> {
        let storage = self.storage.as_ref();
        let record = lock_live_record(storage, snapshot, record_id).await?;
        authorize_edit(actor, &record)?;
        require_status(&record, &[RecordStatus::Draft])?;
        let now = self.clock.now();
        self.transition(snapshot, record, actor, RecordStatus::Investigation, now, None, None)
            .await
    }

    /// draft → investigation, seeded with the analysis service's candidates
    /// and questions. If the service call fails nothing is written.
    #[instrument(skip_all, fields(record_id = %record_id, actor = %actor.id))]
    pub async fn start_with_ai(
        &self,
        record_id: RecordId,
        actor: &Actor,
    ) -> Result<Record, WorkflowError> {
        let storage = self.storage.as_ref();

        // Fail fast before paying for a service call; re-checked under the lock.
        let record = read_live_record(storage, record_id).await?;
        authorize_edit(actor, &record)?;
        require_status(&record, &[RecordStatus::Draft])?;
        let children = storage.get_children(record_id).await?;
        let seen = latest_evidence_at(&record, &children.questions);
        let response = self
            .call_analysis(&AnalysisRequest::for_record(&record, &children.questions))
            .await?;

        let mut snapshot = storage.begin_snapshot().await?;
        let result = self
            .start_with_ai_in(&mut snapshot, record_id, actor, response, seen)
            .await;
        let record = settle(storage, snapshot, result, "start_with_ai").await?;
        info!("investigation started with analysis");
        Ok(record)
    }

    async fn start_with_ai_in(
        &self,
        snapshot: &mut S::Snapshot,
        record_id: RecordId,
        actor: &Actor,
        response: AnalysisResponse,
        seen: Option<OffsetDateTime>,
    ) -> Result<Record, WorkflowError> {
        let storage = self.storage.as_ref();
        let record = lock_live_record(storage, snapshot, record_id).await?;
        authorize_edit(actor, &record)?;
        require_status(&record, &[RecordStatus::Draft])?;

        let now = self.clock.now();
        let children = storage.children_for_update(snapshot, record_id).await?;
        let summary = self
            .stage_analysis(
                snapshot,
                record_id,
                &children,
                response,
                GenerationSource::Initial,
                seen,
                now,
            )
            .await?;
        self.transition(
            snapshot,
            record,
            actor,
            RecordStatus::Investigation,
            now,
            None,
            Some(summary),
        )
        .await
    }

    /// Ask the analysis service again after new answers or notes.
    ///
    /// Fails with `NoNewEvidence` unless something was answered or noted
    /// after the last analysis run. A "no material change" reply still
    /// records a generation event so the same evidence is not resubmitted.
    #[instrument(skip_all, fields(record_id = %record_id, actor = %actor.id))]
    pub async fn reanalyze(
        &self,
        record_id: RecordId,
        actor: &Actor,
    ) -> Result<GenerationSummary, WorkflowError> {
        let storage = self.storage.as_ref();

        let record = read_live_record(storage, record_id).await?;
        authorize_edit(actor, &record)?;
        require_status(&record, WORKABLE)?;
        let children = storage.get_children(record_id).await?;
        let events = storage.list_audit_events(record_id).await?;
        if !has_new_evidence(&record, &children.questions, &events) {
            return Err(WorkflowError::PreconditionFailed(
                Precondition::NoNewEvidence,
            ));
        }
        // Evidence saved while the service works is left for the next run.
        let seen = latest_evidence_at(&record, &children.questions);
        let response = self
            .call_analysis(&AnalysisRequest::for_record(&record, &children.questions))
            .await?;

        let mut snapshot = storage.begin_snapshot().await?;
        let result = self
            .reanalyze_in(&mut snapshot, record_id, actor, response, seen)
            .await;
        let summary = settle(storage, snapshot, result, "reanalyze").await?;
        info!(
            source = ?summary.source,
            root_causes = summary.root_causes,
            action_items = summary.action_items,
            questions = summary.questions,
            "re-analysis recorded"
        );
        Ok(summary)
    }

    async fn reanalyze_in(
        &self,
        snapshot: &mut S::Snapshot,
        record_id: RecordId,
        actor: &Actor,
        response: AnalysisResponse,
        seen: Option<OffsetDateTime>,
    ) -> Result<GenerationSummary, WorkflowError> {
        let storage = self.storage.as_ref();
        let record = lock_live_record(storage, snapshot, record_id).await?;
        authorize_edit(actor, &record)?;
        require_status(&record, WORKABLE)?;

        // A concurrent re-analysis may have consumed the evidence.
        let children = storage.children_for_update(snapshot, record_id).await?;
        let events = storage.audit_events_for_update(snapshot, record_id).await?;
        if !has_new_evidence(&record, &children.questions, &events) {
            return Err(WorkflowError::PreconditionFailed(
                Precondition::NoNewEvidence,
            ));
        }

        let now = self.clock.now();
        let summary = if response.material_change {
            self.stage_analysis(
                snapshot,
                record_id,
                &children,
                response,
                GenerationSource::Reanalysis,
                seen,
                now,
            )
            .await?
        } else {
            GenerationSummary {
                source: GenerationSource::NoMaterialChange,
                root_causes: 0,
                action_items: 0,
                questions: 0,
                evidence_through: seen,
            }
        };
        ledger::append(
            storage,
            snapshot,
            record_id,
            actor.id,
            now,
            AuditPayload::CandidateGenerated(summary.clone()),
        )
        .await?;
        Ok(summary)
    }

    /// investigation → actions_open once every action item is fully
    /// specified. Root causes are frozen from here on.
    #[instrument(skip_all, fields(record_id = %record_id, actor = %actor.id))]
    pub async fn finalize(
        &self,
        record_id: RecordId,
        actor: &Actor,
    ) -> Result<Record, WorkflowError> {
        let storage = self.storage.as_ref();
        let mut snapshot = storage.begin_snapshot().await?;
        let result = self.finalize_in(&mut snapshot, record_id, actor).await;
        let record = settle(storage, snapshot, result, "finalize").await?;
        info!("record finalized");
        Ok(record)
    }

    async fn finalize_in(
        &self,
        snapshot: &mut S::Snapshot,
        record_id: RecordId,
        actor: &Actor,
    ) -> Result<Record, WorkflowError> {
        let storage = self.storage.as_ref();
        let record = lock_live_record(storage, snapshot, record_id).await?;
        authorize_edit(actor, &record)?;
        require_status(&record, &[RecordStatus::Investigation])?;

        let children = storage.children_for_update(snapshot, record_id).await?;
        let mut problems = Vec::new();
        if children.action_items.is_empty() {
            problems.push(DependentProblem::NoActionItems);
        }
        for item in &children.action_items {
            let fields = item.missing_fields();
            if !fields.is_empty() {
                problems.push(DependentProblem::MissingFields {
                    action_item_id: item.id,
                    fields,
                });
            }
        }
        if !problems.is_empty() {
            return Err(WorkflowError::IncompleteDependents { problems });
        }

        let now = self.clock.now();
        self.transition(snapshot, record, actor, RecordStatus::ActionsOpen, now, None, None)
            .await
    }

    /// actions_open → investigation, to revisit root causes.
    #[instrument(skip_all, fields(record_id = %record_id, actor = %actor.id))]
    pub async fn return_to_investigation(
        &self,
        record_id: RecordId,
        actor: &Actor,
    ) -> Result<Record, WorkflowError> {
        let storage = self.storage.as_ref();
        let mut snapshot = storage.begin_snapshot().await?;
        let result = self
            .return_to_investigation_in(&mut snapshot, record_id, actor)
            .await;
        let record = settle(storage, snapshot, result, "return_to_investigation").await?;
        info!("record returned to investigation");
        Ok(record)
    }

    async fn return_to_investigation_in(
        &self,
        snapshot: &mut S::Snapshot,
        record_id: RecordId,
        actor: &Actor,
    ) -> Result<Record, WorkflowError> {
        let storage = self.storage.as_ref();
        let record = lock_live_record(storage, snapshot, record_id).await?;
        authorize_edit(actor, &record)?;
        require_status(&record, &[RecordStatus::ActionsOpen])?;
        let now = self.clock.now();
        self.transition(snapshot, record, actor, RecordStatus::Investigation, now, None, None)
            .await
    }

    /// actions_open → closed. Requires a root cause and every action item
    /// done or canceled; all checks run against the locked record.
    #[instrument(skip_all, fields(record_id = %record_id, actor = %actor.id))]
    pub async fn close(
        &self,
        record_id: RecordId,
        actor: &Actor,
        closing_notes: &str,
    ) -> Result<Record, WorkflowError> {
        let closing_notes = required_text("closing_notes", closing_notes)?;
        let storage = self.storage.as_ref();
        let mut snapshot = storage.begin_snapshot().await?;
        let result = self
            .close_in(&mut snapshot, record_id, actor, closing_notes)
            .await;
        let record = settle(storage, snapshot, result, "close").await?;
        info!("record closed");
        Ok(record)
    }

    async fn close_in(
        &self,
        snapshot: &mut S::Snapshot,
        record_id: RecordId,
        actor: &Actor,
        closing_notes: String,
    ) -> Result<Record, WorkflowError> {
        let storage = self.storage.as_ref();
        let mut record = lock_live_record(storage, snapshot, record_id).await?;
        authorize_edit(actor, &record)?;
        require_status(&record, &[RecordStatus::ActionsOpen])?;

        let children = storage.children_for_update(snapshot, record_id).await?;
        let problems = closure_problems(&children);
        if !problems.is_empty() {
            return Err(WorkflowError::IncompleteDependents { problems });
        }

        let now = self.clock.now();
        record.closed_at = Some(now);
        record.closed_by_user_id = Some(actor.id);
        record.closing_notes = Some(closing_notes.clone());
        self.transition(
            snapshot,
            record,
            actor,
            RecordStatus::Closed,
            now,
            Some(closing_notes),
            None,
        )
        .await
    }

    /// closed → actions_open. Admin only; closure fields are kept.
    #[instrument(skip_all, fields(record_id = %record_id, actor = %actor.id))]
    pub async fn reopen(&self, record_id: RecordId, actor: &Actor) -> Result<Record, WorkflowError> {
        authorize_admin(actor)?;
        let storage = self.storage.as_ref();
        let mut snapshot = storage.begin_snapshot().await?;
        let result = self.reopen_in(&mut snapshot, record_id, actor).await;
        let record = settle(storage, snapshot, result, "reopen").await?;
        info!("record reopened");
        Ok(record)
    }

    async fn reopen_in(
        &self,
        snapshot: &mut S::Snapshot,
        record_id: RecordId,
        actor: &Actor,
    ) -> Result<Record, WorkflowError> {
        let storage = self.storage.as_ref();
        let record = lock_live_record(storage, snapshot, record_id).await?;
        require_status(&record, &[RecordStatus::Closed])?;
        let now = self.clock.now();
        self.transition(snapshot, record, actor, RecordStatus::ActionsOpen, now, None, None)
            .await
    }

    /// Hand a record to another active user. Admin only. Reassigning to the
    /// current owner succeeds without writing anything.
    ///
    /// The target user is read from the directory outside the snapshot and
    /// is not locked; a concurrent deactivation can land after the check.
    #[instrument(skip_all, fields(record_id = %record_id, actor = %actor.id, new_owner = %new_owner))]
    pub async fn reassign_owner(
        &self,
        record_id: RecordId,
        actor: &Actor,
        new_owner: UserId,
    ) -> Result<Record, WorkflowError> {
        authorize_admin(actor)?;
        let storage = self.storage.as_ref();
        let mut snapshot = storage.begin_snapshot().await?;
        let result = self
            .reassign_owner_in(&mut snapshot, record_id, actor, new_owner)
            .await;
        settle(storage, snapshot, result, "reassign_owner").await
    }

    async fn reassign_owner_in(
        &self,
        snapshot: &mut S::Snapshot,
        record_id: RecordId,
        actor: &Actor,
        new_owner: UserId,
    ) -> Result<Record, WorkflowError> {
        let storage = self.storage.as_ref();
        let mut record = lock_live_record(storage, snapshot, record_id).await?;

        let target = storage.get_user(new_owner).await?;
        if !target.is_active() {
            return Err(WorkflowError::ValidationFailed(format!(
                "user {} is {}; only active users may own records",
                target.id, target.status
            )));
        }
        if record.owner_user_id == new_owner {
            info!("owner unchanged");
            return Ok(record);
        }

        let previous_owner_id = record.owner_user_id;
        let previous_owner_name = match storage.get_user(previous_owner_id).await {
            Ok(user) => Some(user.display_name),
            Err(StorageError::UserNotFound(_)) => None,
            Err(e) => return Err(e.into()),
        };

        let now = self.clock.now();
        record.owner_user_id = new_owner;
        record.updated_at = now;
        storage.update_record(snapshot, record.clone()).await?;
        ledger::append(
            storage,
            snapshot,
            record_id,
            actor.id,
            now,
            AuditPayload::OwnerChanged {
                previous_owner_id,
                previous_owner_name,
                new_owner_id: new_owner,
                new_owner_name: target.display_name,
            },
        )
        .await?;
        info!("owner changed");
        Ok(record)
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    async fn transition(
        &self,
        snapshot: &mut S::Snapshot,
        mut record: Record,
        actor: &Actor,
        to: RecordStatus,
        now: OffsetDateTime,
        closing_notes: Option<String>,
        generation: Option<GenerationSummary>,
    ) -> Result<Record, WorkflowError> {
        let storage = self.storage.as_ref();
        let from = record.status;
        record.status = to;
        record.updated_at = now;
        storage.update_record(snapshot, record.clone()).await?;
        ledger::append(
            storage,
            snapshot,
            record.id,
            actor.id,
            now,
            AuditPayload::StatusChanged {
                from,
                to,
                closing_notes,
                generation,
            },
        )
        .await?;
        Ok(record)
    }

    async fn call_analysis(
        &self,
        request: &AnalysisRequest,
    ) -> Result<AnalysisResponse, WorkflowError> {
        self.analysis.analyze(request).await.map_err(|e| {
            warn!(error = %e, "analysis call failed");
            WorkflowError::from(e)
        })
    }

    /// Write candidates and new questions from an analysis response.
    /// Blank suggestions and questions already asked are skipped.
    #[allow(clippy::too_many_arguments)]
    async fn stage_analysis(
        &self,
        snapshot: &mut S::Snapshot,
        record_id: RecordId,
        existing: &RecordChildren,
        response: AnalysisResponse,
        source: GenerationSource,
        evidence_through: Option<OffsetDateTime>,
        now: OffsetDateTime,
    ) -> Result<GenerationSummary, WorkflowError> {
        let storage = self.storage.as_ref();
        let mut summary = GenerationSummary {
            source,
            root_causes: 0,
            action_items: 0,
            questions: 0,
            evidence_through,
        };

        for suggestion in response.root_causes {
            let Some(cause_text) = optional_text(Some(suggestion.cause_text)) else {
                continue;
            };
            let candidate = RootCauseCandidate {
                id: RootCauseCandidateId::new(),
                record_id,
                cause_text,
                confidence: suggestion.confidence,
                generated_at: now,
            };
            storage.put_root_cause_candidate(snapshot, candidate).await?;
            summary.root_causes += 1;
        }

        for suggestion in response.action_items {
            let Some(action_text) = optional_text(Some(suggestion.action_text)) else {
                continue;
            };
            let candidate = ActionItemCandidate {
                id: ActionItemCandidateId::new(),
                record_id,
                action_text,
                priority: suggestion.priority,
                timeframe: optional_text(suggestion.timeframe),
                success_criteria: optional_text(suggestion.success_criteria),
                generated_at: now,
            };
            storage.put_action_item_candidate(snapshot, candidate).await?;
            summary.action_items += 1;
        }

        let mut asked: HashSet<String> = existing
            .questions
            .iter()
            .map(|q| q.question_text.trim().to_lowercase())
            .collect();
        for text in response.questions {
            let Some(text) = optional_text(Some(text)) else {
                continue;
            };
            if !asked.insert(text.to_lowercase()) {
                continue;
            }
            storage
                .put_question(snapshot, FollowupQuestion::new(record_id, text, now))
                .await?;
            summary.questions += 1;
        }

        Ok(summary)
    }
}

/// Everything standing between an actions_open record and closure.
fn closure_problems(children: &RecordChildren) -> Vec<DependentProblem> {
    let mut problems = Vec::new();
    if children.root_cause_finals.is_empty() {
        problems.push(DependentProblem::NoRootCause);
    }
    if !all_complete(&children.action_items) {
        if children.action_items.is_empty() {
            problems.push(DependentProblem::NoActionItems);
        }
        problems.extend(
            children
                .action_items
                .iter()
                .filter(|item| !item.status.is_resolved())
                .map(|item| DependentProblem::UnresolvedActionItem {
                    action_item_id: item.id,
                    status: item.status,
                }),
        );
    }
    problems
}
