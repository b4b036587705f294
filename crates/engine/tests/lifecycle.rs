mod common;

use common::{harness, suggestion};
use rcaflow_engine::analysis::{AnalysisError, AnalysisResponse};
use rcaflow_engine::{
    DependentProblem, FailureKind, ItemProgress, Precondition, RecordEdit, WorkflowError,
};
use rcaflow_model::{
    ActionItemField, ActionItemStatus, Actor, AuditEventType, AuditPayload, GenerationSource,
    RecordIntake, RecordStatus, Role, UserId,
};
use rcaflow_storage::RcaStorage;

// ── Intake ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn created_records_are_drafts_owned_by_their_creator() {
    let h = harness();
    let first = h.draft().await;
    let second = h.draft().await;

    assert_eq!(first.status, RecordStatus::Draft);
    assert_eq!(first.owner_user_id, h.owner.id);
    assert!(second.display_number > first.display_number);
    assert_eq!(h.event_types(first.id).await, vec![AuditEventType::RecordCreated]);
}

#[tokio::test]
async fn blank_title_is_rejected() {
    let h = harness();
    let err = h
        .engine
        .workflow()
        .create_record(
            &h.owner,
            RecordIntake {
                title: "   ".to_string(),
                failure_description: "Motor tripped".to_string(),
                impact: None,
                supporting_notes: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::ValidationFailed);
    assert!(h.engine.list_records().await.unwrap().is_empty());
}

#[tokio::test]
async fn editing_details_records_a_diff() {
    let h = harness();
    let record = h.draft().await;
    let updated = h
        .engine
        .workflow()
        .update_record_details(
            record.id,
            &h.owner,
            RecordEdit {
                title: Some("Pump P-101 drive-end bearing seizure".to_string()),
                impact: Some(String::new()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.impact, None);

    let events = h.storage.list_audit_events(record.id).await.unwrap();
    let AuditPayload::RecordUpdated { changes } = &events.last().unwrap().payload else {
        panic!("expected record_updated, got {:?}", events.last());
    };
    assert_eq!(
        changes.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["impact", "title"]
    );
    assert_eq!(changes["impact"].to, serde_json::Value::Null);
}

#[tokio::test]
async fn edit_that_changes_nothing_writes_nothing() {
    let h = harness();
    let record = h.draft().await;
    h.engine
        .workflow()
        .update_record_details(
            record.id,
            &h.owner,
            RecordEdit {
                title: Some(record.title.clone()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(h.event_count(record.id).await, 1);
}

// ── Start ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn manual_start_moves_draft_to_investigation_once() {
    let h = harness();
    let record = h.investigating().await;
    assert_eq!(record.status, RecordStatus::Investigation);

    let err = h
        .engine
        .workflow()
        .start_investigation(record.id, &h.owner)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::PreconditionFailed(Precondition::Status {
            actual: RecordStatus::Investigation,
            ..
        })
    ));
}

#[tokio::test]
async fn only_owner_or_admin_may_start() {
    let h = harness();
    let record = h.draft().await;
    let err = h
        .engine
        .workflow()
        .start_investigation(record.id, &h.other)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::Forbidden);

    h.engine
        .workflow()
        .start_investigation(record.id, &h.admin)
        .await
        .unwrap();
}

#[tokio::test]
async fn ai_start_seeds_candidates_and_questions_in_one_event() {
    let h = harness();
    let record = h.draft().await;
    h.analysis.push(Ok(suggestion()));

    let started = h
        .engine
        .workflow()
        .start_with_ai(record.id, &h.owner)
        .await
        .unwrap();
    assert_eq!(started.status, RecordStatus::Investigation);

    let view = h.engine.record_view(record.id).await.unwrap();
    assert_eq!(view.children.root_cause_candidates.len(), 2);
    assert_eq!(view.children.action_item_candidates.len(), 1);
    assert_eq!(view.children.questions.len(), 2);

    let events = h.storage.list_audit_events(record.id).await.unwrap();
    assert_eq!(events.len(), 2);
    let AuditPayload::StatusChanged {
        from,
        to,
        generation: Some(generation),
        ..
    } = &events[1].payload
    else {
        panic!("expected status_changed with generation, got {:?}", events[1]);
    };
    assert_eq!((*from, *to), (RecordStatus::Draft, RecordStatus::Investigation));
    assert_eq!(generation.source, GenerationSource::Initial);
    assert_eq!(generation.root_causes, 2);
    assert_eq!(generation.questions, 2);

    let request = &h.analysis.requests()[0];
    assert_eq!(request.title, record.title);
}

#[tokio::test]
async fn failed_analysis_leaves_the_draft_untouched() {
    let h = harness();
    let record = h.draft().await;
    h.analysis
        .push(Err(AnalysisError::Network("connection reset".to_string())));

    let err = h
        .engine
        .workflow()
        .start_with_ai(record.id, &h.owner)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::Internal);

    let view = h.engine.record_view(record.id).await.unwrap();
    assert_eq!(view.record.status, RecordStatus::Draft);
    assert!(view.children.root_cause_candidates.is_empty());
    assert_eq!(h.event_count(record.id).await, 1);
}

#[tokio::test]
async fn forbidden_ai_start_never_calls_the_service() {
    let h = harness();
    let record = h.draft().await;
    let err = h
        .engine
        .workflow()
        .start_with_ai(record.id, &h.other)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::Forbidden);
    assert!(h.analysis.requests().is_empty());
}

// ── Questions and re-analysis ───────────────────────────────────────────────

#[tokio::test]
async fn answering_then_revising_records_both_answers() {
    let h = harness();
    let record = h.draft().await;
    h.analysis.push(Ok(suggestion()));
    h.engine
        .workflow()
        .start_with_ai(record.id, &h.owner)
        .await
        .unwrap();
    let question = h.engine.record_view(record.id).await.unwrap().children.questions[0].clone();

    let answered = h
        .engine
        .workflow()
        .answer_question(question.id, &h.owner, " Six weeks ago ")
        .await
        .unwrap();
    assert_eq!(answered.answer_text.as_deref(), Some("Six weeks ago"));
    assert_eq!(answered.answered_by_user_id, Some(h.owner.id));

    // Same text again is a no-op.
    h.engine
        .workflow()
        .answer_question(question.id, &h.owner, "Six weeks ago")
        .await
        .unwrap();

    h.engine
        .workflow()
        .answer_question(question.id, &h.owner, "Eight weeks ago, per the CMMS")
        .await
        .unwrap();

    let events = h.storage.list_audit_events(record.id).await.unwrap();
    let tail: Vec<_> = events.iter().rev().take(2).rev().collect();
    assert_eq!(tail[0].event_type(), AuditEventType::AnswerSubmitted);
    let AuditPayload::AnswerUpdated {
        previous_answer, ..
    } = &tail[1].payload
    else {
        panic!("expected answer_updated, got {:?}", tail[1]);
    };
    assert_eq!(previous_answer.as_deref(), Some("Six weeks ago"));
}

#[tokio::test]
async fn reanalysis_requires_new_evidence() {
    let h = harness();
    let record = h.draft().await;
    h.analysis.push(Ok(suggestion()));
    h.engine
        .workflow()
        .start_with_ai(record.id, &h.owner)
        .await
        .unwrap();

    let err = h
        .engine
        .workflow()
        .reanalyze(record.id, &h.owner)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::PreconditionFailed(Precondition::NoNewEvidence)
    ));
    assert_eq!(h.analysis.requests().len(), 1);

    let question = h.engine.record_view(record.id).await.unwrap().children.questions[0].clone();
    h.engine
        .workflow()
        .answer_question(question.id, &h.owner, "Six weeks ago")
        .await
        .unwrap();

    let mut reply = suggestion();
    reply.root_causes.truncate(1);
    reply.action_items.clear();
    reply.questions = vec![
        "when was the bearing last greased?".to_string(),
        "Which grease was used?".to_string(),
    ];
    h.analysis.push(Ok(reply));

    let summary = h
        .engine
        .workflow()
        .reanalyze(record.id, &h.owner)
        .await
        .unwrap();
    assert_eq!(summary.source, GenerationSource::Reanalysis);
    assert_eq!(summary.root_causes, 1);
    assert_eq!(summary.questions, 1, "repeated question is skipped");

    let view = h.engine.record_view(record.id).await.unwrap();
    assert_eq!(view.children.root_cause_candidates.len(), 3);
    assert_eq!(view.children.questions.len(), 3);
    assert_eq!(h.analysis.requests()[1].answered_questions.len(), 1);

    // The answer has been consumed.
    let err = h
        .engine
        .workflow()
        .reanalyze(record.id, &h.owner)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::PreconditionFailed);
}

#[tokio::test]
async fn no_material_change_is_recorded_and_consumes_evidence() {
    let h = harness();
    let record = h.investigating().await;
    h.engine
        .workflow()
        .update_record_details(
            record.id,
            &h.owner,
            RecordEdit {
                supporting_notes: Some("Vibration trend attached".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    h.analysis.push(Ok(AnalysisResponse::no_material_change()));

    let summary = h
        .engine
        .workflow()
        .reanalyze(record.id, &h.owner)
        .await
        .unwrap();
    assert_eq!(summary.source, GenerationSource::NoMaterialChange);
    assert_eq!(
        h.event_types(record.id).await.last(),
        Some(&AuditEventType::CandidateGenerated)
    );

    let err = h
        .engine
        .workflow()
        .reanalyze(record.id, &h.owner)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::PreconditionFailed);
}

// ── Finalize ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn finalize_needs_at_least_one_action_item() {
    let h = harness();
    let record = h.investigating().await;

    let err = h
        .engine
        .workflow()
        .finalize(record.id, &h.owner)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::IncompleteDependents);
    assert!(err.to_string().contains("at least one action item required"));

    h.complete_item(record.id).await;
    let finalized = h
        .engine
        .workflow()
        .finalize(record.id, &h.owner)
        .await
        .unwrap();
    assert_eq!(finalized.status, RecordStatus::ActionsOpen);
}

#[tokio::test]
async fn finalize_names_missing_fields_per_item() {
    let h = harness();
    let record = h.draft().await;
    h.analysis.push(Ok(suggestion()));
    h.engine
        .workflow()
        .start_with_ai(record.id, &h.owner)
        .await
        .unwrap();
    let candidate = h
        .engine
        .record_view(record.id)
        .await
        .unwrap()
        .children
        .action_item_candidates[0]
        .clone();
    let item = h
        .engine
        .promotion()
        .promote_action_item(candidate.id, &h.owner)
        .await
        .unwrap();

    let err = h
        .engine
        .workflow()
        .finalize(record.id, &h.owner)
        .await
        .unwrap_err();
    let WorkflowError::IncompleteDependents { problems } = err else {
        panic!("expected incomplete dependents, got {err:?}");
    };
    assert_eq!(
        problems,
        vec![DependentProblem::MissingFields {
            action_item_id: item.id,
            fields: vec![ActionItemField::OwnerUserId, ActionItemField::DueDate],
        }]
    );
}

// ── Close and reopen ────────────────────────────────────────────────────────

#[tokio::test]
async fn close_lists_blocked_items_then_succeeds_once_canceled() {
    let h = harness();
    let (record, item) = h.actions_open().await;
    h.engine
        .promotion()
        .update_action_item_progress(
            item.id,
            &h.other,
            ItemProgress {
                status: Some(ActionItemStatus::Blocked),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let err = h
        .engine
        .workflow()
        .close(record.id, &h.owner, "Sensor installed")
        .await
        .unwrap_err();
    let WorkflowError::IncompleteDependents { problems } = err else {
        panic!("expected incomplete dependents, got {err:?}");
    };
    assert_eq!(
        problems,
        vec![DependentProblem::UnresolvedActionItem {
            action_item_id: item.id,
            status: ActionItemStatus::Blocked,
        }]
    );

    h.engine
        .promotion()
        .update_action_item_progress(
            item.id,
            &h.owner,
            ItemProgress {
                status: Some(ActionItemStatus::Canceled),
                completion_notes: Some("Superseded by OEM retrofit".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let closed = h
        .engine
        .workflow()
        .close(record.id, &h.owner, "Retrofit covers the failure mode")
        .await
        .unwrap();
    assert_eq!(closed.status, RecordStatus::Closed);
    assert!(closed.closed_at.is_some());
    assert_eq!(closed.closed_by_user_id, Some(h.owner.id));

    let events = h.storage.list_audit_events(record.id).await.unwrap();
    let json = serde_json::to_value(&events.last().unwrap().payload).unwrap();
    assert_eq!(json["event_type"], "status_changed");
    assert_eq!(json["data"]["from"], "actions_open");
    assert_eq!(json["data"]["to"], "closed");
    assert_eq!(json["data"]["closing_notes"], "Retrofit covers the failure mode");
}

#[tokio::test]
async fn close_without_root_cause_fails() {
    let h = harness();
    let record = h.investigating().await;
    let item = h.complete_item(record.id).await;
    h.engine
        .workflow()
        .finalize(record.id, &h.owner)
        .await
        .unwrap();
    h.engine
        .promotion()
        .update_action_item_progress(
            item.id,
            &h.owner,
            ItemProgress {
                status: Some(ActionItemStatus::Done),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let err = h
        .engine
        .workflow()
        .close(record.id, &h.owner, "Done")
        .await
        .unwrap_err();
    let WorkflowError::IncompleteDependents { problems } = err else {
        panic!("expected incomplete dependents, got {err:?}");
    };
    assert_eq!(problems, vec![DependentProblem::NoRootCause]);
}

#[tokio::test]
async fn close_requires_notes_and_actions_open() {
    let h = harness();
    let record = h.investigating().await;

    let err = h
        .engine
        .workflow()
        .close(record.id, &h.owner, "  ")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::ValidationFailed);

    let err = h
        .engine
        .workflow()
        .close(record.id, &h.owner, "Nothing to do")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::PreconditionFailed);
}

#[tokio::test]
async fn reopen_is_admin_only_and_keeps_closure_fields() {
    let h = harness();
    let (record, item) = h.actions_open().await;
    h.engine
        .promotion()
        .update_action_item_progress(
            item.id,
            &h.other,
            ItemProgress {
                status: Some(ActionItemStatus::Done),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let closed = h
        .engine
        .workflow()
        .close(record.id, &h.owner, "Sensor live")
        .await
        .unwrap();

    let err = h
        .engine
        .workflow()
        .reopen(record.id, &h.owner)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::Forbidden);

    let reopened = h
        .engine
        .workflow()
        .reopen(record.id, &h.admin)
        .await
        .unwrap();
    assert_eq!(reopened.status, RecordStatus::ActionsOpen);
    assert_eq!(reopened.closed_at, closed.closed_at);
    assert_eq!(reopened.closing_notes.as_deref(), Some("Sensor live"));
}

#[tokio::test]
async fn return_to_investigation_unfreezes_root_causes() {
    let h = harness();
    let (record, _) = h.actions_open().await;

    let frozen = h
        .engine
        .promotion()
        .create_final(
            record.id,
            &h.owner,
            rcaflow_engine::FinalDraft {
                cause_text: "Wrong grease grade".to_string(),
                evidence: None,
                confidence: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(frozen.kind(), FailureKind::PreconditionFailed);

    let back = h
        .engine
        .workflow()
        .return_to_investigation(record.id, &h.owner)
        .await
        .unwrap();
    assert_eq!(back.status, RecordStatus::Investigation);
    h.root_cause(record.id).await;
}

// ── Ownership and deletion ──────────────────────────────────────────────────

#[tokio::test]
async fn reassign_to_current_owner_is_a_silent_no_op() {
    let h = harness();
    let record = h.draft().await;
    let same = h
        .engine
        .workflow()
        .reassign_owner(record.id, &h.admin, h.owner.id)
        .await
        .unwrap();
    assert_eq!(same.owner_user_id, h.owner.id);
    assert_eq!(h.event_count(record.id).await, 1);
}

#[tokio::test]
async fn reassign_to_pending_user_fails_before_any_write() {
    let h = harness();
    let record = h.draft().await;
    let err = h
        .engine
        .workflow()
        .reassign_owner(record.id, &h.admin, h.pending.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::ValidationFailed);
    assert_eq!(h.event_count(record.id).await, 1);
    assert_eq!(
        h.engine.record_view(record.id).await.unwrap().record.owner_user_id,
        h.owner.id
    );
}

#[tokio::test]
async fn reassign_records_both_owners() {
    let h = harness();
    let record = h.draft().await;

    let err = h
        .engine
        .workflow()
        .reassign_owner(record.id, &h.owner, h.other.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::Forbidden);

    let moved = h
        .engine
        .workflow()
        .reassign_owner(record.id, &h.admin, h.other.id)
        .await
        .unwrap();
    assert_eq!(moved.owner_user_id, h.other.id);

    let events = h.storage.list_audit_events(record.id).await.unwrap();
    let AuditPayload::OwnerChanged {
        previous_owner_id,
        previous_owner_name,
        new_owner_name,
        ..
    } = &events.last().unwrap().payload
    else {
        panic!("expected owner_changed");
    };
    assert_eq!(*previous_owner_id, h.owner.id);
    assert_eq!(previous_owner_name.as_deref(), Some("Priya Natarajan"));
    assert_eq!(new_owner_name, "Sam Okafor");

    // The previous owner lost edit rights.
    let err = h
        .engine
        .workflow()
        .start_investigation(record.id, &h.owner)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::Forbidden);
}

#[tokio::test]
async fn reassign_from_an_owner_missing_from_the_directory() {
    let h = harness();
    let stranger = Actor::new(UserId::new(), Role::User);
    let intake = RecordIntake {
        title: "Compressor C-4 trip".to_string(),
        failure_description: "High discharge temperature trip".to_string(),
        impact: None,
        supporting_notes: None,
    };
    let record = h
        .engine
        .workflow()
        .create_record(&stranger, intake)
        .await
        .unwrap();

    h.engine
        .workflow()
        .reassign_owner(record.id, &h.admin, h.other.id)
        .await
        .unwrap();
    let events = h.storage.list_audit_events(record.id).await.unwrap();
    let AuditPayload::OwnerChanged {
        previous_owner_name,
        ..
    } = &events.last().unwrap().payload
    else {
        panic!("expected owner_changed");
    };
    assert_eq!(*previous_owner_name, None);
}

#[tokio::test]
async fn deleted_records_disappear_from_views() {
    let h = harness();
    let record = h.draft().await;
    let kept = h.draft().await;

    let err = h
        .engine
        .workflow()
        .delete_record(record.id, &h.owner)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::Forbidden);

    h.engine
        .workflow()
        .delete_record(record.id, &h.admin)
        .await
        .unwrap();

    let err = h.engine.record_view(record.id).await.unwrap_err();
    assert_eq!(err.kind(), FailureKind::NotFound);
    let listed: Vec<_> = h
        .engine
        .list_records()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(listed, vec![kept.id]);

    // The row and its ledger remain for audit.
    assert!(h.storage.get_record(record.id).await.unwrap().is_deleted());
    assert_eq!(
        h.event_types(record.id).await.last(),
        Some(&AuditEventType::RecordDeleted)
    );

    let err = h
        .engine
        .workflow()
        .start_investigation(record.id, &h.admin)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::NotFound);
}
