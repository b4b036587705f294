mod common;

use common::{harness, suggestion, Harness};
use rcaflow_engine::analysis::AnalysisResponse;
use rcaflow_engine::{ActionItemDraft, FailureKind, ItemProgress};
use rcaflow_model::{
    ActionItemId, ActionItemStatus, AuditEventType, Priority, RecordId, RecordStatus,
};
use time::macros::date;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_closes_let_exactly_one_through() {
    let h = harness();
    let (record, item) = h.actions_open().await;
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

    let record_id = record.id;
    let mut handles = Vec::new();
    for n in 0..2 {
        let engine = h.engine.clone();
        let actor = if n == 0 { h.owner } else { h.admin };
        handles.push(tokio::spawn(async move {
            engine
                .workflow()
                .close(record_id, &actor, &format!("closed by caller {n}"))
                .await
        }));
    }

    let mut closed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(r) => {
                assert_eq!(r.status, RecordStatus::Closed);
                closed += 1;
            }
            Err(e) => assert!(
                matches!(
                    e.kind(),
                    FailureKind::PreconditionFailed | FailureKind::IncompleteDependents
                ),
                "unexpected failure: {e}"
            ),
        }
    }
    assert_eq!(closed, 1);

    let closes = h
        .event_types(record.id)
        .await
        .into_iter()
        .filter(|t| *t == AuditEventType::StatusChanged)
        .count();
    // start, finalize, close
    assert_eq!(closes, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_promotions_of_one_candidate_yield_one_final() {
    let h = harness();
    let record = h.draft().await;
    h.analysis.push(Ok(suggestion()));
    h.engine
        .workflow()
        .start_with_ai(record.id, &h.owner)
        .await
        .unwrap();
    let candidate_id = h.engine.record_view(record.id).await.unwrap().children.root_cause_candidates[0]
        .id;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = h.engine.clone();
        let actor = h.owner;
        handles.push(tokio::spawn(async move {
            engine
                .promotion()
                .promote_root_cause(candidate_id, &actor)
                .await
        }));
    }

    let mut promoted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => promoted += 1,
            Err(e) => assert_eq!(e.kind(), FailureKind::DuplicatePromotion),
        }
    }
    assert_eq!(promoted, 1);

    let view = h.engine.record_view(record.id).await.unwrap();
    assert_eq!(view.children.root_cause_finals.len(), 1);
    let promotions = h
        .event_types(record.id)
        .await
        .into_iter()
        .filter(|t| *t == AuditEventType::PromotedToFinal)
        .count();
    assert_eq!(promotions, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_answers_on_different_records_do_not_block_each_other() {
    let h = harness();
    let mut records = Vec::new();
    for _ in 0..4 {
        let record = h.draft().await;
        h.analysis.push(Ok(suggestion()));
        h.engine
            .workflow()
            .start_with_ai(record.id, &h.owner)
            .await
            .unwrap();
        records.push(record.id);
    }

    let mut handles = Vec::new();
    for record_id in records.clone() {
        let engine = h.engine.clone();
        let actor = h.owner;
        handles.push(tokio::spawn(async move {
            let question = engine.record_view(record_id).await?.children.questions[0].clone();
            engine
                .workflow()
                .answer_question(question.id, &actor, "Last Tuesday")
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    for record_id in records {
        let view = h.engine.record_view(record_id).await.unwrap();
        assert!(view.children.questions[0].answer_text.is_some());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn answer_saved_during_reanalysis_triggers_the_next_run() {
    let h = harness();
    let record = h.draft().await;
    h.analysis.push(Ok(suggestion()));
    h.engine
        .workflow()
        .start_with_ai(record.id, &h.owner)
        .await
        .unwrap();
    let questions = h.engine.record_view(record.id).await.unwrap().children.questions;
    h.engine
        .workflow()
        .answer_question(questions[0].id, &h.owner, "After the motor swap")
        .await
        .unwrap();

    h.analysis.push(Ok(suggestion()));
    let gate = h.analysis.hold_next();
    let engine = h.engine.clone();
    let (record_id, actor) = (record.id, h.owner);
    let run = tokio::spawn(async move { engine.workflow().reanalyze(record_id, &actor).await });

    // The service has the request; answer another question before it replies.
    gate.entered.notified().await;
    h.engine
        .workflow()
        .answer_question(questions[1].id, &h.owner, "Grease gun was empty")
        .await
        .unwrap();
    gate.release.notify_one();
    run.await.unwrap().unwrap();
    assert_eq!(h.analysis.requests().last().unwrap().answered_questions.len(), 1);

    // The second answer was never analyzed, so another run is allowed.
    h.analysis.push(Ok(AnalysisResponse::no_material_change()));
    h.engine
        .workflow()
        .reanalyze(record.id, &h.owner)
        .await
        .unwrap();
    assert_eq!(h.analysis.requests().last().unwrap().answered_questions.len(), 2);

    let err = h
        .engine
        .workflow()
        .reanalyze(record.id, &h.owner)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::PreconditionFailed);
}

async fn closable(h: &Harness) -> (RecordId, ActionItemId) {
    let (record, item) = h.actions_open().await;
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
    (record.id, item.id)
}

/// A closed record must never hold an unresolved item.
async fn assert_closure_is_clean(h: &Harness, record_id: RecordId) {
    let view = h.engine.record_view(record_id).await.unwrap();
    if view.record.status == RecordStatus::Closed {
        assert!(
            view.children.action_items.iter().all(|i| i.status.is_resolved()),
            "closed with unresolved items: {:?}",
            view.children.action_items
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn closing_races_against_new_action_items() {
    for _ in 0..16 {
        let h = harness();
        let (record_id, _) = closable(&h).await;

        let engine = h.engine.clone();
        let actor = h.owner;
        let close = tokio::spawn(async move {
            engine
                .workflow()
                .close(record_id, &actor, "Bearing replaced")
                .await
        });
        let engine = h.engine.clone();
        let item_owner = h.other.id;
        let create = tokio::spawn(async move {
            engine
                .promotion()
                .create_action_item(
                    record_id,
                    &actor,
                    ActionItemDraft {
                        action_text: "Add vibration monitoring".to_string(),
                        priority: Some(Priority::Low),
                        owner_user_id: Some(item_owner),
                        due_date: Some(date!(2026-05-01)),
                        success_criteria: None,
                    },
                )
                .await
        });

        match (close.await.unwrap(), create.await.unwrap()) {
            (Ok(closed), Err(e)) => {
                assert_eq!(closed.status, RecordStatus::Closed);
                assert_eq!(e.kind(), FailureKind::PreconditionFailed, "{e}");
            }
            (Err(e), Ok(item)) => {
                assert_eq!(e.kind(), FailureKind::IncompleteDependents, "{e}");
                assert_eq!(item.status, ActionItemStatus::Open);
            }
            (close, create) => panic!("unexpected outcome: close {close:?}, create {create:?}"),
        }
        assert_closure_is_clean(&h, record_id).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn closing_races_against_reopening_an_item() {
    for _ in 0..16 {
        let h = harness();
        let (record_id, item_id) = closable(&h).await;

        let engine = h.engine.clone();
        let actor = h.owner;
        let close = tokio::spawn(async move {
            engine
                .workflow()
                .close(record_id, &actor, "Bearing replaced")
                .await
        });
        let engine = h.engine.clone();
        let reopen = tokio::spawn(async move {
            engine
                .promotion()
                .update_action_item_progress(
                    item_id,
                    &actor,
                    ItemProgress {
                        status: Some(ActionItemStatus::Open),
                        ..Default::default()
                    },
                )
                .await
        });

        match (close.await.unwrap(), reopen.await.unwrap()) {
            (Ok(_), Err(e)) => assert_eq!(e.kind(), FailureKind::PreconditionFailed, "{e}"),
            (Err(e), Ok(item)) => {
                assert_eq!(e.kind(), FailureKind::IncompleteDependents, "{e}");
                assert_eq!(item.status, ActionItemStatus::Open);
            }
            (close, reopen) => panic!("unexpected outcome: close {close:?}, reopen {reopen:?}"),
        }
        assert_closure_is_clean(&h, record_id).await;
    }
}
