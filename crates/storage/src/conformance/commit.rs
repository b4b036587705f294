//! Atomic commit conformance tests.
//!
//! A record, its child rows and its audit events land together on commit and
//! not at all on abort.

use std::future::Future;

use super::{
    make_action_item, make_action_item_candidate, make_event, make_final, make_question,
    make_record, make_root_cause_candidate, seed_record, TestResult,
};
use crate::{ChildRef, RcaStorage, StorageError};

pub(super) async fn run_commit_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: RcaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "commit",
        "record_children_and_events_visible_after_commit",
        record_children_and_events_visible_after_commit(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "nothing_visible_after_abort",
        nothing_visible_after_abort(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "audit_events_keep_append_order",
        audit_events_keep_append_order(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "delete_removes_committed_rows",
        delete_removes_committed_rows(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "owner_of_resolves_committed_children",
        owner_of_resolves_committed_children(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "display_numbers_increase",
        display_numbers_increase(factory).await,
    ));

    results
}

async fn record_children_and_events_visible_after_commit<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: RcaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let record = make_record(1);
    let rc = make_root_cause_candidate(record.id);
    let ai = make_action_item_candidate(record.id);
    let final_row = make_final(&rc);
    let item = make_action_item(&ai);

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.insert_record(&mut snap, record.clone())
        .await
        .map_err(|e| format!("insert: {e}"))?;
    s.put_question(&mut snap, make_question(record.id, "When was it last serviced?"))
        .await
        .map_err(|e| format!("question: {e}"))?;
    s.put_root_cause_candidate(&mut snap, rc.clone())
        .await
        .map_err(|e| format!("rc candidate: {e}"))?;
    s.put_action_item_candidate(&mut snap, ai.clone())
        .await
        .map_err(|e| format!("ai candidate: {e}"))?;
    s.put_root_cause_final(&mut snap, final_row.clone())
        .await
        .map_err(|e| format!("final: {e}"))?;
    s.put_action_item(&mut snap, item.clone())
        .await
        .map_err(|e| format!("item: {e}"))?;
    s.append_audit_event(&mut snap, make_event(&record))
        .await
        .map_err(|e| format!("append: {e}"))?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let stored = s.get_record(record.id).await.map_err(|e| format!("get: {e}"))?;
    if stored != record {
        return Err("committed record differs from inserted record".to_string());
    }
    let children = s
        .get_children(record.id)
        .await
        .map_err(|e| format!("children: {e}"))?;
    if children.questions.len() != 1
        || children.root_cause_candidates.len() != 1
        || children.action_item_candidates.len() != 1
    {
        return Err(format!("unexpected child counts: {:?}", children));
    }
    if children.root_cause_final(final_row.id) != Some(&final_row) {
        return Err("final not committed intact".to_string());
    }
    if children.action_item(item.id) != Some(&item) {
        return Err("action item not committed intact".to_string());
    }
    let events = s
        .list_audit_events(record.id)
        .await
        .map_err(|e| format!("events: {e}"))?;
    if events.len() != 1 {
        return Err(format!("expected 1 event, got {}", events.len()));
    }
    Ok(())
}

async fn nothing_visible_after_abort<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RcaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let record = seed_record(&s, 1).await?;
    let rc = make_root_cause_candidate(record.id);

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    let mut locked = s
        .get_record_for_update(&mut snap, record.id)
        .await
        .map_err(|e| format!("lock: {e}"))?;
    locked.title = "Aborted edit".to_string();
    s.update_record(&mut snap, locked)
        .await
        .map_err(|e| format!("update: {e}"))?;
    s.put_root_cause_candidate(&mut snap, rc)
        .await
        .map_err(|e| format!("candidate: {e}"))?;
    s.append_audit_event(&mut snap, make_event(&record))
        .await
        .map_err(|e| format!("append: {e}"))?;
    s.abort_snapshot(snap)
        .await
        .map_err(|e| format!("abort: {e}"))?;

    let stored = s.get_record(record.id).await.map_err(|e| format!("get: {e}"))?;
    if stored.title != record.title {
        return Err("aborted record update is visible".to_string());
    }
    let children = s
        .get_children(record.id)
        .await
        .map_err(|e| format!("children: {e}"))?;
    if !children.root_cause_candidates.is_empty() {
        return Err("aborted candidate is visible".to_string());
    }
    let events = s
        .list_audit_events(record.id)
        .await
        .map_err(|e| format!("events: {e}"))?;
    if !events.is_empty() {
        return Err("aborted audit event is visible".to_string());
    }
    Ok(())
}

async fn audit_events_keep_append_order<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RcaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let record = seed_record(&s, 1).await?;
    let mut expected = Vec::new();

    for _ in 0..3 {
        let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
        s.get_record_for_update(&mut snap, record.id)
            .await
            .map_err(|e| format!("lock: {e}"))?;
        for _ in 0..2 {
            let event = make_event(&record);
            expected.push(event.id);
            s.append_audit_event(&mut snap, event)
                .await
                .map_err(|e| format!("append: {e}"))?;
        }
        s.commit_snapshot(snap)
            .await
            .map_err(|e| format!("commit: {e}"))?;
    }

    let actual: Vec<_> = s
        .list_audit_events(record.id)
        .await
        .map_err(|e| format!("events: {e}"))?
        .into_iter()
        .map(|e| e.id)
        .collect();
    if actual != expected {
        return Err("audit events not returned in append order".to_string());
    }
    Ok(())
}

async fn delete_removes_committed_rows<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RcaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let record = seed_record(&s, 1).await?;
    let final_row = make_final(&make_root_cause_candidate(record.id));
    let item = make_action_item(&make_action_item_candidate(record.id));

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.get_record_for_update(&mut snap, record.id)
        .await
        .map_err(|e| format!("lock: {e}"))?;
    s.put_root_cause_final(&mut snap, final_row.clone())
        .await
        .map_err(|e| format!("final: {e}"))?;
    s.put_action_item(&mut snap, item.clone())
        .await
        .map_err(|e| format!("item: {e}"))?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.get_record_for_update(&mut snap, record.id)
        .await
        .map_err(|e| format!("lock: {e}"))?;
    s.delete_root_cause_final(&mut snap, record.id, final_row.id)
        .await
        .map_err(|e| format!("delete final: {e}"))?;
    s.delete_action_item(&mut snap, record.id, item.id)
        .await
        .map_err(|e| format!("delete item: {e}"))?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit delete: {e}"))?;

    let children = s
        .get_children(record.id)
        .await
        .map_err(|e| format!("children: {e}"))?;
    if !children.root_cause_finals.is_empty() || !children.action_items.is_empty() {
        return Err("deleted rows still visible".to_string());
    }
    match s.owner_of(ChildRef::ActionItem(item.id)).await {
        Err(StorageError::ChildNotFound(_)) => Ok(()),
        other => Err(format!("expected ChildNotFound for deleted item, got {:?}", other)),
    }
}

async fn owner_of_resolves_committed_children<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RcaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let record = seed_record(&s, 1).await?;
    let question = make_question(record.id, "Any recent firmware change?");

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.get_record_for_update(&mut snap, record.id)
        .await
        .map_err(|e| format!("lock: {e}"))?;
    s.put_question(&mut snap, question.clone())
        .await
        .map_err(|e| format!("question: {e}"))?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let owner = s
        .owner_of(ChildRef::Question(question.id))
        .await
        .map_err(|e| format!("owner_of: {e}"))?;
    if owner != record.id {
        return Err(format!("expected owner {}, got {owner}", record.id));
    }
    Ok(())
}

async fn display_numbers_increase<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RcaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut previous = 0;
    for _ in 0..5 {
        let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
        let n = s
            .next_display_number(&mut snap)
            .await
            .map_err(|e| format!("sequence: {e}"))?;
        s.abort_snapshot(snap)
            .await
            .map_err(|e| format!("abort: {e}"))?;
        if n <= previous {
            return Err(format!("display number {n} not greater than {previous}"));
        }
        previous = n;
    }
    Ok(())
}
