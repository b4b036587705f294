//! Candidate reference uniqueness.
//!
//! `selected_from_candidate_id` is a unique key: a second final pointing at
//! the same candidate fails at commit and the whole snapshot rolls back.

use std::future::Future;

use super::{
    make_action_item, make_action_item_candidate, make_event, make_final,
    make_root_cause_candidate, seed_record, TestResult,
};
use crate::{RcaStorage, StorageError};

pub(super) async fn run_unique_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: RcaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "unique",
        "duplicate_final_in_one_snapshot_rejected",
        duplicate_final_in_one_snapshot_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "unique",
        "duplicate_final_across_snapshots_rejected",
        duplicate_final_across_snapshots_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "unique",
        "duplicate_action_item_rejected",
        duplicate_action_item_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "unique",
        "rejected_commit_leaves_no_trace",
        rejected_commit_leaves_no_trace(factory).await,
    ));
    results.push(TestResult::from_result(
        "unique",
        "reference_freed_by_delete",
        reference_freed_by_delete(factory).await,
    ));
    results.push(TestResult::from_result(
        "unique",
        "unreferenced_finals_do_not_conflict",
        unreferenced_finals_do_not_conflict(factory).await,
    ));

    results
}

fn expect_duplicate(result: Result<(), StorageError>) -> Result<(), String> {
    match result {
        Err(StorageError::DuplicateCandidateReference { .. }) => Ok(()),
        other => Err(format!(
            "expected DuplicateCandidateReference, got {:?}",
            other
        )),
    }
}

async fn duplicate_final_in_one_snapshot_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RcaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let record = seed_record(&s, 1).await?;
    let candidate = make_root_cause_candidate(record.id);

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.get_record_for_update(&mut snap, record.id)
        .await
        .map_err(|e| format!("lock: {e}"))?;
    for _ in 0..2 {
        s.put_root_cause_final(&mut snap, make_final(&candidate))
            .await
            .map_err(|e| format!("final: {e}"))?;
    }
    expect_duplicate(s.commit_snapshot(snap).await)
}

async fn duplicate_final_across_snapshots_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RcaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let record = seed_record(&s, 1).await?;
    let candidate = make_root_cause_candidate(record.id);

    for attempt in 0..2 {
        let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
        s.get_record_for_update(&mut snap, record.id)
            .await
            .map_err(|e| format!("lock: {e}"))?;
        s.put_root_cause_final(&mut snap, make_final(&candidate))
            .await
            .map_err(|e| format!("final: {e}"))?;
        let result = s.commit_snapshot(snap).await;
        if attempt == 0 {
            result.map_err(|e| format!("first commit: {e}"))?;
        } else {
            expect_duplicate(result)?;
        }
    }
    Ok(())
}

async fn duplicate_action_item_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RcaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let record = seed_record(&s, 1).await?;
    let candidate = make_action_item_candidate(record.id);

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.get_record_for_update(&mut snap, record.id)
        .await
        .map_err(|e| format!("lock: {e}"))?;
    s.put_action_item(&mut snap, make_action_item(&candidate))
        .await
        .map_err(|e| format!("item: {e}"))?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("first commit: {e}"))?;

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.get_record_for_update(&mut snap, record.id)
        .await
        .map_err(|e| format!("lock: {e}"))?;
    s.put_action_item(&mut snap, make_action_item(&candidate))
        .await
        .map_err(|e| format!("item: {e}"))?;
    expect_duplicate(s.commit_snapshot(snap).await)
}

async fn rejected_commit_leaves_no_trace<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RcaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let record = seed_record(&s, 1).await?;
    let candidate = make_root_cause_candidate(record.id);

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.get_record_for_update(&mut snap, record.id)
        .await
        .map_err(|e| format!("lock: {e}"))?;
    s.put_root_cause_final(&mut snap, make_final(&candidate))
        .await
        .map_err(|e| format!("final: {e}"))?;
    s.put_root_cause_final(&mut snap, make_final(&candidate))
        .await
        .map_err(|e| format!("final: {e}"))?;
    s.append_audit_event(&mut snap, make_event(&record))
        .await
        .map_err(|e| format!("append: {e}"))?;
    expect_duplicate(s.commit_snapshot(snap).await)?;

    let children = s
        .get_children(record.id)
        .await
        .map_err(|e| format!("children: {e}"))?;
    if !children.root_cause_finals.is_empty() {
        return Err("finals from a rejected commit are visible".to_string());
    }
    let events = s
        .list_audit_events(record.id)
        .await
        .map_err(|e| format!("events: {e}"))?;
    if !events.is_empty() {
        return Err("audit event from a rejected commit is visible".to_string());
    }

    // The lock must be free again.
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    let relock = tokio::time::timeout(
        std::time::Duration::from_secs(2),
        s.get_record_for_update(&mut snap, record.id),
    )
    .await;
    let _ = s.abort_snapshot(snap).await;
    match relock {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(format!("relock failed: {e}")),
        Err(_) => Err("record lock still held after rejected commit".to_string()),
    }
}

async fn reference_freed_by_delete<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RcaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let record = seed_record(&s, 1).await?;
    let candidate = make_root_cause_candidate(record.id);
    let first = make_final(&candidate);

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.get_record_for_update(&mut snap, record.id)
        .await
        .map_err(|e| format!("lock: {e}"))?;
    s.put_root_cause_final(&mut snap, first.clone())
        .await
        .map_err(|e| format!("final: {e}"))?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.get_record_for_update(&mut snap, record.id)
        .await
        .map_err(|e| format!("lock: {e}"))?;
    s.delete_root_cause_final(&mut snap, record.id, first.id)
        .await
        .map_err(|e| format!("delete: {e}"))?;
    s.put_root_cause_final(&mut snap, make_final(&candidate))
        .await
        .map_err(|e| format!("re-promote: {e}"))?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit after delete: {e}"))
}

async fn unreferenced_finals_do_not_conflict<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RcaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let record = seed_record(&s, 1).await?;
    let candidate = make_root_cause_candidate(record.id);

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.get_record_for_update(&mut snap, record.id)
        .await
        .map_err(|e| format!("lock: {e}"))?;
    for _ in 0..3 {
        let mut manual = make_final(&candidate);
        manual.selected_from_candidate_id = None;
        s.put_root_cause_final(&mut snap, manual)
            .await
            .map_err(|e| format!("final: {e}"))?;
    }
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))
}
