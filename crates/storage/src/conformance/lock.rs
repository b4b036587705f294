//! Lock discipline conformance tests.
//!
//! Every write to a record or its children needs the record's row lock in
//! the writing snapshot.

use std::future::Future;

use super::{
    make_action_item, make_action_item_candidate, make_event, make_question, make_record,
    seed_record, TestResult,
};
use crate::{RcaStorage, StorageError};

pub(super) async fn run_lock_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: RcaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "lock",
        "update_record_without_lock_rejected",
        update_record_without_lock_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "lock",
        "child_write_without_lock_rejected",
        child_write_without_lock_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "lock",
        "audit_append_without_lock_rejected",
        audit_append_without_lock_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "lock",
        "children_read_without_lock_rejected",
        children_read_without_lock_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "lock",
        "insert_record_takes_lock",
        insert_record_takes_lock(factory).await,
    ));
    results.push(TestResult::from_result(
        "lock",
        "relock_in_same_snapshot_is_reentrant",
        relock_in_same_snapshot_is_reentrant(factory).await,
    ));
    results.push(TestResult::from_result(
        "lock",
        "lock_on_one_record_does_not_cover_another",
        lock_on_one_record_does_not_cover_another(factory).await,
    ));

    results
}

fn expect_lock_not_held<T: std::fmt::Debug>(
    result: Result<T, StorageError>,
    what: &str,
) -> Result<(), String> {
    match result {
        Err(StorageError::LockNotHeld(_)) => Ok(()),
        other => Err(format!("{what}: expected LockNotHeld, got {:?}", other)),
    }
}

async fn update_record_without_lock_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RcaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut record = seed_record(&s, 1).await?;
    record.title = "Unlocked edit".to_string();

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    let result = s.update_record(&mut snap, record).await;
    let _ = s.abort_snapshot(snap).await;
    expect_lock_not_held(result, "update_record")
}

async fn child_write_without_lock_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RcaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let record = seed_record(&s, 1).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    let question = s
        .put_question(&mut snap, make_question(record.id, "Unlocked?"))
        .await;
    let item = s
        .put_action_item(
            &mut snap,
            make_action_item(&make_action_item_candidate(record.id)),
        )
        .await;
    let _ = s.abort_snapshot(snap).await;

    expect_lock_not_held(question, "put_question")?;
    expect_lock_not_held(item, "put_action_item")
}

async fn audit_append_without_lock_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RcaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let record = seed_record(&s, 1).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    let result = s.append_audit_event(&mut snap, make_event(&record)).await;
    let _ = s.abort_snapshot(snap).await;
    expect_lock_not_held(result, "append_audit_event")
}

async fn children_read_without_lock_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RcaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let record = seed_record(&s, 1).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    let children = s.children_for_update(&mut snap, record.id).await;
    let events = s.audit_events_for_update(&mut snap, record.id).await;
    let _ = s.abort_snapshot(snap).await;

    expect_lock_not_held(children, "children_for_update")?;
    expect_lock_not_held(events, "audit_events_for_update")
}

async fn insert_record_takes_lock<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RcaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let record = make_record(1);

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.insert_record(&mut snap, record.clone())
        .await
        .map_err(|e| format!("insert: {e}"))?;
    s.append_audit_event(&mut snap, make_event(&record))
        .await
        .map_err(|e| format!("append after insert: {e}"))?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))
}

async fn relock_in_same_snapshot_is_reentrant<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RcaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let record = seed_record(&s, 1).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.get_record_for_update(&mut snap, record.id)
        .await
        .map_err(|e| format!("lock: {e}"))?;
    let relock = tokio::time::timeout(
        std::time::Duration::from_secs(2),
        s.get_record_for_update(&mut snap, record.id),
    )
    .await;
    let _ = s.abort_snapshot(snap).await;

    match relock {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(format!("relock failed: {e}")),
        Err(_) => Err("relock in the same snapshot deadlocked".to_string()),
    }
}

async fn lock_on_one_record_does_not_cover_another<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RcaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let first = seed_record(&s, 1).await?;
    let second = seed_record(&s, 2).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.get_record_for_update(&mut snap, first.id)
        .await
        .map_err(|e| format!("lock: {e}"))?;
    let result = s
        .put_question(&mut snap, make_question(second.id, "Wrong record"))
        .await;
    let _ = s.abort_snapshot(snap).await;
    expect_lock_not_held(result, "put_question on unlocked record")
}
