//! Snapshot isolation conformance tests.
//!
//! Verifies that uncommitted writes are invisible outside a snapshot, that a
//! snapshot reads its own staged writes, and that aborted writes are
//! discarded.

use std::future::Future;

use super::{make_event, make_question, make_record, seed_record, TestResult};
use crate::{RcaStorage, StorageError};

pub(super) async fn run_snapshot_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: RcaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "snapshot",
        "begin_and_abort_empty_snapshot",
        begin_and_abort_empty_snapshot(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "uncommitted_record_invisible",
        uncommitted_record_invisible(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "uncommitted_update_invisible",
        uncommitted_update_invisible(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "uncommitted_child_invisible",
        uncommitted_child_invisible(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "uncommitted_audit_event_invisible",
        uncommitted_audit_event_invisible(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "snapshot_reads_own_writes",
        snapshot_reads_own_writes(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "abort_discards_record",
        abort_discards_record(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "sequential_snapshots_see_prior_commits",
        sequential_snapshots_see_prior_commits(factory).await,
    ));

    results
}

async fn begin_and_abort_empty_snapshot<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RcaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.abort_snapshot(snap)
        .await
        .map_err(|e| format!("abort: {e}"))
}

async fn uncommitted_record_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
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

    let seen = s.get_record(record.id).await;
    let listed = s.list_records().await.map_err(|e| format!("list: {e}"))?;
    let _ = s.abort_snapshot(snap).await;

    match seen {
        Err(StorageError::RecordNotFound(_)) => {}
        other => return Err(format!("expected RecordNotFound before commit, got {:?}", other)),
    }
    if !listed.is_empty() {
        return Err(format!("expected empty list before commit, got {}", listed.len()));
    }
    Ok(())
}

async fn uncommitted_update_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RcaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let record = seed_record(&s, 1).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    let mut locked = s
        .get_record_for_update(&mut snap, record.id)
        .await
        .map_err(|e| format!("lock: {e}"))?;
    locked.title = "Edited".to_string();
    s.update_record(&mut snap, locked)
        .await
        .map_err(|e| format!("update: {e}"))?;

    let outside = s.get_record(record.id).await.map_err(|e| format!("get: {e}"))?;
    let _ = s.abort_snapshot(snap).await;

    if outside.title != record.title {
        return Err(format!(
            "uncommitted title leaked: expected '{}', got '{}'",
            record.title, outside.title
        ));
    }
    Ok(())
}

async fn uncommitted_child_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
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
    s.put_question(&mut snap, make_question(record.id, "Was the filter changed?"))
        .await
        .map_err(|e| format!("put question: {e}"))?;

    let children = s
        .get_children(record.id)
        .await
        .map_err(|e| format!("children: {e}"))?;
    let _ = s.abort_snapshot(snap).await;

    if !children.questions.is_empty() {
        return Err("uncommitted question visible outside snapshot".to_string());
    }
    Ok(())
}

async fn uncommitted_audit_event_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
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
    s.append_audit_event(&mut snap, make_event(&record))
        .await
        .map_err(|e| format!("append: {e}"))?;

    let events = s
        .list_audit_events(record.id)
        .await
        .map_err(|e| format!("list: {e}"))?;
    let _ = s.abort_snapshot(snap).await;

    if !events.is_empty() {
        return Err(format!("expected 0 committed events, got {}", events.len()));
    }
    Ok(())
}

async fn snapshot_reads_own_writes<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RcaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let record = seed_record(&s, 1).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    let mut locked = s
        .get_record_for_update(&mut snap, record.id)
        .await
        .map_err(|e| format!("lock: {e}"))?;
    locked.title = "Staged".to_string();
    s.update_record(&mut snap, locked)
        .await
        .map_err(|e| format!("update: {e}"))?;
    let question = make_question(record.id, "Which shift saw it first?");
    s.put_question(&mut snap, question.clone())
        .await
        .map_err(|e| format!("put question: {e}"))?;
    s.append_audit_event(&mut snap, make_event(&record))
        .await
        .map_err(|e| format!("append: {e}"))?;

    let reread = s
        .get_record_for_update(&mut snap, record.id)
        .await
        .map_err(|e| format!("relock: {e}"))?;
    let children = s
        .children_for_update(&mut snap, record.id)
        .await
        .map_err(|e| format!("children: {e}"))?;
    let events = s
        .audit_events_for_update(&mut snap, record.id)
        .await
        .map_err(|e| format!("events: {e}"))?;
    let _ = s.abort_snapshot(snap).await;

    if reread.title != "Staged" {
        return Err(format!("expected staged title, got '{}'", reread.title));
    }
    if children.question(question.id).is_none() {
        return Err("staged question not visible to its own snapshot".to_string());
    }
    if events.len() != 1 {
        return Err(format!("expected 1 staged event, got {}", events.len()));
    }
    Ok(())
}

async fn abort_discards_record<S, F, Fut>(factory: &F) -> Result<(), String>
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
    s.abort_snapshot(snap)
        .await
        .map_err(|e| format!("abort: {e}"))?;

    match s.get_record(record.id).await {
        Err(StorageError::RecordNotFound(_)) => Ok(()),
        other => Err(format!("expected RecordNotFound after abort, got {:?}", other)),
    }
}

async fn sequential_snapshots_see_prior_commits<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RcaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let record = seed_record(&s, 1).await?;

    let mut first = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    let mut locked = s
        .get_record_for_update(&mut first, record.id)
        .await
        .map_err(|e| format!("lock: {e}"))?;
    locked.title = "First edit".to_string();
    s.update_record(&mut first, locked)
        .await
        .map_err(|e| format!("update: {e}"))?;
    s.commit_snapshot(first)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let mut second = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    let seen = s
        .get_record_for_update(&mut second, record.id)
        .await
        .map_err(|e| format!("relock: {e}"))?;
    let _ = s.abort_snapshot(second).await;

    if seen.title != "First edit" {
        return Err(format!("expected 'First edit', got '{}'", seen.title));
    }
    Ok(())
}
