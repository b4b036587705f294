use std::future::Future;
use std::sync::Arc;

use rcaflow_model::RecordId;

use super::{make_event, make_final, make_root_cause_candidate, seed_record, TestResult};
use crate::{RcaStorage, StorageError};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: RcaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "concurrent",
        "locked_read_modify_write_serializes",
        locked_read_modify_write_serializes(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "check_then_promote_exactly_one_wins",
        check_then_promote_exactly_one_wins(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "different_records_all_succeed",
        different_records_all_succeed(factory).await,
    ));

    results
}

/// One locked increment: read the counter kept in `impact`, write it back
/// plus one, append an event.
async fn increment<S: RcaStorage>(s: &S, record_id: RecordId) -> Result<(), StorageError> {
    let mut snap = s.begin_snapshot().await?;
    let mut record = s.get_record_for_update(&mut snap, record_id).await?;
    let current: u64 = record
        .impact
        .as_deref()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    tokio::task::yield_now().await;
    record.impact = Some((current + 1).to_string());
    let event = make_event(&record);
    s.update_record(&mut snap, record).await?;
    s.append_audit_event(&mut snap, event).await?;
    s.commit_snapshot(snap).await
}

// ── Lost updates are impossible under the row lock ──────────────────────────

/// N tasks each perform a locked read-modify-write on the same record. With
/// a working row lock the counter ends at exactly N and every task's audit
/// event is present.
async fn locked_read_modify_write_serializes<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RcaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    let mut record = seed_record(storage.as_ref(), 1).await?;

    // Reset the counter.
    {
        let mut snap = storage
            .begin_snapshot()
            .await
            .map_err(|e| format!("begin: {e}"))?;
        record = storage
            .get_record_for_update(&mut snap, record.id)
            .await
            .map_err(|e| format!("lock: {e}"))?;
        record.impact = Some("0".to_string());
        storage
            .update_record(&mut snap, record.clone())
            .await
            .map_err(|e| format!("update: {e}"))?;
        storage
            .commit_snapshot(snap)
            .await
            .map_err(|e| format!("commit reset: {e}"))?;
    }

    let mut handles = Vec::new();
    for _ in 0..N {
        let s = storage.clone();
        let id = record.id;
        handles.push(tokio::spawn(async move { increment(s.as_ref(), id).await }));
    }
    for handle in handles {
        handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e| format!("storage error: {e}"))?;
    }

    let stored = storage
        .get_record(record.id)
        .await
        .map_err(|e| format!("get: {e}"))?;
    let expected = N.to_string();
    if stored.impact.as_deref() != Some(expected.as_str()) {
        return Err(format!(
            "expected counter {expected}, got {:?} (lost update)",
            stored.impact
        ));
    }
    let events = storage
        .list_audit_events(record.id)
        .await
        .map_err(|e| format!("events: {e}"))?;
    if events.len() != N {
        return Err(format!("expected {N} events, got {}", events.len()));
    }
    Ok(())
}

// ── Check-then-insert under the lock: exactly one wins ──────────────────────

/// N tasks race to promote the same candidate: lock, check for an existing
/// final, insert if absent. Exactly one must insert.
async fn check_then_promote_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RcaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    let record = seed_record(storage.as_ref(), 1).await?;
    let candidate = make_root_cause_candidate(record.id);

    let mut handles = Vec::new();
    for _ in 0..N {
        let s = storage.clone();
        let candidate = candidate.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            s.get_record_for_update(&mut snap, candidate.record_id)
                .await?;
            let children = s.children_for_update(&mut snap, candidate.record_id).await?;
            if children.final_for_candidate(candidate.id).is_some() {
                s.abort_snapshot(snap).await?;
                return Ok(false);
            }
            tokio::task::yield_now().await;
            s.put_root_cause_final(&mut snap, make_final(&candidate))
                .await?;
            s.commit_snapshot(snap).await?;
            Ok::<bool, StorageError>(true)
        }));
    }

    let mut winners = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e| format!("storage error: {e}"))?;
        if won {
            winners += 1;
        }
    }
    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }

    let children = storage
        .get_children(record.id)
        .await
        .map_err(|e| format!("children: {e}"))?;
    if children.root_cause_finals.len() != 1 {
        return Err(format!(
            "expected 1 final, got {}",
            children.root_cause_finals.len()
        ));
    }
    Ok(())
}

// ── Independent records: no false contention ────────────────────────────────

/// N tasks each update a different record. All succeed.
async fn different_records_all_succeed<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RcaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    let mut ids = Vec::new();
    for i in 0..N {
        ids.push(seed_record(storage.as_ref(), i as i64 + 1).await?.id);
    }

    let mut handles = Vec::new();
    for id in ids.iter().copied() {
        let s = storage.clone();
        handles.push(tokio::spawn(async move { increment(s.as_ref(), id).await }));
    }
    for (i, handle) in handles.into_iter().enumerate() {
        handle
            .await
            .map_err(|e| format!("task {i} panic: {e}"))?
            .map_err(|e| format!("task {i} failed: {e}"))?;
    }

    for id in ids {
        let events = storage
            .list_audit_events(id)
            .await
            .map_err(|e| format!("events: {e}"))?;
        if events.len() != 1 {
            return Err(format!("record {id}: expected 1 event, got {}", events.len()));
        }
    }
    Ok(())
}
