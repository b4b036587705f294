use std::future::Future;

use rcaflow_model::{ActionItemId, RecordId, RootCauseCandidateId, RootCauseFinalId, UserId};

use super::{seed_record, TestResult};
use crate::{ChildRef, RcaStorage, StorageError};

pub(super) async fn run_error_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: RcaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "error",
        "get_record_nonexistent",
        get_record_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "get_record_for_update_nonexistent",
        get_record_for_update_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "get_children_nonexistent",
        get_children_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "owner_of_nonexistent_child",
        owner_of_nonexistent_child(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "get_user_nonexistent",
        get_user_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "delete_nonexistent_final",
        delete_nonexistent_final(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "delete_nonexistent_action_item",
        delete_nonexistent_action_item(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "list_audit_events_empty_for_nonexistent",
        list_audit_events_empty_for_nonexistent(factory).await,
    ));

    results
}

async fn get_record_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RcaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let id = RecordId::new();
    match s.get_record(id).await {
        Err(StorageError::RecordNotFound(missing)) if missing == id => Ok(()),
        other => Err(format!("expected RecordNotFound({id}), got {:?}", other)),
    }
}

async fn get_record_for_update_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RcaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    let result = s.get_record_for_update(&mut snap, RecordId::new()).await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(StorageError::RecordNotFound(_)) => Ok(()),
        other => Err(format!("expected RecordNotFound, got {:?}", other)),
    }
}

async fn get_children_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RcaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get_children(RecordId::new()).await {
        Err(StorageError::RecordNotFound(_)) => Ok(()),
        other => Err(format!("expected RecordNotFound, got {:?}", other)),
    }
}

async fn owner_of_nonexistent_child<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RcaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_record(&s, 1).await?;
    let child = ChildRef::RootCauseCandidate(RootCauseCandidateId::new());
    match s.owner_of(child).await {
        Err(StorageError::ChildNotFound(missing)) if missing == child => Ok(()),
        other => Err(format!("expected ChildNotFound({child}), got {:?}", other)),
    }
}

async fn get_user_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RcaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get_user(UserId::new()).await {
        Err(StorageError::UserNotFound(_)) => Ok(()),
        other => Err(format!("expected UserNotFound, got {:?}", other)),
    }
}

async fn delete_nonexistent_final<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let result = s
        .delete_root_cause_final(&mut snap, record.id, RootCauseFinalId::new())
        .await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(StorageError::ChildNotFound(ChildRef::RootCauseFinal(_))) => Ok(()),
        other => Err(format!("expected ChildNotFound, got {:?}", other)),
    }
}

async fn delete_nonexistent_action_item<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let result = s
        .delete_action_item(&mut snap, record.id, ActionItemId::new())
        .await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(StorageError::ChildNotFound(ChildRef::ActionItem(_))) => Ok(()),
        other => Err(format!("expected ChildNotFound, got {:?}", other)),
    }
}

async fn list_audit_events_empty_for_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RcaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let events = s
        .list_audit_events(RecordId::new())
        .await
        .map_err(|e| format!("list: {e}"))?;
    if events.is_empty() {
        Ok(())
    } else {
        Err(format!("expected no events, got {}", events.len()))
    }
}
