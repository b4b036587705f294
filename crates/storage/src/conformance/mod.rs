//! Conformance test suite for `RcaStorage` implementations.
//!
//! This module provides a backend-agnostic test suite that any `RcaStorage`
//! implementation can run to verify correctness. The suite covers:
//!
//! - **Snapshot isolation**: uncommitted writes invisible, own writes visible
//! - **Atomic commit**: record, child rows and audit events land together
//! - **Lock discipline**: writes without the record lock are rejected
//! - **Unique candidate reference**: at most one final per candidate
//! - **Error handling**: correct error variants for missing rows
//! - **Concurrency**: row locks serialize racing snapshots
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty storage instance for each test:
//!
//! ```ignore
//! use rcaflow_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn postgres_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         create_test_postgres_storage().await
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod commit;
mod concurrent;
mod error;
mod lock;
mod snapshot;
mod unique;

use std::fmt;
use std::future::Future;

use rcaflow_model::{
    ActionItem, ActionItemCandidate, ActionItemCandidateId, AuditEvent, AuditEventId,
    AuditPayload, Confidence, FollowupQuestion, Priority, Record, RecordId, RecordIntake,
    RootCauseCandidate, RootCauseCandidateId, RootCauseFinal, UserId,
};
use time::OffsetDateTime;

use crate::RcaStorage;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "snapshot", "commit", "lock").
    pub category: String,
    /// Test name (e.g. "uncommitted_record_invisible").
    pub name: String,
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn pass(category: &str, name: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    fn fail(category: &str, name: &str, msg: String) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: false,
            message: Some(msg),
        }
    }

    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::pass(category, name),
            Err(msg) => Self::fail(category, name, msg),
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl ConformanceReport {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// storage instance, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: RcaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(error::run_error_tests(&factory).await);
    results.extend(snapshot::run_snapshot_tests(&factory).await);
    results.extend(commit::run_commit_tests(&factory).await);
    results.extend(lock::run_lock_tests(&factory).await);
    results.extend(unique::run_unique_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers: row constructors with sensible defaults ─────────────────────────

fn make_record(display_number: i64) -> Record {
    let intake = RecordIntake {
        title: format!("Failure {display_number}"),
        failure_description: "Unit tripped during load test".to_string(),
        impact: Some("Line down 40 minutes".to_string()),
        supporting_notes: None,
    };
    Record::new_draft(display_number, UserId::new(), intake, OffsetDateTime::now_utc())
}

fn make_question(record_id: RecordId, text: &str) -> FollowupQuestion {
    FollowupQuestion::new(record_id, text.to_string(), OffsetDateTime::now_utc())
}

fn make_root_cause_candidate(record_id: RecordId) -> RootCauseCandidate {
    RootCauseCandidate {
        id: RootCauseCandidateId::new(),
        record_id,
        cause_text: "Fouled heat exchanger".to_string(),
        confidence: Confidence::Medium,
        generated_at: OffsetDateTime::now_utc(),
    }
}

fn make_action_item_candidate(record_id: RecordId) -> ActionItemCandidate {
    ActionItemCandidate {
        id: ActionItemCandidateId::new(),
        record_id,
        action_text: "Schedule exchanger cleaning".to_string(),
        priority: Priority::High,
        timeframe: Some("1 week".to_string()),
        success_criteria: None,
        generated_at: OffsetDateTime::now_utc(),
    }
}

fn make_final(candidate: &RootCauseCandidate) -> RootCauseFinal {
    RootCauseFinal::promoted_from(candidate, UserId::new(), OffsetDateTime::now_utc())
}

fn make_action_item(candidate: &ActionItemCandidate) -> ActionItem {
    ActionItem::promoted_from(candidate, UserId::new(), OffsetDateTime::now_utc())
}

fn make_event(record: &Record) -> AuditEvent {
    AuditEvent {
        id: AuditEventId::new(),
        record_id: record.id,
        actor_user_id: record.owner_user_id,
        created_at: OffsetDateTime::now_utc(),
        payload: AuditPayload::RecordCreated {
            display_number: record.display_number,
            title: record.title.clone(),
        },
    }
}

/// Insert and commit a record, returning it.
async fn seed_record<S: RcaStorage>(storage: &S, display_number: i64) -> Result<Record, String> {
    let record = make_record(display_number);
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .insert_record(&mut snap, record.clone())
        .await
        .map_err(|e| format!("insert: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit seed: {e}"))?;
    Ok(record)
}
