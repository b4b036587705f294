use rcaflow_storage::conformance::run_conformance_suite;
use rcaflow_storage::MemoryStorage;

#[tokio::test]
async fn memory_backend_passes_conformance() {
    let report = run_conformance_suite(|| async { MemoryStorage::new() }).await;
    assert!(report.total > 0);
    assert!(report.failed == 0, "{report}");
}
