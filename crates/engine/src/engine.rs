use std::sync::Arc;

use rcaflow_model::{progress, AppUser, AuditEvent, CompletionProgress, Record, RecordId};
use rcaflow_storage::{RcaStorage, RecordChildren};
use serde::Serialize;

use crate::analysis::AnalysisClient;
use crate::clock::{Clock, SystemClock};
use crate::error::WorkflowError;
use crate::promotion::PromotionManager;
use crate::txn::read_live_record;
use crate::workflow::WorkflowController;

/// A record with everything hanging off it, as committed.
#[derive(Debug, Clone, Serialize)]
pub struct RecordView {
    pub record: Record,
    #[serde(flatten)]
    pub children: RecordChildren,
    pub completion: CompletionProgress,
}

/// One storage backend, one analysis client, one clock; the two mutating
/// components and the read-only views share them.
pub struct Engine<S: RcaStorage> {
    storage: Arc<S>,
    workflow: WorkflowController<S>,
    promotion: PromotionManager<S>,
}

impl<S: RcaStorage> Clone for Engine<S> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            workflow: self.workflow.clone(),
            promotion: self.promotion.clone(),
        }
    }
}

impl<S: RcaStorage> Engine<S> {
    pub fn new(storage: Arc<S>, analysis: Arc<dyn AnalysisClient>) -> Self {
        Self::with_clock(storage, analysis, Arc::new(SystemClock))
    }

    pub fn with_clock(
        storage: Arc<S>,
        analysis: Arc<dyn AnalysisClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            workflow: WorkflowController::new(storage.clone(), analysis, clock.clone()),
            promotion: PromotionManager::new(storage.clone(), clock),
            storage,
        }
    }

    pub fn workflow(&self) -> &WorkflowController<S> {
        &self.workflow
    }

    pub fn promotion(&self) -> &PromotionManager<S> {
        &self.promotion
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    // ── Read-only views ───────────────────────────────────────────────────────
    //
    // Reads take no locks and see committed state only. Any actor may read.

    pub async fn record_view(&self, record_id: RecordId) -> Result<RecordView, WorkflowError> {
        let record = read_live_record(self.storage.as_ref(), record_id).await?;
        let children = self.storage.get_children(record_id).await?;
        let completion = progress(&children.action_items);
        Ok(RecordView {
            record,
            children,
            completion,
        })
    }

    /// Live records in display-number order.
    pub async fn list_records(&self) -> Result<Vec<Record>, WorkflowError> {
        let mut records = self.storage.list_records().await?;
        records.retain(|r| !r.is_deleted());
        Ok(records)
    }

    /// The record's ledger in append order.
    pub async fn audit_trail(&self, record_id: RecordId) -> Result<Vec<AuditEvent>, WorkflowError> {
        read_live_record(self.storage.as_ref(), record_id).await?;
        Ok(self.storage.list_audit_events(record_id).await?)
    }

    pub async fn list_users(&self) -> Result<Vec<AppUser>, WorkflowError> {
        Ok(self.storage.list_users().await?)
    }
}
