//! Shared fixtures for engine integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rcaflow_engine::analysis::{
    AnalysisClient, AnalysisError, AnalysisRequest, AnalysisResponse, SuggestedActionItem,
    SuggestedRootCause,
};
use rcaflow_engine::{ActionItemDraft, Clock, Engine, FinalDraft};
use rcaflow_model::{
    ActionItem, Actor, AppUser, AuditEventType, Confidence, Priority, Record, RecordId,
    RecordIntake, Role, RootCauseFinal, UserId, UserStatus,
};
use rcaflow_storage::{MemoryStorage, RcaStorage};
use time::macros::{date, datetime};
use time::{Duration, OffsetDateTime};
use tokio::sync::Notify;

/// Advances one second per reading so every timestamp is distinct.
pub struct SteppingClock {
    next: Mutex<OffsetDateTime>,
}

impl SteppingClock {
    pub fn new() -> Self {
        Self {
            next: Mutex::new(datetime!(2026-03-02 08:00 UTC)),
        }
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> OffsetDateTime {
        let mut next = self.next.lock().unwrap();
        let now = *next;
        *next = now + Duration::seconds(1);
        now
    }
}

/// Holds one analysis call open until the test releases it.
#[derive(Default)]
pub struct Gate {
    /// Signalled once the call has its request and is waiting.
    pub entered: Notify,
    pub release: Notify,
}

/// Replays queued replies in order and records every request it saw.
#[derive(Default)]
pub struct ScriptedAnalysis {
    replies: Mutex<VecDeque<Result<AnalysisResponse, AnalysisError>>>,
    requests: Mutex<Vec<AnalysisRequest>>,
    gate: Mutex<Option<Arc<Gate>>>,
}

impl ScriptedAnalysis {
    /// Make the next call block on the returned gate.
    pub fn hold_next(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn push(&self, reply: Result<AnalysisResponse, AnalysisError>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn requests(&self) -> Vec<AnalysisRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnalysisClient for ScriptedAnalysis {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResponse, AnalysisError> {
        self.requests.lock().unwrap().push(request.clone());
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AnalysisError::Unavailable("no scripted reply".to_string())))
    }
}

/// Two root causes, one action item, two questions.
pub fn suggestion() -> AnalysisResponse {
    AnalysisResponse {
        root_causes: vec![
            SuggestedRootCause {
                cause_text: "Bearing lubrication interval exceeded".to_string(),
                confidence: Confidence::High,
            },
            SuggestedRootCause {
                cause_text: "Shaft misalignment after motor swap".to_string(),
                confidence: Confidence::Medium,
            },
        ],
        action_items: vec![SuggestedActionItem {
            action_text: "Add bearing to weekly lubrication route".to_string(),
            priority: Priority::High,
            timeframe: Some("1 week".to_string()),
            success_criteria: Some("No bearing temperature alarms for 60 days".to_string()),
        }],
        questions: vec![
            "When was the bearing last greased?".to_string(),
            "Was a laser alignment done after the motor swap?".to_string(),
        ],
        material_change: true,
    }
}

fn user(name: &str, role: Role, status: UserStatus) -> AppUser {
    AppUser {
        id: UserId::new(),
        display_name: name.to_string(),
        role,
        status,
    }
}

pub struct Harness {
    pub engine: Engine<MemoryStorage>,
    pub storage: Arc<MemoryStorage>,
    pub analysis: Arc<ScriptedAnalysis>,
    pub owner: Actor,
    pub admin: Actor,
    pub other: Actor,
    pub pending: AppUser,
}

pub fn harness() -> Harness {
    let owner = user("Priya Natarajan", Role::User, UserStatus::Active);
    let admin = user("Morgan Lee", Role::Admin, UserStatus::Active);
    let other = user("Sam Okafor", Role::User, UserStatus::Active);
    let pending = user("Jordan Vale", Role::User, UserStatus::PendingApproval);

    let storage = Arc::new(MemoryStorage::with_users([
        owner.clone(),
        admin.clone(),
        other.clone(),
        pending.clone(),
    ]));
    let analysis = Arc::new(ScriptedAnalysis::default());
    let engine = Engine::with_clock(
        storage.clone(),
        analysis.clone(),
        Arc::new(SteppingClock::new()),
    );

    Harness {
        engine,
        storage,
        analysis,
        owner: Actor::new(owner.id, owner.role),
        admin: Actor::new(admin.id, admin.role),
        other: Actor::new(other.id, other.role),
        pending,
    }
}

impl Harness {
    pub async fn draft(&self) -> Record {
        let intake = RecordIntake {
            title: "Pump P-101 bearing seizure".to_string(),
            failure_description: "Drive-end bearing seized during second shift".to_string(),
            impact: Some("Line 2 down for 6 hours".to_string()),
            supporting_notes: None,
        };
        self.engine
            .workflow()
            .create_record(&self.owner, intake)
            .await
            .unwrap()
    }

    pub async fn investigating(&self) -> Record {
        let record = self.draft().await;
        self.engine
            .workflow()
            .start_investigation(record.id, &self.owner)
            .await
            .unwrap()
    }

    /// An action item with every field finalize requires.
    pub async fn complete_item(&self, record_id: RecordId) -> ActionItem {
        self.engine
            .promotion()
            .create_action_item(
                record_id,
                &self.owner,
                ActionItemDraft {
                    action_text: "Install bearing temperature sensor".to_string(),
                    priority: Some(Priority::Medium),
                    owner_user_id: Some(self.other.id),
                    due_date: Some(date!(2026-04-15)),
                    success_criteria: None,
                },
            )
            .await
            .unwrap()
    }

    pub async fn root_cause(&self, record_id: RecordId) -> RootCauseFinal {
        self.engine
            .promotion()
            .create_final(
                record_id,
                &self.owner,
                FinalDraft {
                    cause_text: "Grease line blocked".to_string(),
                    evidence: Some("Dry grease fitting found on teardown".to_string()),
                    confidence: Some(Confidence::High),
                },
            )
            .await
            .unwrap()
    }

    /// A finalized record with one root cause and one complete open item.
    pub async fn actions_open(&self) -> (Record, ActionItem) {
        let record = self.investigating().await;
        self.root_cause(record.id).await;
        let item = self.complete_item(record.id).await;
        let record = self
            .engine
            .workflow()
            .finalize(record.id, &self.owner)
            .await
            .unwrap();
        (record, item)
    }

    pub async fn event_types(&self, record_id: RecordId) -> Vec<AuditEventType> {
        self.storage
            .list_audit_events(record_id)
            .await
            .unwrap()
            .iter()
            .map(|e| e.event_type())
            .collect()
    }

    pub async fn event_count(&self, record_id: RecordId) -> usize {
        self.storage.list_audit_events(record_id).await.unwrap().len()
    }
}
