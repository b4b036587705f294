//! In-memory reference backend.
//!
//! Committed state lives behind a single `RwLock` that is never held across
//! an await. Row locks are per-record `tokio::sync::Mutex`es; a snapshot
//! keeps the owned guards until it commits, aborts, or is dropped.
//!
//! Writes are staged in the snapshot as working copies of each touched
//! record and its child rows. Because a working copy can only be created
//! while holding the record's lock, commit can replace the committed rows
//! wholesale without merging.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use rcaflow_model::{
    ActionItem, ActionItemCandidate, ActionItemId, AppUser, AuditEvent, FollowupQuestion, Record,
    RecordId, RootCauseCandidate, RootCauseFinal, RootCauseFinalId, UserId,
};
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

use crate::children::{ChildRef, RecordChildren};
use crate::error::StorageError;
use crate::traits::RcaStorage;

#[derive(Default)]
struct Tables {
    records: HashMap<RecordId, Record>,
    children: HashMap<RecordId, RecordChildren>,
    audit: HashMap<RecordId, Vec<AuditEvent>>,
    users: HashMap<UserId, AppUser>,
}

#[derive(Default)]
pub struct MemoryStorage {
    tables: RwLock<Tables>,
    row_locks: Mutex<HashMap<RecordId, Arc<RowLock<()>>>>,
    sequence: AtomicI64,
}

/// An open in-memory transaction.
#[derive(Default)]
pub struct MemorySnapshot {
    locks: HashMap<RecordId, OwnedMutexGuard<()>>,
    records: HashMap<RecordId, Record>,
    children: HashMap<RecordId, RecordChildren>,
    audit: Vec<AuditEvent>,
}

impl MemorySnapshot {
    pub fn holds_lock(&self, record_id: RecordId) -> bool {
        self.locks.contains_key(&record_id)
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-populated with a user directory.
    pub fn with_users(users: impl IntoIterator<Item = AppUser>) -> Self {
        let storage = Self::new();
        if let Ok(mut tables) = storage.tables.write() {
            tables
                .users
                .extend(users.into_iter().map(|user| (user.id, user)));
        }
        storage
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StorageError> {
        self.tables
            .read()
            .map_err(|_| StorageError::Backend("memory tables poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StorageError> {
        self.tables
            .write()
            .map_err(|_| StorageError::Backend("memory tables poisoned".to_string()))
    }

    fn row_lock(&self, id: RecordId) -> Result<Arc<RowLock<()>>, StorageError> {
        let mut locks = self
            .row_locks
            .lock()
            .map_err(|_| StorageError::Backend("row lock table poisoned".to_string()))?;
        Ok(locks
            .entry(id)
            .or_insert_with(|| Arc::new(RowLock::new(())))
            .clone())
    }

    async fn acquire(&self, snapshot: &mut MemorySnapshot, id: RecordId) -> Result<(), StorageError> {
        if snapshot.holds_lock(id) {
            return Ok(());
        }
        let row = self.row_lock(id)?;
        debug!(record_id = %id, "waiting for row lock");
        let guard = row.lock_owned().await;
        debug!(record_id = %id, "row lock acquired");
        snapshot.locks.insert(id, guard);
        Ok(())
    }

    /// The snapshot's working copy of a locked record's children, seeded
    /// from committed state on first touch.
    fn staged_children<'a>(
        &self,
        snapshot: &'a mut MemorySnapshot,
        record_id: RecordId,
    ) -> Result<&'a mut RecordChildren, StorageError> {
        require_lock(snapshot, record_id)?;
        match snapshot.children.entry(record_id) {
            Entry::Occupied(slot) => Ok(slot.into_mut()),
            Entry::Vacant(slot) => {
                let committed = self
                    .read()?
                    .children
                    .get(&record_id)
                    .cloned()
                    .unwrap_or_default();
                Ok(slot.insert(committed))
            }
        }
    }
}

fn require_lock(snapshot: &MemorySnapshot, record_id: RecordId) -> Result<(), StorageError> {
    if snapshot.holds_lock(record_id) {
        Ok(())
    } else {
        Err(StorageError::LockNotHeld(record_id))
    }
}

fn candidate_references(children: &RecordChildren) -> impl Iterator<Item = Uuid> + '_ {
    let finals = children
        .root_cause_finals
        .iter()
        .filter_map(|f| f.selected_from_candidate_id.map(|id| id.0));
    let items = children
        .action_items
        .iter()
        .filter_map(|i| i.selected_from_candidate_id.map(|id| id.0));
    finals.chain(items)
}

/// Uniqueness of `selected_from_candidate_id` across the state that would
/// result from applying `staged`.
fn check_candidate_references(
    tables: &Tables,
    staged: &HashMap<RecordId, RecordChildren>,
) -> Result<(), StorageError> {
    let untouched = tables
        .children
        .iter()
        .filter(|(id, _)| !staged.contains_key(id))
        .map(|(_, children)| children);
    let mut seen = HashSet::new();
    for children in untouched.chain(staged.values()) {
        for candidate_id in candidate_references(children) {
            if !seen.insert(candidate_id) {
                return Err(StorageError::DuplicateCandidateReference { candidate_id });
            }
        }
    }
    Ok(())
}

#[async_trait]
impl RcaStorage for MemoryStorage {
    type Snapshot = MemorySnapshot;

    async fn begin_snapshot(&self) -> Result<MemorySnapshot, StorageError> {
        Ok(MemorySnapshot::default())
    }

    async fn commit_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        let MemorySnapshot {
            locks,
            records,
            children,
            audit,
        } = snapshot;
        {
            let mut tables = self.write()?;
            check_candidate_references(&tables, &children)?;
            tables.records.extend(records);
            tables.children.extend(children);
            for event in audit {
                tables.audit.entry(event.record_id).or_default().push(event);
            }
        }
        // Locks go last so a waiter never observes a half-applied commit.
        drop(locks);
        Ok(())
    }

    async fn abort_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        drop(snapshot);
        Ok(())
    }

    async fn next_display_number(&self, _snapshot: &mut MemorySnapshot) -> Result<i64, StorageError> {
        Ok(self.sequence.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn insert_record(
        &self,
        snapshot: &mut MemorySnapshot,
        record: Record,
    ) -> Result<(), StorageError> {
        self.acquire(snapshot, record.id).await?;
        snapshot.records.insert(record.id, record);
        Ok(())
    }

    async fn get_record_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        id: RecordId,
    ) -> Result<Record, StorageError> {
        if let Some(staged) = snapshot.records.get(&id) {
            return Ok(staged.clone());
        }
        let exists = self.read()?.records.contains_key(&id);
        if !exists {
            return Err(StorageError::RecordNotFound(id));
        }
        self.acquire(snapshot, id).await?;
        let record = self.read()?.records.get(&id).cloned();
        record.ok_or(StorageError::RecordNotFound(id))
    }

    async fn update_record(
        &self,
        snapshot: &mut MemorySnapshot,
        record: Record,
    ) -> Result<(), StorageError> {
        require_lock(snapshot, record.id)?;
        snapshot.records.insert(record.id, record);
        Ok(())
    }

    async fn children_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        record_id: RecordId,
    ) -> Result<RecordChildren, StorageError> {
        Ok(self.staged_children(snapshot, record_id)?.clone())
    }

    async fn audit_events_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        record_id: RecordId,
    ) -> Result<Vec<AuditEvent>, StorageError> {
        require_lock(snapshot, record_id)?;
        let mut events = self
            .read()?
            .audit
            .get(&record_id)
            .cloned()
            .unwrap_or_default();
        events.extend(
            snapshot
                .audit
                .iter()
                .filter(|e| e.record_id == record_id)
                .cloned(),
        );
        Ok(events)
    }

    async fn put_question(
        &self,
        snapshot: &mut MemorySnapshot,
        question: FollowupQuestion,
    ) -> Result<(), StorageError> {
        self.staged_children(snapshot, question.record_id)?
            .put_question(question);
        Ok(())
    }

    async fn put_root_cause_candidate(
        &self,
        snapshot: &mut MemorySnapshot,
        candidate: RootCauseCandidate,
    ) -> Result<(), StorageError> {
        self.staged_children(snapshot, candidate.record_id)?
            .put_root_cause_candidate(candidate);
        Ok(())
    }

    async fn put_action_item_candidate(
        &self,
        snapshot: &mut MemorySnapshot,
        candidate: ActionItemCandidate,
    ) -> Result<(), StorageError> {
        self.staged_children(snapshot, candidate.record_id)?
            .put_action_item_candidate(candidate);
        Ok(())
    }

    async fn put_root_cause_final(
        &self,
        snapshot: &mut MemorySnapshot,
        row: RootCauseFinal,
    ) -> Result<(), StorageError> {
        self.staged_children(snapshot, row.record_id)?
            .put_root_cause_final(row);
        Ok(())
    }

    async fn delete_root_cause_final(
        &self,
        snapshot: &mut MemorySnapshot,
        record_id: RecordId,
        id: RootCauseFinalId,
    ) -> Result<(), StorageError> {
        if self
            .staged_children(snapshot, record_id)?
            .remove_root_cause_final(id)
        {
            Ok(())
        } else {
            Err(StorageError::ChildNotFound(ChildRef::RootCauseFinal(id)))
        }
    }

    async fn put_action_item(
        &self,
        snapshot: &mut MemorySnapshot,
        item: ActionItem,
    ) -> Result<(), StorageError> {
        self.staged_children(snapshot, item.record_id)?
            .put_action_item(item);
        Ok(())
    }

    async fn delete_action_item(
        &self,
        snapshot: &mut MemorySnapshot,
        record_id: RecordId,
        id: ActionItemId,
    ) -> Result<(), StorageError> {
        if self
            .staged_children(snapshot, record_id)?
            .remove_action_item(id)
        {
            Ok(())
        } else {
            Err(StorageError::ChildNotFound(ChildRef::ActionItem(id)))
        }
    }

    async fn append_audit_event(
        &self,
        snapshot: &mut MemorySnapshot,
        event: AuditEvent,
    ) -> Result<(), StorageError> {
        require_lock(snapshot, event.record_id)?;
        snapshot.audit.push(event);
        Ok(())
    }

    async fn get_record(&self, id: RecordId) -> Result<Record, StorageError> {
        self.read()?
            .records
            .get(&id)
            .cloned()
            .ok_or(StorageError::RecordNotFound(id))
    }

    async fn list_records(&self) -> Result<Vec<Record>, StorageError> {
        let mut records: Vec<Record> = self.read()?.records.values().cloned().collect();
        records.sort_by_key(|r| r.display_number);
        Ok(records)
    }

    async fn get_children(&self, record_id: RecordId) -> Result<RecordChildren, StorageError> {
        let tables = self.read()?;
        if !tables.records.contains_key(&record_id) {
            return Err(StorageError::RecordNotFound(record_id));
        }
        Ok(tables.children.get(&record_id).cloned().unwrap_or_default())
    }

    async fn list_audit_events(&self, record_id: RecordId) -> Result<Vec<AuditEvent>, StorageError> {
        Ok(self
            .read()?
            .audit
            .get(&record_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn owner_of(&self, child: ChildRef) -> Result<RecordId, StorageError> {
        self.read()?
            .children
            .iter()
            .find(|(_, children)| children.contains(child))
            .map(|(record_id, _)| *record_id)
            .ok_or(StorageError::ChildNotFound(child))
    }

    async fn get_user(&self, id: UserId) -> Result<AppUser, StorageError> {
        self.read()?
            .users
            .get(&id)
            .cloned()
            .ok_or(StorageError::UserNotFound(id))
    }

    async fn list_users(&self) -> Result<Vec<AppUser>, StorageError> {
        let mut users: Vec<AppUser> = self.read()?.users.values().cloned().collect();
        users.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(users)
    }

    async fn put_user(&self, user: AppUser) -> Result<(), StorageError> {
        self.write()?.users.insert(user.id, user);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use rcaflow_model::RecordIntake;
    use time::OffsetDateTime;

    fn draft(owner: UserId) -> Record {
        let intake = RecordIntake {
            title: "Compressor trip".to_string(),
            failure_description: "Tripped on high discharge temperature".to_string(),
            impact: None,
            supporting_notes: None,
        };
        Record::new_draft(1, owner, intake, OffsetDateTime::now_utc())
    }

    async fn committed_record(storage: &MemoryStorage) -> Record {
        let record = draft(UserId::new());
        let mut snap = storage.begin_snapshot().await.unwrap();
        storage.insert_record(&mut snap, record.clone()).await.unwrap();
        storage.commit_snapshot(snap).await.unwrap();
        record
    }

    #[tokio::test]
    async fn second_locker_waits_for_commit() {
        let storage = Arc::new(MemoryStorage::new());
        let record = committed_record(&storage).await;

        let mut first = storage.begin_snapshot().await.unwrap();
        let mut locked = storage
            .get_record_for_update(&mut first, record.id)
            .await
            .unwrap();

        let waiter = {
            let storage = storage.clone();
            tokio::spawn(async move {
                let mut second = storage.begin_snapshot().await.unwrap();
                let seen = storage
                    .get_record_for_update(&mut second, record.id)
                    .await
                    .unwrap();
                storage.abort_snapshot(second).await.unwrap();
                seen.title
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        locked.title = "Compressor trip (revised)".to_string();
        storage.update_record(&mut first, locked).await.unwrap();
        storage.commit_snapshot(first).await.unwrap();

        assert_eq!(waiter.await.unwrap(), "Compressor trip (revised)");
    }

    #[tokio::test]
    async fn dropped_snapshot_releases_lock_and_discards_writes() {
        let storage = MemoryStorage::new();
        let record = committed_record(&storage).await;

        {
            let mut snap = storage.begin_snapshot().await.unwrap();
            let mut locked = storage
                .get_record_for_update(&mut snap, record.id)
                .await
                .unwrap();
            locked.title = "never committed".to_string();
            storage.update_record(&mut snap, locked).await.unwrap();
        }

        let mut snap = storage.begin_snapshot().await.unwrap();
        let fresh = tokio::time::timeout(
            Duration::from_secs(1),
            storage.get_record_for_update(&mut snap, record.id),
        )
        .await
        .expect("lock should be free after drop")
        .unwrap();
        assert_eq!(fresh.title, record.title);
    }

    #[tokio::test]
    async fn display_numbers_skip_after_abort() {
        let storage = MemoryStorage::new();
        let mut snap = storage.begin_snapshot().await.unwrap();
        assert_eq!(storage.next_display_number(&mut snap).await.unwrap(), 1);
        storage.abort_snapshot(snap).await.unwrap();

        let mut snap = storage.begin_snapshot().await.unwrap();
        assert_eq!(storage.next_display_number(&mut snap).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn seeded_users_are_listed_by_name() {
        let storage = MemoryStorage::with_users([
            AppUser {
                id: UserId::new(),
                display_name: "Zoe".to_string(),
                role: rcaflow_model::Role::User,
                status: rcaflow_model::UserStatus::Active,
            },
            AppUser {
                id: UserId::new(),
                display_name: "Ana".to_string(),
                role: rcaflow_model::Role::Admin,
                status: rcaflow_model::UserStatus::Active,
            },
        ]);
        let names: Vec<String> = storage
            .list_users()
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.display_name)
            .collect();
        assert_eq!(names, vec!["Ana", "Zoe"]);
    }
}
