//! Completion gate.
//!
//! A record may only close once every action item is resolved (done or
//! canceled). An empty list is never complete: a record with no corrective
//! work has not finished its investigation.

use serde::Serialize;

use crate::finding::ActionItem;
use crate::ids::ActionItemId;

/// True iff there is at least one item and every item is resolved.
pub fn all_complete(items: &[ActionItem]) -> bool {
    !items.is_empty() && items.iter().all(|item| item.status.is_resolved())
}

/// Progress summary for read-only views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionProgress {
    pub total: usize,
    pub resolved: usize,
    pub unresolved: Vec<ActionItemId>,
}

impl CompletionProgress {
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.unresolved.is_empty()
    }
}

pub fn progress(items: &[ActionItem]) -> CompletionProgress {
    let unresolved: Vec<ActionItemId> = items
        .iter()
        .filter(|item| !item.status.is_resolved())
        .map(|item| item.id)
        .collect();
    CompletionProgress {
        total: items.len(),
        resolved: items.len() - unresolved.len(),
        unresolved,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finding::ActionItemStatus;
    use crate::ids::{RecordId, UserId};
    use proptest::prelude::*;
    use time::OffsetDateTime;

    fn item(status: ActionItemStatus) -> ActionItem {
        let now = OffsetDateTime::now_utc();
        ActionItem {
            id: ActionItemId::new(),
            record_id: RecordId::new(),
            action_text: "Inspect coupling".to_string(),
            status,
            priority: None,
            owner_user_id: None,
            due_date: None,
            success_criteria: None,
            completion_notes: None,
            work_completed_date: None,
            selected_from_candidate_id: None,
            created_by_user_id: UserId::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn any_status() -> impl Strategy<Value = ActionItemStatus> {
        prop_oneof![
            Just(ActionItemStatus::Open),
            Just(ActionItemStatus::InProgress),
            Just(ActionItemStatus::Blocked),
            Just(ActionItemStatus::Done),
            Just(ActionItemStatus::Canceled),
        ]
    }

    #[test]
    fn empty_list_is_not_complete() {
        assert!(!all_complete(&[]));
        assert!(!progress(&[]).is_complete());
    }

    #[test]
    fn done_and_canceled_mix_is_complete() {
        let items = vec![item(ActionItemStatus::Done), item(ActionItemStatus::Canceled)];
        assert!(all_complete(&items));
    }

    #[test]
    fn single_blocked_item_holds_the_gate() {
        let items = vec![item(ActionItemStatus::Done), item(ActionItemStatus::Blocked)];
        assert!(!all_complete(&items));
        let p = progress(&items);
        assert_eq!(p.total, 2);
        assert_eq!(p.resolved, 1);
        assert_eq!(p.unresolved, vec![items[1].id]);
    }

    proptest! {
        #[test]
        fn gate_matches_definition(statuses in proptest::collection::vec(any_status(), 1..12)) {
            let items: Vec<ActionItem> = statuses.iter().copied().map(item).collect();
            let expected = statuses.iter().all(|s| s.is_resolved());
            prop_assert_eq!(all_complete(&items), expected);
            prop_assert_eq!(progress(&items).is_complete(), expected);
        }
    }
}
