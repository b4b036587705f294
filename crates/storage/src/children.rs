use std::fmt;

use rcaflow_model::{
    ActionItem, ActionItemCandidate, ActionItemCandidateId, ActionItemId, FollowupQuestion,
    QuestionId, RootCauseCandidate, RootCauseCandidateId, RootCauseFinal, RootCauseFinalId,
};
use serde::Serialize;

/// Identifies a row that belongs to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChildRef {
    Question(QuestionId),
    RootCauseCandidate(RootCauseCandidateId),
    ActionItemCandidate(ActionItemCandidateId),
    RootCauseFinal(RootCauseFinalId),
    ActionItem(ActionItemId),
}

impl fmt::Display for ChildRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChildRef::Question(id) => write!(f, "question {id}"),
            ChildRef::RootCauseCandidate(id) => write!(f, "root cause candidate {id}"),
            ChildRef::ActionItemCandidate(id) => write!(f, "action item candidate {id}"),
            ChildRef::RootCauseFinal(id) => write!(f, "root cause final {id}"),
            ChildRef::ActionItem(id) => write!(f, "action item {id}"),
        }
    }
}

/// Every child row of one record, each list in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordChildren {
    pub questions: Vec<FollowupQuestion>,
    pub root_cause_candidates: Vec<RootCauseCandidate>,
    pub action_item_candidates: Vec<ActionItemCandidate>,
    pub root_cause_finals: Vec<RootCauseFinal>,
    pub action_items: Vec<ActionItem>,
}

impl RecordChildren {
    pub fn question(&self, id: QuestionId) -> Option<&FollowupQuestion> {
        self.questions.iter().find(|q| q.id == id)
    }

    pub fn root_cause_candidate(&self, id: RootCauseCandidateId) -> Option<&RootCauseCandidate> {
        self.root_cause_candidates.iter().find(|c| c.id == id)
    }

    pub fn action_item_candidate(&self, id: ActionItemCandidateId) -> Option<&ActionItemCandidate> {
        self.action_item_candidates.iter().find(|c| c.id == id)
    }

    pub fn root_cause_final(&self, id: RootCauseFinalId) -> Option<&RootCauseFinal> {
        self.root_cause_finals.iter().find(|f| f.id == id)
    }

    pub fn action_item(&self, id: ActionItemId) -> Option<&ActionItem> {
        self.action_items.iter().find(|i| i.id == id)
    }

    /// The final promoted from `candidate`, if any.
    pub fn final_for_candidate(&self, candidate: RootCauseCandidateId) -> Option<&RootCauseFinal> {
        self.root_cause_finals
            .iter()
            .find(|f| f.selected_from_candidate_id == Some(candidate))
    }

    /// The action item promoted from `candidate`, if any.
    pub fn item_for_candidate(&self, candidate: ActionItemCandidateId) -> Option<&ActionItem> {
        self.action_items
            .iter()
            .find(|i| i.selected_from_candidate_id == Some(candidate))
    }

    pub fn contains(&self, child: ChildRef) -> bool {
        match child {
            ChildRef::Question(id) => self.question(id).is_some(),
            ChildRef::RootCauseCandidate(id) => self.root_cause_candidate(id).is_some(),
            ChildRef::ActionItemCandidate(id) => self.action_item_candidate(id).is_some(),
            ChildRef::RootCauseFinal(id) => self.root_cause_final(id).is_some(),
            ChildRef::ActionItem(id) => self.action_item(id).is_some(),
        }
    }

    // Upserts keep insertion order: replace in place, append when new.

    pub(crate) fn put_question(&mut self, row: FollowupQuestion) {
        upsert(&mut self.questions, row, |r| r.id);
    }

    pub(crate) fn put_root_cause_candidate(&mut self, row: RootCauseCandidate) {
        upsert(&mut self.root_cause_candidates, row, |r| r.id);
    }

    pub(crate) fn put_action_item_candidate(&mut self, row: ActionItemCandidate) {
        upsert(&mut self.action_item_candidates, row, |r| r.id);
    }

    pub(crate) fn put_root_cause_final(&mut self, row: RootCauseFinal) {
        upsert(&mut self.root_cause_finals, row, |r| r.id);
    }

    pub(crate) fn put_action_item(&mut self, row: ActionItem) {
        upsert(&mut self.action_items, row, |r| r.id);
    }

    pub(crate) fn remove_root_cause_final(&mut self, id: RootCauseFinalId) -> bool {
        let before = self.root_cause_finals.len();
        self.root_cause_finals.retain(|f| f.id != id);
        self.root_cause_finals.len() != before
    }

    pub(crate) fn remove_action_item(&mut self, id: ActionItemId) -> bool {
        let before = self.action_items.len();
        self.action_items.retain(|i| i.id != id);
        self.action_items.len() != before
    }
}

fn upsert<T, K: PartialEq>(rows: &mut Vec<T>, row: T, key: impl Fn(&T) -> K) {
    let k = key(&row);
    match rows.iter_mut().find(|existing| key(existing) == k) {
        Some(slot) => *slot = row,
        None => rows.push(row),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcaflow_model::{Confidence, RecordId, UserId};
    use time::OffsetDateTime;

    fn candidate(text: &str) -> RootCauseCandidate {
        RootCauseCandidate {
            id: RootCauseCandidateId::new(),
            record_id: RecordId::new(),
            cause_text: text.to_string(),
            confidence: Confidence::Medium,
            generated_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn upsert_replaces_in_place() {
        let mut children = RecordChildren::default();
        let a = candidate("worn bearing");
        let b = candidate("misalignment");
        children.put_root_cause_candidate(a.clone());
        children.put_root_cause_candidate(b.clone());

        let mut relabeled = a.clone();
        relabeled.confidence = Confidence::High;
        children.put_root_cause_candidate(relabeled);

        assert_eq!(children.root_cause_candidates.len(), 2);
        assert_eq!(children.root_cause_candidates[0].id, a.id);
        assert_eq!(children.root_cause_candidates[0].confidence, Confidence::High);
        assert_eq!(children.root_cause_candidates[1].id, b.id);
    }

    #[test]
    fn candidate_reference_lookup() {
        let mut children = RecordChildren::default();
        let c = candidate("worn bearing");
        assert!(children.final_for_candidate(c.id).is_none());

        let f = RootCauseFinal::promoted_from(&c, UserId::new(), OffsetDateTime::now_utc());
        children.put_root_cause_final(f.clone());
        assert_eq!(children.final_for_candidate(c.id).map(|f| f.id), Some(f.id));
        assert!(children.contains(ChildRef::RootCauseFinal(f.id)));

        assert!(children.remove_root_cause_final(f.id));
        assert!(!children.remove_root_cause_final(f.id));
        assert!(children.final_for_candidate(c.id).is_none());
    }
}
