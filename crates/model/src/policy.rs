//! Access policy.
//!
//! Every mutating operation asks this module before touching storage. The
//! rules are small enough to read in one screen:
//!
//! - the record owner and admins may edit a record and its findings
//! - ownership reassignment, reopening, and deletion are admin-only
//! - an action item's owner may progress that item even without edit rights

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::finding::ActionItem;
use crate::ids::UserId;
use crate::record::Record;
use crate::user::Role;

/// The authenticated caller, as supplied by the auth collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(id: UserId, role: Role) -> Self {
        Self { id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    EditRecord,
    Administer,
    ProgressActionItem,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Permission::EditRecord => "edit record",
            Permission::Administer => "administer",
            Permission::ProgressActionItem => "progress action item",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("user {actor} lacks permission to {permission}")]
pub struct AccessDenied {
    pub actor: UserId,
    pub permission: Permission,
}

pub fn can_edit(actor: &Actor, record: &Record) -> bool {
    actor.is_admin() || actor.id == record.owner_user_id
}

pub fn authorize_edit(actor: &Actor, record: &Record) -> Result<(), AccessDenied> {
    if can_edit(actor, record) {
        Ok(())
    } else {
        Err(AccessDenied {
            actor: actor.id,
            permission: Permission::EditRecord,
        })
    }
}

pub fn authorize_admin(actor: &Actor) -> Result<(), AccessDenied> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(AccessDenied {
            actor: actor.id,
            permission: Permission::Administer,
        })
    }
}

/// Item owners get the narrow progress capability; editors get it too.
/// Record status is not checked here.
pub fn authorize_item_progress(
    actor: &Actor,
    record: &Record,
    item: &ActionItem,
) -> Result<(), AccessDenied> {
    if can_edit(actor, record) || item.owner_user_id == Some(actor.id) {
        Ok(())
    } else {
        Err(AccessDenied {
            actor: actor.id,
            permission: Permission::ProgressActionItem,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finding::{ActionItemCandidate, Priority};
    use crate::ids::ActionItemCandidateId;
    use crate::record::RecordIntake;
    use time::OffsetDateTime;

    fn record_owned_by(owner: UserId) -> Record {
        let intake = RecordIntake {
            title: "Conveyor stall".to_string(),
            failure_description: "Line 3 stalled twice on night shift".to_string(),
            impact: None,
            supporting_notes: None,
        };
        Record::new_draft(1, owner, intake, OffsetDateTime::now_utc())
    }

    fn item_for(record: &Record) -> ActionItem {
        let candidate = ActionItemCandidate {
            id: ActionItemCandidateId::new(),
            record_id: record.id,
            action_text: "Replace drive belt".to_string(),
            priority: Priority::Medium,
            timeframe: None,
            success_criteria: None,
            generated_at: OffsetDateTime::now_utc(),
        };
        ActionItem::promoted_from(&candidate, record.owner_user_id, OffsetDateTime::now_utc())
    }

    #[test]
    fn owner_and_admin_can_edit() {
        let owner = UserId::new();
        let record = record_owned_by(owner);
        assert!(can_edit(&Actor::new(owner, Role::User), &record));
        assert!(can_edit(&Actor::new(UserId::new(), Role::Admin), &record));
        assert!(!can_edit(&Actor::new(UserId::new(), Role::User), &record));
    }

    #[test]
    fn stranger_is_denied_edit() {
        let record = record_owned_by(UserId::new());
        let stranger = Actor::new(UserId::new(), Role::User);
        let err = authorize_edit(&stranger, &record).unwrap_err();
        assert_eq!(err.permission, Permission::EditRecord);
        assert_eq!(err.actor, stranger.id);
    }

    #[test]
    fn owner_is_not_admin() {
        let owner = UserId::new();
        let err = authorize_admin(&Actor::new(owner, Role::User)).unwrap_err();
        assert_eq!(err.permission, Permission::Administer);
        assert!(authorize_admin(&Actor::new(owner, Role::Admin)).is_ok());
    }

    #[test]
    fn item_owner_may_progress_without_edit_rights() {
        let record = record_owned_by(UserId::new());
        let mut item = item_for(&record);
        let assignee = UserId::new();
        item.owner_user_id = Some(assignee);

        let actor = Actor::new(assignee, Role::User);
        assert!(authorize_edit(&actor, &record).is_err());
        assert!(authorize_item_progress(&actor, &record, &item).is_ok());

        let other = Actor::new(UserId::new(), Role::User);
        let err = authorize_item_progress(&other, &record, &item).unwrap_err();
        assert_eq!(err.permission, Permission::ProgressActionItem);
    }
}
