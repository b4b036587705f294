//! Typed identifiers.
//!
//! Every entity key is a UUID wrapped in its own newtype so a candidate id
//! can never be passed where a final id is expected.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

id_type!(
    /// Identity of a failure investigation record.
    RecordId
);
id_type!(
    /// Identity of an application user.
    UserId
);
id_type!(
    /// Identity of a follow-up question.
    QuestionId
);
id_type!(
    /// Identity of a machine-suggested root cause.
    RootCauseCandidateId
);
id_type!(
    /// Identity of a machine-suggested action item.
    ActionItemCandidateId
);
id_type!(
    /// Identity of a curated root cause.
    RootCauseFinalId
);
id_type!(
    /// Identity of a curated action item.
    ActionItemId
);
id_type!(
    /// Identity of an audit ledger entry.
    AuditEventId
);
