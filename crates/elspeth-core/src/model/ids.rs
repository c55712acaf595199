//! Opaque identifiers.
//!
//! Every `*_id` field in the audit schema is a 128-bit opaque identifier;
//! `uuid::Uuid` is the natural fit and is already the identifier type used
//! throughout this crate's lineage.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! id_type {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
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

        impl From<Uuid> for $name {
            fn from(u: Uuid) -> Self {
                Self(u)
            }
        }
    };
}

id_type!(RunId);
id_type!(NodeId);
id_type!(EdgeId);
id_type!(RowId);
id_type!(TokenId);
id_type!(StateId);
id_type!(RoutingEventId);
id_type!(RoutingGroupId);
id_type!(ForkGroupId);
id_type!(JoinGroupId);
id_type!(BatchId);
id_type!(CallId);
id_type!(ArtifactId);
