//! Enum-like fields that the recorder validates fail-fast (§4.3: "invalid
//! strings raise an error"). Each carries a `FromStr`-via-`TryFrom<&str>`
//! impl so callers may pass the canonical string form interchangeably with
//! the Rust enum.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid {field}: {value:?}")]
pub struct InvalidEnumValue {
    pub field: &'static str,
    pub value: String,
}

macro_rules! string_enum {
    ($name:ident { $($variant:ident => $str:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $str),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }

        impl TryFrom<&str> for $name {
            type Error = InvalidEnumValue;

            fn try_from(value: &str) -> Result<Self, <Self as TryFrom<&str>>::Error> {
                match value {
                    $($str => Ok(Self::$variant)),+,
                    other => Err(InvalidEnumValue { field: stringify!($name), value: other.to_string() }),
                }
            }
        }
    };
}

string_enum!(RunStatus {
    Running => "running",
    Completed => "completed",
    Failed => "failed",
    Crashed => "crashed",
});

string_enum!(ReproducibilityGrade {
    FullReproducible => "full_reproducible",
    ReplayReproducible => "replay_reproducible",
    AttributableOnly => "attributable_only",
});

string_enum!(NodeType {
    Source => "source",
    Transform => "transform",
    Gate => "gate",
    Aggregation => "aggregation",
    Coalesce => "coalesce",
    Sink => "sink",
});

string_enum!(Determinism {
    Pure => "pure",
    Deterministic => "deterministic",
    IoRead => "io_read",
    ExternalCall => "external_call",
    NonDeterministic => "non_deterministic",
});

string_enum!(EdgeMode {
    Move => "move",
    Copy => "copy",
});

string_enum!(NodeStateStatus {
    Open => "open",
    Completed => "completed",
    Failed => "failed",
});

string_enum!(BatchStatus {
    Draft => "draft",
    Executing => "executing",
    Completed => "completed",
    Failed => "failed",
});

string_enum!(BatchOutputType {
    Token => "token",
    Artifact => "artifact",
});

string_enum!(CallStatus {
    Success => "success",
    Error => "error",
});

string_enum!(TriggerReason {
    Count => "count",
    Timeout => "timeout",
    Condition => "condition",
    EndOfSource => "end_of_source",
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_canonical_strings() {
        assert_eq!(RunStatus::try_from("running").unwrap(), RunStatus::Running);
        assert_eq!(RunStatus::Running.as_str(), "running");
    }

    #[test]
    fn rejects_unknown_strings() {
        assert!(NodeType::try_from("bogus").is_err());
    }
}
