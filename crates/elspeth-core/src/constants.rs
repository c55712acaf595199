//! Engine-wide constants.
//!
//! `CANONICAL_VERSION` is stored on every [`crate::model::Run`] so that old
//! audit data can be interpreted under the canonicalization rules in force
//! when it was written, even if this crate's canonicalization logic changes
//! later.

pub const CANONICAL_VERSION: &str = "elspeth-canon-1";
