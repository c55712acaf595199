//! Routing reasons attached to RoutingEvents.
//!
//! `RoutingReason` is a discriminated union distinguished by field presence
//! rather than an explicit tag, so that a reason recorded by a config gate
//! serializes identically whether or not a future plugin-driven routing
//! source exists: readers of the audit trail tell the two apart by which
//! fields are present (`condition`/`result` vs. `rule`/`matched_value`),
//! not by a `type` discriminant.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigGateReason {
    pub condition: String,
    pub result: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginGateReason {
    pub rule: String,
    pub matched_value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoutingReason {
    Config(ConfigGateReason),
    Plugin(PluginGateReason),
}

impl RoutingReason {
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).expect("RoutingReason is always serializable")
    }
}
