//! The row payload that actually flows between plugins.
//!
//! A `RowData` is a mapping of string to scalar/nested JSON value, per §6's
//! Source collaborator contract. It is distinct from the audit-table `Row`
//! record in [`crate::model::entities`], which tracks lineage, not content.

use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowData(pub Map<String, Value>);

impl RowData {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

impl From<Map<String, Value>> for RowData {
    fn from(m: Map<String, Value>) -> Self {
        Self(m)
    }
}

impl TryFrom<Value> for RowData {
    type Error = &'static str;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(m) => Ok(Self(m)),
            _ => Err("row data must be a JSON object"),
        }
    }
}
