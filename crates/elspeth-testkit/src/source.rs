//! An in-memory, deterministic `Source` over a fixed row set — no external
//! IO, so a run built against it is reproducible across invocations the way
//! a synthetic dataset generator is.

use elspeth_core::collab::Source;
use elspeth_core::model::{Determinism, RowData};
use serde_json::Value;
use std::vec::IntoIter;

/// Replays a fixed, ordered sequence of rows exactly once per instance.
pub struct VecSource {
    rows: IntoIter<Value>,
    schema: Option<Value>,
    started: bool,
    completed: bool,
}

impl VecSource {
    pub fn new(rows: Vec<Value>) -> Self {
        Self { rows: rows.into_iter(), schema: None, started: false, completed: false }
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Builds three deterministic rows with an incrementing `n` field — the
    /// smallest fixture that exercises a count-based aggregation trigger.
    pub fn synthetic(count: usize) -> Self {
        let rows = (0..count).map(|i| serde_json::json!({"n": i as i64})).collect();
        Self::new(rows)
    }

    pub fn on_start_calls(&self) -> bool {
        self.started
    }

    pub fn on_complete_calls(&self) -> bool {
        self.completed
    }
}

impl Source for VecSource {
    fn next_row(&mut self) -> Option<RowData> {
        self.rows.next().and_then(|v| RowData::try_from(v).ok())
    }

    fn output_schema(&self) -> Option<&Value> {
        self.schema.as_ref()
    }

    fn determinism(&self) -> Determinism {
        Determinism::Pure
    }

    fn on_start(&mut self) {
        self.started = true;
    }

    fn on_complete(&mut self) {
        self.completed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_rows_in_order_then_exhausts() {
        let mut source = VecSource::new(vec![serde_json::json!({"n": 1}), serde_json::json!({"n": 2})]);
        assert_eq!(source.next_row().unwrap().get("n"), Some(&serde_json::json!(1)));
        assert_eq!(source.next_row().unwrap().get("n"), Some(&serde_json::json!(2)));
        assert!(source.next_row().is_none());
    }

    #[test]
    fn synthetic_builds_an_incrementing_n_field() {
        let mut source = VecSource::synthetic(3);
        let values: Vec<i64> = std::iter::from_fn(|| source.next_row()).map(|r| r.get("n").unwrap().as_i64().unwrap()).collect();
        assert_eq!(values, vec![0, 1, 2]);
    }

    #[test]
    fn start_and_complete_hooks_fire() {
        let mut source = VecSource::synthetic(1);
        assert!(!source.on_start_calls());
        source.on_start();
        source.on_complete();
        assert!(source.on_start_calls());
        assert!(source.on_complete_calls());
    }
}
