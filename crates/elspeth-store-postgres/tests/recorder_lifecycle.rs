
use elspeth_core::model::*;
use elspeth_core::recorder::Recorder;
use elspeth_store_postgres::{PgRecorder, PoolProvider};
use serde_json::json;
use test_support::with_pool;

fn recorder(pool: &elspeth_store_postgres::PgPool) -> PgRecorder<PoolProvider> {
    PgRecorder::new(PoolProvider { pool: pool.clone() })
}

#[test]
fn records_a_full_row_through_two_nodes_and_completes_the_run() {
    let ran = with_pool(|pool| {
        let rec = recorder(pool);
        let run = rec.begin_run(json!({"pipeline": "lifecycle"}), "v1").unwrap();

        let source = rec
            .register_node(run.run_id, "csv_source", NodeType::Source, "1.0.0", json!({}), Determinism::IoRead, Some(0), None)
            .unwrap();
        let transform = rec
            .register_node(run.run_id, "uppercase", NodeType::Transform, "1.0.0", json!({}), Determinism::Pure, Some(1), None)
            .unwrap();
        let edge = rec.register_edge(run.run_id, source.node_id, transform.node_id, "main", EdgeMode::Move).unwrap();

        let row = rec.create_row(run.run_id, source.node_id, 0, &json!({"name": "ada"}), None).unwrap();
        let token = rec.create_token(row.row_id, None, None, None).unwrap();

        let state = rec.begin_node_state(token.token_id, transform.node_id, 0, &json!({"name": "ada"}), 0, None).unwrap();
        rec.complete_node_state(state.state_id, NodeStateStatus::Completed, Some(&json!({"name": "ADA"})), Some(4), None, None).unwrap();
        rec.record_routing_event(state.state_id, edge.edge_id, EdgeMode::Move, None, None, 0).unwrap();

        rec.complete_run(run.run_id, RunStatus::Completed, Some(ReproducibilityGrade::FullReproducible)).unwrap();

        let nodes = rec.get_nodes(run.run_id).unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].node_id, source.node_id);
        assert_eq!(nodes[1].node_id, transform.node_id);

        let states = rec.get_node_states(token.token_id).unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].status, NodeStateStatus::Completed);
        assert_eq!(states[0].output_hash.as_deref().map(str::len), Some(64));

        let events = rec.get_routing_events(state.state_id).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].edge_id, edge.edge_id);
    });
    if ran.is_none() {
        eprintln!("skipping: DATABASE_URL not set");
    }
}

#[test]
fn rejects_a_second_concurrent_open_state_for_the_same_token() {
    let ran = with_pool(|pool| {
        let rec = recorder(pool);
        let run = rec.begin_run(json!({}), "v1").unwrap();
        let node = rec.register_node(run.run_id, "n", NodeType::Transform, "1.0.0", json!({}), Determinism::Pure, Some(0), None).unwrap();
        let row = rec.create_row(run.run_id, node.node_id, 0, &json!({}), None).unwrap();
        let token = rec.create_token(row.row_id, None, None, None).unwrap();

        rec.begin_node_state(token.token_id, node.node_id, 0, &json!({}), 0, None).unwrap();
        let second = rec.begin_node_state(token.token_id, node.node_id, 1, &json!({}), 0, None);
        assert!(second.is_err());
    });
    if ran.is_none() {
        eprintln!("skipping: DATABASE_URL not set");
    }
}

#[test]
fn retry_batch_copies_members_into_a_fresh_draft_batch() {
    let ran = with_pool(|pool| {
        let rec = recorder(pool);
        let run = rec.begin_run(json!({}), "v1").unwrap();
        let agg = rec.register_node(run.run_id, "sum", NodeType::Aggregation, "1.0.0", json!({}), Determinism::Deterministic, Some(0), None).unwrap();
        let row = rec.create_row(run.run_id, agg.node_id, 0, &json!({}), None).unwrap();
        let token = rec.create_token(row.row_id, None, None, None).unwrap();

        let batch = rec.create_batch(run.run_id, agg.node_id, 0).unwrap();
        rec.add_batch_member(batch.batch_id, token.token_id, 0).unwrap();
        rec.update_batch_status(batch.batch_id, BatchStatus::Executing, None, None).unwrap();
        rec.update_batch_status(batch.batch_id, BatchStatus::Failed, Some("plugin_error".into()), None).unwrap();

        let retried = rec.retry_batch(batch.batch_id).unwrap();
        assert_eq!(retried.status, BatchStatus::Draft);
        assert_eq!(retried.attempt, batch.attempt + 1);

        let members = rec.get_batch_members(retried.batch_id).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].token_id, token.token_id);

        assert!(rec.retry_batch(retried.batch_id).is_err());
    });
    if ran.is_none() {
        eprintln!("skipping: DATABASE_URL not set");
    }
}

#[test]
fn get_latest_checkpoint_returns_the_highest_sequence_number() {
    let ran = with_pool(|pool| {
        let rec = recorder(pool);
        let run = rec.begin_run(json!({}), "v1").unwrap();
        let node = rec.register_node(run.run_id, "n", NodeType::Sink, "1.0.0", json!({}), Determinism::IoRead, Some(0), None).unwrap();
        let row = rec.create_row(run.run_id, node.node_id, 0, &json!({}), None).unwrap();
        let token = rec.create_token(row.row_id, None, None, None).unwrap();

        rec.create_checkpoint(run.run_id, 1, token.token_id, node.node_id, json!({"sum": 1})).unwrap();
        rec.create_checkpoint(run.run_id, 2, token.token_id, node.node_id, json!({"sum": 2})).unwrap();

        let latest = rec.get_latest_checkpoint(run.run_id).unwrap().unwrap();
        assert_eq!(latest.sequence_number, 2);
    });
    if ran.is_none() {
        eprintln!("skipping: DATABASE_URL not set");
    }
}
