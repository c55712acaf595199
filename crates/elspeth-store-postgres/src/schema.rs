//! Diesel schema for the audit store (13 tables plus checkpoints).
//!
//! Kept hand-written rather than `diesel print-schema`'d so the column
//! order matches `elspeth_core::model::entities` field-for-field.

diesel::table! {
    runs (run_id) {
        run_id -> Uuid,
        started_at -> Timestamptz,
        completed_at -> Nullable<Timestamptz>,
        config_hash -> Text,
        config_json -> Jsonb,
        canonical_version -> Text,
        status -> Text,
        reproducibility_grade -> Text,
        export_status -> Nullable<Text>,
    }
}

diesel::table! {
    nodes (node_id) {
        node_id -> Uuid,
        run_id -> Uuid,
        plugin_name -> Text,
        node_type -> Text,
        plugin_version -> Text,
        config_hash -> Text,
        config_json -> Jsonb,
        schema_hash -> Nullable<Text>,
        sequence_in_pipeline -> Nullable<BigInt>,
        determinism -> Text,
    }
}

diesel::table! {
    edges (edge_id) {
        edge_id -> Uuid,
        run_id -> Uuid,
        from_node_id -> Uuid,
        to_node_id -> Uuid,
        label -> Text,
        default_mode -> Text,
    }
}

diesel::table! {
    rows (row_id) {
        row_id -> Uuid,
        run_id -> Uuid,
        source_node_id -> Uuid,
        row_index -> BigInt,
        source_data_hash -> Text,
        source_data_ref -> Nullable<Text>,
    }
}

diesel::table! {
    tokens (token_id) {
        token_id -> Uuid,
        row_id -> Uuid,
        fork_group_id -> Nullable<Uuid>,
        join_group_id -> Nullable<Uuid>,
        branch_name -> Nullable<Text>,
    }
}

diesel::table! {
    token_parents (token_id, parent_token_id) {
        token_id -> Uuid,
        parent_token_id -> Uuid,
        ordinal -> Integer,
    }
}

diesel::table! {
    node_states (state_id) {
        state_id -> Uuid,
        token_id -> Uuid,
        node_id -> Uuid,
        step_index -> BigInt,
        attempt -> Integer,
        status -> Text,
        input_hash -> Text,
        output_hash -> Nullable<Text>,
        context_before_json -> Nullable<Jsonb>,
        context_after_json -> Nullable<Jsonb>,
        duration_ms -> Nullable<BigInt>,
        started_at -> Timestamptz,
        completed_at -> Nullable<Timestamptz>,
        error_json -> Nullable<Jsonb>,
    }
}

diesel::table! {
    routing_events (event_id) {
        event_id -> Uuid,
        state_id -> Uuid,
        edge_id -> Uuid,
        routing_group_id -> Uuid,
        ordinal -> Integer,
        mode -> Text,
        reason_hash -> Text,
        reason_ref -> Nullable<Text>,
    }
}

diesel::table! {
    batches (batch_id) {
        batch_id -> Uuid,
        run_id -> Uuid,
        aggregation_node_id -> Uuid,
        attempt -> Integer,
        status -> Text,
        created_at -> Timestamptz,
        completed_at -> Nullable<Timestamptz>,
        aggregation_state_id -> Nullable<Uuid>,
        trigger_reason -> Nullable<Text>,
    }
}

diesel::table! {
    batch_members (batch_id, token_id) {
        batch_id -> Uuid,
        token_id -> Uuid,
        ordinal -> Integer,
    }
}

diesel::table! {
    batch_outputs (batch_id, output_type, output_id) {
        batch_id -> Uuid,
        output_type -> Text,
        output_id -> Text,
    }
}

diesel::table! {
    calls (call_id) {
        call_id -> Uuid,
        state_id -> Uuid,
        call_index -> Integer,
        call_type -> Text,
        status -> Text,
        request_hash -> Nullable<Text>,
        request_ref -> Nullable<Text>,
        response_hash -> Nullable<Text>,
        response_ref -> Nullable<Text>,
        latency_ms -> Nullable<BigInt>,
        error_json -> Nullable<Jsonb>,
    }
}

diesel::table! {
    artifacts (artifact_id) {
        artifact_id -> Uuid,
        run_id -> Uuid,
        produced_by_state_id -> Uuid,
        sink_node_id -> Uuid,
        artifact_type -> Text,
        path_or_uri -> Text,
        content_hash -> Text,
        size_bytes -> BigInt,
    }
}

diesel::table! {
    checkpoints (run_id, sequence_number) {
        run_id -> Uuid,
        sequence_number -> BigInt,
        token_id -> Uuid,
        node_id -> Uuid,
        aggregation_state_json -> Jsonb,
        created_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    runs,
    nodes,
    edges,
    rows,
    tokens,
    token_parents,
    node_states,
    routing_events,
    batches,
    batch_members,
    batch_outputs,
    calls,
    artifacts,
    checkpoints,
);

diesel::joinable!(nodes -> runs (run_id));
diesel::joinable!(edges -> runs (run_id));
diesel::joinable!(rows -> runs (run_id));
diesel::joinable!(tokens -> rows (row_id));
diesel::joinable!(node_states -> tokens (token_id));
diesel::joinable!(calls -> node_states (state_id));
diesel::joinable!(routing_events -> node_states (state_id));
diesel::joinable!(batches -> runs (run_id));
diesel::joinable!(artifacts -> runs (run_id));
