//! Postgres (Diesel) implementation of [`elspeth_core::recorder::Recorder`].
//!
//! Design goals:
//! - Durable, transactional parity with `InMemoryRecorder`: every method
//!   here enforces the same invariants (append-only NodeStates, legal batch
//!   transitions, dense routing ordinals) inside one Diesel transaction.
//! - Reads return rows in the same order the in-memory backend does, so a
//!   pipeline explain tool gets identical answers regardless of which
//!   recorder produced the audit trail.
//! - Transient connection/serialization failures are retried with a small
//!   backoff; everything else is surfaced as an [`elspeth_core::EngineError`].

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use log::warn;
use serde_json::Value;
use uuid::Uuid;

use elspeth_core::canon::stable_hash;
use elspeth_core::model::*;
use elspeth_core::recorder::{Recorder, Route};
use elspeth_core::EngineError;

use crate::error::{into_engine_error, PersistenceError};
use crate::migrations::run_pending_migrations;
use crate::schema::{
    artifacts, batch_members, batches, calls, checkpoints, edges, node_states, nodes, routing_events,
    rows as rows_table, runs, token_parents, tokens,
};

pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;

/// Abstracts over how a connection is obtained so tests can swap in a
/// single-connection provider without pulling in a whole pool.
pub trait ConnectionProvider: Send + Sync + 'static {
    fn connection(&self) -> Result<r2d2::PooledConnection<ConnectionManager<PgConnection>>, PersistenceError>;
}

pub struct PoolProvider {
    pub pool: PgPool,
}

impl ConnectionProvider for PoolProvider {
    fn connection(&self) -> Result<r2d2::PooledConnection<ConnectionManager<PgConnection>>, PersistenceError> {
        self.pool.get().map_err(|e| PersistenceError::TransientIo(format!("pool error: {e}")))
    }
}

fn is_retryable(e: &PersistenceError) -> bool {
    matches!(e, PersistenceError::SerializationConflict | PersistenceError::TransientIo(_))
}

/// Retries a unit of work up to 3 times on transient failures, 15/30/45ms apart.
fn with_retry<F, T>(mut f: F) -> Result<T, PersistenceError>
where
    F: FnMut() -> Result<T, PersistenceError>,
{
    let mut attempts = 0;
    loop {
        match f() {
            Err(e) if is_retryable(&e) && attempts < 3 => {
                let delay_ms = 15 * (attempts + 1) as u64;
                warn!("retryable persistence error (attempt {}): {e}, sleeping {delay_ms}ms", attempts + 1);
                std::thread::sleep(std::time::Duration::from_millis(delay_ms));
                attempts += 1;
            }
            r => return r,
        }
    }
}

fn hash_of(v: &Value) -> Result<String, EngineError> {
    Ok(stable_hash(v)?)
}

fn enum_str<T: std::fmt::Display>(v: T) -> String {
    v.to_string()
}

fn parse_enum<T>(field: &'static str, value: &str) -> Result<T, EngineError>
where
    T: for<'a> TryFrom<&'a str, Error = InvalidEnumValue>,
{
    T::try_from(value).map_err(EngineError::from)
}

// --- Row structs, one per table, column order matching schema.rs ----------

#[derive(Queryable, Insertable)]
#[diesel(table_name = runs)]
struct RunRow {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    config_hash: String,
    config_json: Value,
    canonical_version: String,
    status: String,
    reproducibility_grade: String,
    export_status: Option<String>,
}

impl RunRow {
    fn into_domain(self) -> Result<Run, EngineError> {
        Ok(Run {
            run_id: RunId(self.run_id),
            started_at: self.started_at,
            completed_at: self.completed_at,
            config_hash: self.config_hash,
            config_json: self.config_json,
            canonical_version: self.canonical_version,
            status: parse_enum("status", &self.status)?,
            reproducibility_grade: parse_enum("reproducibility_grade", &self.reproducibility_grade)?,
            export_status: self.export_status,
        })
    }
}

#[derive(Queryable, Insertable)]
#[diesel(table_name = nodes)]
struct NodeRow {
    node_id: Uuid,
    run_id: Uuid,
    plugin_name: String,
    node_type: String,
    plugin_version: String,
    config_hash: String,
    config_json: Value,
    schema_hash: Option<String>,
    sequence_in_pipeline: Option<i64>,
    determinism: String,
}

impl NodeRow {
    fn into_domain(self) -> Result<Node, EngineError> {
        Ok(Node {
            node_id: NodeId(self.node_id),
            run_id: RunId(self.run_id),
            plugin_name: self.plugin_name,
            node_type: parse_enum("node_type", &self.node_type)?,
            plugin_version: self.plugin_version,
            config_hash: self.config_hash,
            config_json: self.config_json,
            schema_hash: self.schema_hash,
            sequence_in_pipeline: self.sequence_in_pipeline,
            determinism: parse_enum("determinism", &self.determinism)?,
        })
    }
}

#[derive(Queryable, Insertable)]
#[diesel(table_name = edges)]
struct EdgeRow {
    edge_id: Uuid,
    run_id: Uuid,
    from_node_id: Uuid,
    to_node_id: Uuid,
    label: String,
    default_mode: String,
}

impl EdgeRow {
    fn into_domain(self) -> Result<Edge, EngineError> {
        Ok(Edge {
            edge_id: EdgeId(self.edge_id),
            run_id: RunId(self.run_id),
            from_node_id: NodeId(self.from_node_id),
            to_node_id: NodeId(self.to_node_id),
            label: self.label,
            default_mode: parse_enum("default_mode", &self.default_mode)?,
        })
    }
}

#[derive(Queryable, Insertable)]
#[diesel(table_name = rows_table)]
struct RowRow {
    row_id: Uuid,
    run_id: Uuid,
    source_node_id: Uuid,
    row_index: i64,
    source_data_hash: String,
    source_data_ref: Option<String>,
}

impl RowRow {
    fn into_domain(self) -> elspeth_core::model::Row {
        elspeth_core::model::Row {
            row_id: RowId(self.row_id),
            run_id: RunId(self.run_id),
            source_node_id: NodeId(self.source_node_id),
            row_index: self.row_index,
            source_data_hash: self.source_data_hash,
            source_data_ref: self.source_data_ref,
        }
    }
}

#[derive(Queryable, Insertable)]
#[diesel(table_name = tokens)]
struct TokenRow {
    token_id: Uuid,
    row_id: Uuid,
    fork_group_id: Option<Uuid>,
    join_group_id: Option<Uuid>,
    branch_name: Option<String>,
}

impl TokenRow {
    fn into_domain(self) -> Token {
        Token {
            token_id: TokenId(self.token_id),
            row_id: RowId(self.row_id),
            fork_group_id: self.fork_group_id.map(ForkGroupId),
            join_group_id: self.join_group_id.map(JoinGroupId),
            branch_name: self.branch_name,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = token_parents)]
struct NewTokenParentRow {
    token_id: Uuid,
    parent_token_id: Uuid,
    ordinal: i32,
}

#[derive(Queryable, Insertable)]
#[diesel(table_name = node_states)]
struct NodeStateRow {
    state_id: Uuid,
    token_id: Uuid,
    node_id: Uuid,
    step_index: i64,
    attempt: i32,
    status: String,
    input_hash: String,
    output_hash: Option<String>,
    context_before_json: Option<Value>,
    context_after_json: Option<Value>,
    duration_ms: Option<i64>,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    error_json: Option<Value>,
}

impl NodeStateRow {
    fn into_domain(self) -> Result<NodeState, EngineError> {
        Ok(NodeState {
            state_id: StateId(self.state_id),
            token_id: TokenId(self.token_id),
            node_id: NodeId(self.node_id),
            step_index: self.step_index,
            attempt: self.attempt,
            status: parse_enum("status", &self.status)?,
            input_hash: self.input_hash,
            output_hash: self.output_hash,
            context_before_json: self.context_before_json,
            context_after_json: self.context_after_json,
            duration_ms: self.duration_ms,
            started_at: self.started_at,
            completed_at: self.completed_at,
            error_json: self.error_json,
        })
    }
}

#[derive(Queryable, Insertable)]
#[diesel(table_name = routing_events)]
struct RoutingEventRow {
    event_id: Uuid,
    state_id: Uuid,
    edge_id: Uuid,
    routing_group_id: Uuid,
    ordinal: i32,
    mode: String,
    reason_hash: String,
    reason_ref: Option<String>,
}

impl RoutingEventRow {
    fn into_domain(self) -> Result<RoutingEvent, EngineError> {
        Ok(RoutingEvent {
            event_id: RoutingEventId(self.event_id),
            state_id: StateId(self.state_id),
            edge_id: EdgeId(self.edge_id),
            routing_group_id: RoutingGroupId(self.routing_group_id),
            ordinal: self.ordinal,
            mode: parse_enum("mode", &self.mode)?,
            reason_hash: self.reason_hash,
            reason_ref: self.reason_ref,
        })
    }
}

#[derive(Queryable, Insertable, AsChangeset)]
#[diesel(table_name = batches)]
struct BatchRow {
    batch_id: Uuid,
    run_id: Uuid,
    aggregation_node_id: Uuid,
    attempt: i32,
    status: String,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    aggregation_state_id: Option<Uuid>,
    trigger_reason: Option<String>,
}

impl BatchRow {
    fn into_domain(self) -> Result<Batch, EngineError> {
        Ok(Batch {
            batch_id: BatchId(self.batch_id),
            run_id: RunId(self.run_id),
            aggregation_node_id: NodeId(self.aggregation_node_id),
            attempt: self.attempt,
            status: parse_enum("status", &self.status)?,
            created_at: self.created_at,
            completed_at: self.completed_at,
            aggregation_state_id: self.aggregation_state_id.map(StateId),
            trigger_reason: self.trigger_reason,
        })
    }
}

#[derive(Queryable, Insertable)]
#[diesel(table_name = batch_members)]
struct BatchMemberRow {
    batch_id: Uuid,
    token_id: Uuid,
    ordinal: i32,
}

impl BatchMemberRow {
    fn into_domain(self) -> BatchMember {
        BatchMember { batch_id: BatchId(self.batch_id), token_id: TokenId(self.token_id), ordinal: self.ordinal }
    }
}

#[derive(Queryable, Insertable)]
#[diesel(table_name = calls)]
struct CallRow {
    call_id: Uuid,
    state_id: Uuid,
    call_index: i32,
    call_type: String,
    status: String,
    request_hash: Option<String>,
    request_ref: Option<String>,
    response_hash: Option<String>,
    response_ref: Option<String>,
    latency_ms: Option<i64>,
    error_json: Option<Value>,
}

impl CallRow {
    fn into_domain(self) -> Result<Call, EngineError> {
        Ok(Call {
            call_id: CallId(self.call_id),
            state_id: StateId(self.state_id),
            call_index: self.call_index,
            call_type: self.call_type,
            status: parse_enum("status", &self.status)?,
            request_hash: self.request_hash,
            request_ref: self.request_ref,
            response_hash: self.response_hash,
            response_ref: self.response_ref,
            latency_ms: self.latency_ms,
            error_json: self.error_json,
        })
    }
}

#[derive(Queryable, Insertable)]
#[diesel(table_name = artifacts)]
struct ArtifactRow {
    artifact_id: Uuid,
    run_id: Uuid,
    produced_by_state_id: Uuid,
    sink_node_id: Uuid,
    artifact_type: String,
    path_or_uri: String,
    content_hash: String,
    size_bytes: i64,
}

impl ArtifactRow {
    fn into_domain(self) -> Artifact {
        Artifact {
            artifact_id: ArtifactId(self.artifact_id),
            run_id: RunId(self.run_id),
            produced_by_state_id: StateId(self.produced_by_state_id),
            sink_node_id: NodeId(self.sink_node_id),
            artifact_type: self.artifact_type,
            path_or_uri: self.path_or_uri,
            content_hash: self.content_hash,
            size_bytes: self.size_bytes,
        }
    }
}

#[derive(Queryable, Insertable)]
#[diesel(table_name = checkpoints)]
struct CheckpointRow {
    run_id: Uuid,
    sequence_number: i64,
    token_id: Uuid,
    node_id: Uuid,
    aggregation_state_json: Value,
    created_at: DateTime<Utc>,
}

impl CheckpointRow {
    fn into_domain(self) -> Checkpoint {
        Checkpoint {
            run_id: RunId(self.run_id),
            sequence_number: self.sequence_number,
            token_id: TokenId(self.token_id),
            node_id: NodeId(self.node_id),
            aggregation_state_json: self.aggregation_state_json,
            created_at: self.created_at,
        }
    }
}

/// The Postgres-backed [`Recorder`]. Every method runs its queries inside one
/// Diesel transaction and retries on serialization conflicts / transient
/// connection loss before surfacing an [`EngineError`].
pub struct PgRecorder<P: ConnectionProvider> {
    provider: P,
}

impl<P: ConnectionProvider> PgRecorder<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Runs `f` in a transaction, retrying transient failures, and maps the
    /// result straight into the engine's error taxonomy.
    fn with_conn<T, F>(&self, f: F) -> Result<T, EngineError>
    where
        F: Fn(&mut PgConnection) -> Result<T, diesel::result::Error>,
    {
        with_retry(|| {
            let mut conn = self.provider.connection()?;
            conn.transaction(|tx| f(tx)).map_err(PersistenceError::from)
        })
        .map_err(into_engine_error)
    }

    /// Like [`Self::with_conn`] but keeps the raw Diesel error so the caller
    /// can distinguish a deliberate `RollbackTransaction` (used here as an
    /// "invariant violated, reject this write" signal) from a genuine I/O
    /// failure, instead of inspecting a rendered error message.
    fn with_conn_raw<T, F>(&self, f: F) -> Result<T, diesel::result::Error>
    where
        F: Fn(&mut PgConnection) -> Result<T, diesel::result::Error>,
    {
        let mut conn = self.provider.connection().map_err(|_| diesel::result::Error::BrokenTransactionManager)?;
        conn.transaction(|tx| f(tx))
    }
}

impl<P: ConnectionProvider> Recorder for PgRecorder<P> {
    fn begin_run(&self, config: Value, canonical_version: &str) -> Result<Run, EngineError> {
        let config_hash = hash_of(&config)?;
        let row = RunRow {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            completed_at: None,
            config_hash,
            config_json: config,
            canonical_version: canonical_version.to_string(),
            status: enum_str(RunStatus::Running),
            reproducibility_grade: enum_str(ReproducibilityGrade::FullReproducible),
            export_status: None,
        };
        self.with_conn(|conn| diesel::insert_into(runs::table).values(&row).execute(conn))?;
        row.into_domain()
    }

    fn complete_run(
        &self,
        run_id: RunId,
        status: RunStatus,
        reproducibility_grade: Option<ReproducibilityGrade>,
    ) -> Result<(), EngineError> {
        if !matches!(status, RunStatus::Completed | RunStatus::Failed | RunStatus::Crashed) {
            return Err(EngineError::Validation(format!("complete_run requires a terminal status, got {status}")));
        }
        let now = Utc::now();
        self.with_conn_raw(|conn| {
            let current_grade: String = runs::table.find(run_id.0).select(runs::reproducibility_grade).first(conn)?;
            let grade = reproducibility_grade.map(enum_str).unwrap_or(current_grade);
            diesel::update(runs::table.find(run_id.0))
                .set((runs::status.eq(enum_str(status)), runs::completed_at.eq(Some(now)), runs::reproducibility_grade.eq(grade)))
                .execute(conn)
        })
        .map_err(|e| into_engine_error(PersistenceError::from(e)))?;
        Ok(())
    }

    fn register_node(
        &self,
        run_id: RunId,
        plugin_name: &str,
        node_type: NodeType,
        plugin_version: &str,
        config: Value,
        determinism: Determinism,
        sequence: Option<i64>,
        schema_hash: Option<String>,
    ) -> Result<Node, EngineError> {
        let row = NodeRow {
            node_id: Uuid::new_v4(),
            run_id: run_id.0,
            plugin_name: plugin_name.to_string(),
            node_type: enum_str(node_type),
            plugin_version: plugin_version.to_string(),
            config_hash: hash_of(&config)?,
            config_json: config,
            schema_hash,
            sequence_in_pipeline: sequence,
            determinism: enum_str(determinism),
        };
        self.with_conn(|conn| diesel::insert_into(nodes::table).values(&row).execute(conn))?;
        row.into_domain()
    }

    fn register_edge(
        &self,
        run_id: RunId,
        from_node_id: NodeId,
        to_node_id: NodeId,
        label: &str,
        mode: EdgeMode,
    ) -> Result<Edge, EngineError> {
        let row = EdgeRow {
            edge_id: Uuid::new_v4(),
            run_id: run_id.0,
            from_node_id: from_node_id.0,
            to_node_id: to_node_id.0,
            label: label.to_string(),
            default_mode: enum_str(mode),
        };
        self.with_conn(|conn| diesel::insert_into(edges::table).values(&row).execute(conn))?;
        row.into_domain()
    }

    fn create_row(
        &self,
        run_id: RunId,
        source_node_id: NodeId,
        row_index: i64,
        data: &Value,
        payload_ref: Option<String>,
    ) -> Result<elspeth_core::model::Row, EngineError> {
        let row = RowRow {
            row_id: Uuid::new_v4(),
            run_id: run_id.0,
            source_node_id: source_node_id.0,
            row_index,
            source_data_hash: hash_of(data)?,
            source_data_ref: payload_ref,
        };
        self.with_conn(|conn| diesel::insert_into(rows_table::table).values(&row).execute(conn))?;
        Ok(row.into_domain())
    }

    fn create_token(
        &self,
        row_id: RowId,
        fork_group_id: Option<ForkGroupId>,
        join_group_id: Option<JoinGroupId>,
        branch_name: Option<String>,
    ) -> Result<Token, EngineError> {
        let row = TokenRow {
            token_id: Uuid::new_v4(),
            row_id: row_id.0,
            fork_group_id: fork_group_id.map(|v| v.0),
            join_group_id: join_group_id.map(|v| v.0),
            branch_name,
        };
        self.with_conn(|conn| diesel::insert_into(tokens::table).values(&row).execute(conn))?;
        Ok(row.into_domain())
    }

    fn fork_token(&self, parent_token_id: TokenId, row_id: RowId, branches: &[String]) -> Result<Vec<Token>, EngineError> {
        let mut unique = branches.to_vec();
        unique.sort();
        unique.dedup();
        if unique.len() != branches.len() {
            return Err(EngineError::Validation("fork_token: duplicate branch names".into()));
        }
        let fork_group_id = Uuid::new_v4();
        let children: Vec<TokenRow> = branches
            .iter()
            .map(|branch| TokenRow {
                token_id: Uuid::new_v4(),
                row_id: row_id.0,
                fork_group_id: Some(fork_group_id),
                join_group_id: None,
                branch_name: Some(branch.clone()),
            })
            .collect();
        let parents: Vec<NewTokenParentRow> = children
            .iter()
            .enumerate()
            .map(|(ordinal, token)| NewTokenParentRow {
                token_id: token.token_id,
                parent_token_id: parent_token_id.0,
                ordinal: ordinal as i32,
            })
            .collect();
        self.with_conn(|conn| {
            diesel::insert_into(tokens::table).values(&children).execute(conn)?;
            diesel::insert_into(token_parents::table).values(&parents).execute(conn)
        })?;
        Ok(children.into_iter().map(TokenRow::into_domain).collect())
    }

    fn coalesce_tokens(&self, parent_token_ids: &[TokenId], row_id: RowId) -> Result<Token, EngineError> {
        if parent_token_ids.is_empty() {
            return Err(EngineError::Validation("coalesce_tokens requires at least one parent".into()));
        }
        let row = TokenRow {
            token_id: Uuid::new_v4(),
            row_id: row_id.0,
            fork_group_id: None,
            join_group_id: Some(Uuid::new_v4()),
            branch_name: None,
        };
        let parents: Vec<NewTokenParentRow> = parent_token_ids
            .iter()
            .enumerate()
            .map(|(ordinal, parent)| NewTokenParentRow { token_id: row.token_id, parent_token_id: parent.0, ordinal: ordinal as i32 })
            .collect();
        self.with_conn(|conn| {
            diesel::insert_into(tokens::table).values(&row).execute(conn)?;
            diesel::insert_into(token_parents::table).values(&parents).execute(conn)
        })?;
        Ok(row.into_domain())
    }

    fn begin_node_state(
        &self,
        token_id: TokenId,
        node_id: NodeId,
        step_index: i64,
        input_data: &Value,
        attempt: i32,
        context_before: Option<Value>,
    ) -> Result<NodeState, EngineError> {
        let input_hash = hash_of(input_data)?;
        let row = NodeStateRow {
            state_id: Uuid::new_v4(),
            token_id: token_id.0,
            node_id: node_id.0,
            step_index,
            attempt,
            status: enum_str(NodeStateStatus::Open),
            input_hash,
            output_hash: None,
            context_before_json: context_before,
            context_after_json: None,
            duration_ms: None,
            started_at: Utc::now(),
            completed_at: None,
            error_json: None,
        };
        self.with_conn_raw(|conn| {
            let already_open: i64 =
                node_states::table.filter(node_states::token_id.eq(token_id.0)).filter(node_states::status.eq("open")).count().get_result(conn)?;
            if already_open > 0 {
                return Err(diesel::result::Error::RollbackTransaction);
            }
            diesel::insert_into(node_states::table).values(&row).execute(conn)
        })
        .map_err(|e| match e {
            diesel::result::Error::RollbackTransaction => {
                EngineError::Validation(format!("token {token_id} already has an open NodeState"))
            }
            other => into_engine_error(PersistenceError::from(other)),
        })?;
        row.into_domain()
    }

    fn complete_node_state(
        &self,
        state_id: StateId,
        status: NodeStateStatus,
        output_data: Option<&Value>,
        duration_ms: Option<i64>,
        error: Option<Value>,
        context_after: Option<Value>,
    ) -> Result<(), EngineError> {
        if matches!(status, NodeStateStatus::Open) {
            return Err(EngineError::Validation("complete_node_state requires a terminal status".into()));
        }
        let output_hash = output_data.map(hash_of).transpose()?;
        let now = Utc::now();
        let updated = self.with_conn(|conn| {
            diesel::update(node_states::table.find(state_id.0).filter(node_states::status.eq("open")))
                .set((
                    node_states::status.eq(enum_str(status)),
                    node_states::output_hash.eq(&output_hash),
                    node_states::duration_ms.eq(duration_ms),
                    node_states::error_json.eq(&error),
                    node_states::context_after_json.eq(&context_after),
                    node_states::completed_at.eq(Some(now)),
                ))
                .execute(conn)
        })?;
        if updated == 0 {
            return Err(EngineError::Validation(format!("state {state_id} is not open or does not exist")));
        }
        Ok(())
    }

    fn record_routing_event(
        &self,
        state_id: StateId,
        edge_id: EdgeId,
        mode: EdgeMode,
        reason: Option<Value>,
        routing_group_id: Option<RoutingGroupId>,
        ordinal: i32,
    ) -> Result<RoutingEvent, EngineError> {
        let reason_hash = hash_of(&reason.unwrap_or(Value::Null))?;
        let row = RoutingEventRow {
            event_id: Uuid::new_v4(),
            state_id: state_id.0,
            edge_id: edge_id.0,
            routing_group_id: routing_group_id.map(|v| v.0).unwrap_or_else(Uuid::new_v4),
            ordinal,
            mode: enum_str(mode),
            reason_hash,
            reason_ref: None,
        };
        self.with_conn(|conn| diesel::insert_into(routing_events::table).values(&row).execute(conn))?;
        row.into_domain()
    }

    fn record_routing_events(&self, state_id: StateId, routes: &[Route], reason: Option<Value>) -> Result<Vec<RoutingEvent>, EngineError> {
        if routes.is_empty() {
            return Err(EngineError::Validation("record_routing_events requires at least one route".into()));
        }
        if routes.len() > 1 {
            let mut edge_ids: Vec<Uuid> = routes.iter().map(|r| r.edge_id.0).collect();
            edge_ids.sort();
            edge_ids.dedup();
            if edge_ids.len() != routes.len() {
                return Err(EngineError::Validation("routing group has a duplicate edge".into()));
            }
            if !routes.iter().all(|r| matches!(r.mode, EdgeMode::Copy)) {
                return Err(EngineError::Validation("a fork routing group must use mode=copy for every route".into()));
            }
        }
        let routing_group_id = Uuid::new_v4();
        let reason_hash = hash_of(&reason.unwrap_or(Value::Null))?;
        let rows: Vec<RoutingEventRow> = routes
            .iter()
            .enumerate()
            .map(|(ordinal, route)| RoutingEventRow {
                event_id: Uuid::new_v4(),
                state_id: state_id.0,
                edge_id: route.edge_id.0,
                routing_group_id,
                ordinal: ordinal as i32,
                mode: enum_str(route.mode),
                reason_hash: reason_hash.clone(),
                reason_ref: None,
            })
            .collect();
        self.with_conn(|conn| diesel::insert_into(routing_events::table).values(&rows).execute(conn))?;
        rows.into_iter().map(RoutingEventRow::into_domain).collect()
    }

    fn create_batch(&self, run_id: RunId, aggregation_node_id: NodeId, attempt: i32) -> Result<Batch, EngineError> {
        let row = BatchRow {
            batch_id: Uuid::new_v4(),
            run_id: run_id.0,
            aggregation_node_id: aggregation_node_id.0,
            attempt,
            status: enum_str(BatchStatus::Draft),
            created_at: Utc::now(),
            completed_at: None,
            aggregation_state_id: None,
            trigger_reason: None,
        };
        self.with_conn(|conn| diesel::insert_into(batches::table).values(&row).execute(conn))?;
        row.into_domain()
    }

    fn add_batch_member(&self, batch_id: BatchId, token_id: TokenId, ordinal: i32) -> Result<(), EngineError> {
        let row = BatchMemberRow { batch_id: batch_id.0, token_id: token_id.0, ordinal };
        self.with_conn(|conn| diesel::insert_into(batch_members::table).values(&row).execute(conn))?;
        Ok(())
    }

    fn update_batch_status(
        &self,
        batch_id: BatchId,
        status: BatchStatus,
        trigger_reason: Option<String>,
        state_id: Option<StateId>,
    ) -> Result<(), EngineError> {
        self.with_conn_raw(|conn| {
            let current: String = batches::table.find(batch_id.0).select(batches::status).first(conn)?;
            let current_status: BatchStatus = current.as_str().try_into().map_err(|_| diesel::result::Error::RollbackTransaction)?;
            let legal = matches!(
                (current_status, status),
                (BatchStatus::Draft, BatchStatus::Executing)
                    | (BatchStatus::Executing, BatchStatus::Completed)
                    | (BatchStatus::Executing, BatchStatus::Failed)
            );
            if !legal {
                return Err(diesel::result::Error::RollbackTransaction);
            }
            let completed_at = if matches!(status, BatchStatus::Completed | BatchStatus::Failed) { Some(Utc::now()) } else { None };
            diesel::update(batches::table.find(batch_id.0))
                .set((
                    batches::status.eq(enum_str(status)),
                    batches::trigger_reason.eq(&trigger_reason),
                    batches::aggregation_state_id.eq(state_id.map(|s| s.0)),
                    batches::completed_at.eq(completed_at),
                ))
                .execute(conn)
        })
        .map_err(|e| match e {
            diesel::result::Error::RollbackTransaction => {
                EngineError::Validation(format!("illegal batch transition for {batch_id}: -> {status}"))
            }
            other => into_engine_error(PersistenceError::from(other)),
        })?;
        Ok(())
    }

    fn retry_batch(&self, batch_id: BatchId) -> Result<Batch, EngineError> {
        let new_batch_id = Uuid::new_v4();
        self.with_conn_raw(|conn| {
            let original: BatchRow = batches::table.find(batch_id.0).first(conn)?;
            if original.status != "failed" {
                return Err(diesel::result::Error::RollbackTransaction);
            }
            let new_row = BatchRow {
                batch_id: new_batch_id,
                run_id: original.run_id,
                aggregation_node_id: original.aggregation_node_id,
                attempt: original.attempt + 1,
                status: "draft".to_string(),
                created_at: Utc::now(),
                completed_at: None,
                aggregation_state_id: None,
                trigger_reason: None,
            };
            diesel::insert_into(batches::table).values(&new_row).execute(conn)?;
            let members: Vec<BatchMemberRow> = batch_members::table.filter(batch_members::batch_id.eq(batch_id.0)).load(conn)?;
            let copied: Vec<BatchMemberRow> =
                members.into_iter().map(|m| BatchMemberRow { batch_id: new_batch_id, token_id: m.token_id, ordinal: m.ordinal }).collect();
            diesel::insert_into(batch_members::table).values(&copied).execute(conn)?;
            Ok(new_row)
        })
        .map_err(|e| match e {
            diesel::result::Error::RollbackTransaction => EngineError::Validation("retry_batch requires the original batch to be failed".into()),
            other => into_engine_error(PersistenceError::from(other)),
        })
        .and_then(BatchRow::into_domain)
    }

    fn record_call(
        &self,
        state_id: StateId,
        call_type: &str,
        status: CallStatus,
        request_data: Option<&Value>,
        response_data: Option<&Value>,
        error: Option<Value>,
        latency_ms: Option<i64>,
    ) -> Result<Call, EngineError> {
        let request_hash = request_data.map(hash_of).transpose()?;
        let response_hash = response_data.map(hash_of).transpose()?;
        let row = self
            .with_conn_raw(|conn| {
                let call_index: i64 = calls::table.filter(calls::state_id.eq(state_id.0)).count().get_result(conn)?;
                let row = CallRow {
                    call_id: Uuid::new_v4(),
                    state_id: state_id.0,
                    call_index: call_index as i32,
                    call_type: call_type.to_string(),
                    status: enum_str(status),
                    request_hash: request_hash.clone(),
                    request_ref: None,
                    response_hash: response_hash.clone(),
                    response_ref: None,
                    latency_ms,
                    error_json: error.clone(),
                };
                diesel::insert_into(calls::table).values(&row).execute(conn)?;
                Ok(row)
            })
            .map_err(|e| into_engine_error(PersistenceError::from(e)))?;
        row.into_domain()
    }

    fn register_artifact(
        &self,
        run_id: RunId,
        state_id: StateId,
        sink_node_id: NodeId,
        artifact_type: &str,
        path: &str,
        content_hash: &str,
        size_bytes: i64,
    ) -> Result<Artifact, EngineError> {
        let row = ArtifactRow {
            artifact_id: Uuid::new_v4(),
            run_id: run_id.0,
            produced_by_state_id: state_id.0,
            sink_node_id: sink_node_id.0,
            artifact_type: artifact_type.to_string(),
            path_or_uri: path.to_string(),
            content_hash: content_hash.to_string(),
            size_bytes,
        };
        self.with_conn(|conn| diesel::insert_into(artifacts::table).values(&row).execute(conn))?;
        Ok(row.into_domain())
    }

    fn create_checkpoint(
        &self,
        run_id: RunId,
        sequence_number: i64,
        token_id: TokenId,
        node_id: NodeId,
        aggregation_state: Value,
    ) -> Result<Checkpoint, EngineError> {
        let row = CheckpointRow {
            run_id: run_id.0,
            sequence_number,
            token_id: token_id.0,
            node_id: node_id.0,
            aggregation_state_json: aggregation_state,
            created_at: Utc::now(),
        };
        self.with_conn(|conn| diesel::insert_into(checkpoints::table).values(&row).execute(conn))?;
        Ok(row.into_domain())
    }

    fn get_incomplete_batches(&self, run_id: RunId) -> Result<Vec<Batch>, EngineError> {
        let out: Vec<BatchRow> = self.with_conn(|conn| {
            batches::table
                .filter(batches::run_id.eq(run_id.0))
                .filter(batches::status.eq_any(["draft", "executing", "failed"]))
                .order(batches::created_at.asc())
                .load(conn)
        })?;
        out.into_iter().map(BatchRow::into_domain).collect()
    }

    fn get_nodes(&self, run_id: RunId) -> Result<Vec<Node>, EngineError> {
        let out: Vec<NodeRow> = self.with_conn(|conn| {
            nodes::table
                .filter(nodes::run_id.eq(run_id.0))
                .order((nodes::sequence_in_pipeline.is_null().asc(), nodes::sequence_in_pipeline.asc()))
                .load(conn)
        })?;
        out.into_iter().map(NodeRow::into_domain).collect()
    }

    fn get_edges(&self, run_id: RunId) -> Result<Vec<Edge>, EngineError> {
        let out: Vec<EdgeRow> = self.with_conn(|conn| edges::table.filter(edges::run_id.eq(run_id.0)).load(conn))?;
        out.into_iter().map(EdgeRow::into_domain).collect()
    }

    fn get_tokens(&self, row_id: RowId) -> Result<Vec<Token>, EngineError> {
        let out: Vec<TokenRow> = self.with_conn(|conn| tokens::table.filter(tokens::row_id.eq(row_id.0)).load(conn))?;
        Ok(out.into_iter().map(TokenRow::into_domain).collect())
    }

    fn get_token(&self, token_id: TokenId) -> Result<Token, EngineError> {
        let row: TokenRow = self.with_conn(|conn| tokens::table.find(token_id.0).first(conn))?;
        Ok(row.into_domain())
    }

    fn get_node_states(&self, token_id: TokenId) -> Result<Vec<NodeState>, EngineError> {
        let out: Vec<NodeStateRow> = self.with_conn(|conn| {
            node_states::table.filter(node_states::token_id.eq(token_id.0)).order((node_states::step_index.asc(), node_states::attempt.asc())).load(conn)
        })?;
        out.into_iter().map(NodeStateRow::into_domain).collect()
    }

    fn get_routing_events(&self, state_id: StateId) -> Result<Vec<RoutingEvent>, EngineError> {
        let out: Vec<RoutingEventRow> = self.with_conn(|conn| {
            routing_events::table.filter(routing_events::state_id.eq(state_id.0)).order(routing_events::ordinal.asc()).load(conn)
        })?;
        out.into_iter().map(RoutingEventRow::into_domain).collect()
    }

    fn get_calls(&self, state_id: StateId) -> Result<Vec<Call>, EngineError> {
        let out: Vec<CallRow> = self.with_conn(|conn| calls::table.filter(calls::state_id.eq(state_id.0)).order(calls::call_index.asc()).load(conn))?;
        out.into_iter().map(CallRow::into_domain).collect()
    }

    fn get_batch_members(&self, batch_id: BatchId) -> Result<Vec<BatchMember>, EngineError> {
        let out: Vec<BatchMemberRow> = self.with_conn(|conn| {
            batch_members::table.filter(batch_members::batch_id.eq(batch_id.0)).order(batch_members::ordinal.asc()).load(conn)
        })?;
        Ok(out.into_iter().map(BatchMemberRow::into_domain).collect())
    }

    fn get_rows(&self, run_id: RunId) -> Result<Vec<elspeth_core::model::Row>, EngineError> {
        let out: Vec<RowRow> =
            self.with_conn(|conn| rows_table::table.filter(rows_table::run_id.eq(run_id.0)).order(rows_table::row_index.asc()).load(conn))?;
        Ok(out.into_iter().map(RowRow::into_domain).collect())
    }

    fn get_row(&self, row_id: RowId) -> Result<elspeth_core::model::Row, EngineError> {
        let row: RowRow = self.with_conn(|conn| rows_table::table.find(row_id.0).first(conn))?;
        Ok(row.into_domain())
    }

    fn get_latest_checkpoint(&self, run_id: RunId) -> Result<Option<Checkpoint>, EngineError> {
        let out: Option<CheckpointRow> = self.with_conn(|conn| {
            checkpoints::table.filter(checkpoints::run_id.eq(run_id.0)).order(checkpoints::sequence_number.desc()).first(conn).optional()
        })?;
        Ok(out.map(CheckpointRow::into_domain))
    }
}

/// Builds an r2d2 pool and runs pending migrations against it.
pub fn build_pool(database_url: &str, min_size: u32, max_size: u32) -> Result<PgPool, PersistenceError> {
    let min = min_size.max(1);
    let max = max_size.max(1).max(min);
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder().min_idle(Some(min)).max_size(max).build(manager).map_err(|e| PersistenceError::TransientIo(format!("pool build: {e}")))?;
    {
        let mut conn = pool.get().map_err(|e| PersistenceError::TransientIo(format!("pool get for migrations: {e}")))?;
        run_pending_migrations(&mut conn)?;
    }
    Ok(pool)
}

/// Loads `.env`, reads `DATABASE_URL` and pool sizing, and builds a migrated pool.
pub fn build_dev_pool_from_env() -> Result<PgPool, PersistenceError> {
    crate::config::init_dotenv();
    let cfg = crate::config::DbConfig::from_env();
    build_pool(&cfg.url, cfg.min_connections, cfg.max_connections)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SingleConnProvider {
        pool: PgPool,
    }

    impl ConnectionProvider for SingleConnProvider {
        fn connection(&self) -> Result<r2d2::PooledConnection<ConnectionManager<PgConnection>>, PersistenceError> {
            self.pool.get().map_err(|e| PersistenceError::TransientIo(e.to_string()))
        }
    }

    fn test_pool() -> Option<PgPool> {
        let url = std::env::var("DATABASE_URL").ok()?;
        build_pool(&url, 1, 2).ok()
    }

    #[test]
    fn begin_run_round_trips_config_hash() {
        let Some(pool) = test_pool() else {
            eprintln!("skipping: DATABASE_URL not set");
            return;
        };
        let recorder = PgRecorder::new(SingleConnProvider { pool });
        let run = recorder.begin_run(serde_json::json!({"pipeline": "t"}), "v1").unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.config_hash.len(), 64);
    }

    #[test]
    fn begin_node_state_rejects_a_second_open_state_for_the_same_token() {
        let Some(pool) = test_pool() else {
            eprintln!("skipping: DATABASE_URL not set");
            return;
        };
        let recorder = PgRecorder::new(SingleConnProvider { pool });
        let run = recorder.begin_run(serde_json::json!({}), "v1").unwrap();
        let node = recorder
            .register_node(run.run_id, "src", NodeType::Source, "1.0.0", serde_json::json!({}), Determinism::Pure, Some(0), None)
            .unwrap();
        let row = recorder.create_row(run.run_id, node.node_id, 0, &serde_json::json!({"x": 1}), None).unwrap();
        let token = recorder.create_token(row.row_id, None, None, None).unwrap();
        recorder.begin_node_state(token.token_id, node.node_id, 0, &serde_json::json!({"x": 1}), 0, None).unwrap();
        let second = recorder.begin_node_state(token.token_id, node.node_id, 1, &serde_json::json!({"x": 1}), 0, None);
        assert!(second.is_err());
    }
}
