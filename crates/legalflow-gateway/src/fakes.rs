//! In-memory fake for the data gateway (testing and dry runs)
//!
//! `MemoryGateway` keeps tables in a `HashMap<qualified name, Vec<Row>>`
//! and mimics the backend's observable failure modes:
//! - querying a table that was never created fails like Postgres
//!   (`42P01`, `relation "..." does not exist`)
//! - denied tables fail with `42501` / `permission denied for table ...`
//! - `set_offline(true)` turns every call into a transport failure
//!
//! RPC functions are registered as closures.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::GatewayError;
use crate::gateway_traits::*;

type RpcHandler = Arc<dyn Fn(&Value) -> GatewayResult<Value> + Send + Sync>;

/// A call observed by the fake, for assertions in tests.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    Select(String),
    Insert(String, usize),
    Update(String),
    Delete(String),
    Rpc(String),
}

#[derive(Default)]
struct State {
    tables: HashMap<String, Vec<Row>>,
    denied: HashSet<String>,
    failing_inserts: HashSet<String>,
    rpcs: HashMap<String, RpcHandler>,
    offline: bool,
    calls: Vec<GatewayCall>,
}

/// In-memory [`DataGateway`].
#[derive(Default, Clone)]
pub struct MemoryGateway {
    state: Arc<Mutex<State>>,
}

impl std::fmt::Debug for MemoryGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("MemoryGateway")
            .field("tables", &state.tables.keys().collect::<Vec<_>>())
            .field("offline", &state.offline)
            .finish()
    }
}

fn relation_missing(table: &str) -> GatewayError {
    GatewayError::Remote {
        status: 404,
        code: Some("42P01".to_string()),
        message: format!("relation \"{table}\" does not exist"),
        details: None,
        hint: None,
    }
}

fn permission_denied(table: &str) -> GatewayError {
    GatewayError::Remote {
        status: 403,
        code: Some("42501".to_string()),
        message: format!("permission denied for table {table}"),
        details: None,
        hint: None,
    }
}

/// Total order over JSON scalars good enough for `ORDER BY`:
/// nulls first, then booleans, numbers and strings.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

fn project(row: &Row, columns: &[String]) -> Row {
    if columns.is_empty() {
        return row.clone();
    }
    columns
        .iter()
        .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(Value::Null)))
        .collect()
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panicking test thread must not wedge the others.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create (or reset) an empty table.
    pub fn create_table(&self, table: &str) -> &Self {
        self.lock().tables.insert(qualify(table), Vec::new());
        self
    }

    /// Create a table if needed and append rows to it.
    pub fn seed_rows(&self, table: &str, rows: Vec<Value>) -> &Self {
        let mut state = self.lock();
        let entry = state.tables.entry(qualify(table)).or_default();
        entry.extend(rows.into_iter().filter_map(|v| v.as_object().cloned()));
        self
    }

    /// Drop a table so queries fail with "relation does not exist".
    pub fn drop_table(&self, table: &str) -> &Self {
        self.lock().tables.remove(&qualify(table));
        self
    }

    /// Make every access to `table` fail with a permission error.
    pub fn deny(&self, table: &str) -> &Self {
        self.lock().denied.insert(qualify(table));
        self
    }

    /// Make inserts into `table` fail with a server error while reads keep working.
    pub fn fail_inserts(&self, table: &str) -> &Self {
        self.lock().failing_inserts.insert(qualify(table));
        self
    }

    /// Simulate an unreachable backend.
    pub fn set_offline(&self, offline: bool) -> &Self {
        self.lock().offline = offline;
        self
    }

    /// Register an RPC handler under `schema.function`.
    pub fn register_rpc<F>(&self, function: &str, handler: F) -> &Self
    where
        F: Fn(&Value) -> GatewayResult<Value> + Send + Sync + 'static,
    {
        self.lock().rpcs.insert(qualify(function), Arc::new(handler));
        self
    }

    /// Snapshot of a table's rows, in insertion order.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.lock()
            .tables
            .get(&qualify(table))
            .cloned()
            .unwrap_or_default()
    }

    /// Calls observed so far.
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.lock().calls.clone()
    }

    fn guard(state: &State, table: &str) -> GatewayResult<()> {
        if state.offline {
            return Err(GatewayError::Transport(
                "error sending request: connection refused".to_string(),
            ));
        }
        if state.denied.contains(table) {
            return Err(permission_denied(table));
        }
        if !state.tables.contains_key(table) {
            return Err(relation_missing(table));
        }
        Ok(())
    }
}

fn qualify(name: &str) -> String {
    if name.contains('.') {
        name.to_string()
    } else {
        format!("{DEFAULT_SCHEMA}.{name}")
    }
}

#[async_trait]
impl DataGateway for MemoryGateway {
    async fn select(&self, query: &SelectQuery) -> GatewayResult<Vec<Row>> {
        let key = query.table.qualified();
        let mut state = self.lock();
        state.calls.push(GatewayCall::Select(key.clone()));
        Self::guard(&state, &key)?;

        let mut rows: Vec<Row> = state.tables[&key]
            .iter()
            .filter(|row| query.filters.iter().all(|f| f.matches(row)))
            .cloned()
            .collect();

        if let Some(order) = &query.order {
            // Newest insert wins ties when sorting descending.
            if order.descending {
                rows.reverse();
            }
            rows.sort_by(|a, b| {
                let a = a.get(&order.column).unwrap_or(&Value::Null);
                let b = b.get(&order.column).unwrap_or(&Value::Null);
                let ord = compare_values(a, b);
                if order.descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }

        Ok(rows
            .iter()
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|row| project(row, &query.columns))
            .collect())
    }

    async fn insert(&self, table: &TableRef, rows: Vec<Row>) -> GatewayResult<Vec<Row>> {
        let key = table.qualified();
        let mut state = self.lock();
        state.calls.push(GatewayCall::Insert(key.clone(), rows.len()));
        Self::guard(&state, &key)?;
        if state.failing_inserts.contains(&key) {
            return Err(GatewayError::remote(500, format!("insert into {key} failed")));
        }
        if let Some(stored) = state.tables.get_mut(&key) {
            stored.extend(rows.iter().cloned());
        }
        Ok(rows)
    }

    async fn update(
        &self,
        table: &TableRef,
        patch: Row,
        filters: &[Filter],
    ) -> GatewayResult<Vec<Row>> {
        let key = table.qualified();
        let mut state = self.lock();
        state.calls.push(GatewayCall::Update(key.clone()));
        Self::guard(&state, &key)?;

        let mut updated = Vec::new();
        if let Some(stored) = state.tables.get_mut(&key) {
            for row in stored.iter_mut() {
                if filters.iter().all(|f| f.matches(row)) {
                    for (column, value) in &patch {
                        row.insert(column.clone(), value.clone());
                    }
                    updated.push(row.clone());
                }
            }
        }
        Ok(updated)
    }

    async fn delete(&self, table: &TableRef, filters: &[Filter]) -> GatewayResult<Vec<Row>> {
        let key = table.qualified();
        let mut state = self.lock();
        state.calls.push(GatewayCall::Delete(key.clone()));
        Self::guard(&state, &key)?;

        let mut removed = Vec::new();
        if let Some(stored) = state.tables.get_mut(&key) {
            let (gone, kept): (Vec<Row>, Vec<Row>) = stored
                .drain(..)
                .partition(|row| filters.iter().all(|f| f.matches(row)));
            *stored = kept;
            removed = gone;
        }
        Ok(removed)
    }

    async fn rpc(&self, function: &RpcRef, params: Value) -> GatewayResult<Value> {
        let key = function.qualified();
        let handler = {
            let mut state = self.lock();
            state.calls.push(GatewayCall::Rpc(key.clone()));
            if state.offline {
                return Err(GatewayError::Transport(
                    "error sending request: connection refused".to_string(),
                ));
            }
            state.rpcs.get(&key).cloned()
        };
        match handler {
            Some(handler) => handler(&params),
            None => Err(GatewayError::UnknownRpc(key)),
        }
    }
}
