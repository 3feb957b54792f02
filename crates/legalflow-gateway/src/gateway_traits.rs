//! Gateway trait definitions for LegalFlow
//!
//! The hosted database exposes two kinds of endpoints:
//! - row endpoints, scoped to one table (`select/insert/update/delete`)
//! - named remote procedures (`schema.function`, JSON parameter map)
//!
//! `DataGateway` abstracts both so that every component receives an
//! explicitly constructed client instead of reaching for a global one.
//! An in-memory fake is provided in the `fakes` module.

use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GatewayError;

/// Result type for gateway operations
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// One row as returned by the row API.
pub type Row = serde_json::Map<String, Value>;

/// Schema used when a reference has no `schema.` prefix.
pub const DEFAULT_SCHEMA: &str = "public";

// ---------------------------------------------------------------------------
// Relation references
// ---------------------------------------------------------------------------

/// A schema-qualified relation name (`legalflow.stage_types`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// `schema.name`
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

fn valid_ident(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn split_qualified(s: &str) -> GatewayResult<(String, String)> {
    let (schema, name) = match s.split_once('.') {
        Some((schema, name)) => (schema, name),
        None => (DEFAULT_SCHEMA, s),
    };
    if !valid_ident(schema) || !valid_ident(name) {
        return Err(GatewayError::InvalidTable(s.to_string()));
    }
    Ok((schema.to_string(), name.to_string()))
}

impl FromStr for TableRef {
    type Err = GatewayError;

    fn from_str(s: &str) -> GatewayResult<Self> {
        let (schema, name) = split_qualified(s)?;
        Ok(TableRef { schema, name })
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// A schema-qualified remote procedure name (`legalflow.seed_api_library`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RpcRef {
    pub schema: String,
    pub function: String,
}

impl RpcRef {
    pub fn new(schema: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            function: function.into(),
        }
    }

    pub fn qualified(&self) -> String {
        format!("{}.{}", self.schema, self.function)
    }
}

impl FromStr for RpcRef {
    type Err = GatewayError;

    fn from_str(s: &str) -> GatewayResult<Self> {
        let (schema, function) = split_qualified(s)?;
        Ok(RpcRef { schema, function })
    }
}

impl std::fmt::Display for RpcRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.function)
    }
}

// ---------------------------------------------------------------------------
// Query model
// ---------------------------------------------------------------------------

/// Row filter. Only the operators the engine actually needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    Eq { column: String, value: Value },
    IsNull { column: String },
    NotNull { column: String },
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Filter::IsNull {
            column: column.into(),
        }
    }

    pub fn not_null(column: impl Into<String>) -> Self {
        Filter::NotNull {
            column: column.into(),
        }
    }

    pub fn column(&self) -> &str {
        match self {
            Filter::Eq { column, .. }
            | Filter::IsNull { column }
            | Filter::NotNull { column } => column,
        }
    }

    /// Evaluate the filter against a row.
    ///
    /// A missing column behaves like SQL NULL.
    pub fn matches(&self, row: &Row) -> bool {
        let cell = row.get(self.column()).unwrap_or(&Value::Null);
        match self {
            Filter::Eq { value, .. } => !cell.is_null() && cell == value,
            Filter::IsNull { .. } => cell.is_null(),
            Filter::NotNull { .. } => !cell.is_null(),
        }
    }
}

/// Sort order on a single column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub column: String,
    pub descending: bool,
}

impl Order {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: false,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
        }
    }
}

/// A select against one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectQuery {
    pub table: TableRef,
    /// Columns to project; empty means `*`.
    pub columns: Vec<String>,
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl SelectQuery {
    pub fn from(table: TableRef) -> Self {
        Self {
            table,
            columns: Vec::new(),
            filters: Vec::new(),
            order: None,
            limit: None,
            offset: None,
        }
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = Some(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// The projection as the row API expects it.
    pub fn select_clause(&self) -> String {
        if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns.join(",")
        }
    }
}

// ---------------------------------------------------------------------------
// DataGateway
// ---------------------------------------------------------------------------

/// Remote data platform client.
///
/// Guarantees:
/// - Every call is a single attempt; no retry is performed.
/// - `insert`, `update` and `delete` return the affected rows.
/// - Errors the backend reports come back as `GatewayError::Remote`;
///   an unreachable backend yields `GatewayError::Transport`.
#[async_trait]
pub trait DataGateway: Send + Sync {
    /// Read rows matching the query.
    async fn select(&self, query: &SelectQuery) -> GatewayResult<Vec<Row>>;

    /// Insert rows, returning them as stored.
    async fn insert(&self, table: &TableRef, rows: Vec<Row>) -> GatewayResult<Vec<Row>>;

    /// Apply `patch` to every row matching all `filters`.
    async fn update(&self, table: &TableRef, patch: Row, filters: &[Filter])
        -> GatewayResult<Vec<Row>>;

    /// Delete every row matching all `filters`.
    async fn delete(&self, table: &TableRef, filters: &[Filter]) -> GatewayResult<Vec<Row>>;

    /// Invoke a named remote procedure.
    async fn rpc(&self, function: &RpcRef, params: Value) -> GatewayResult<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(v: Value) -> Row {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn table_ref_parses_schema_prefix() {
        let t: TableRef = "legalflow.stage_types".parse().unwrap();
        assert_eq!(t.schema, "legalflow");
        assert_eq!(t.name, "stage_types");
        assert_eq!(t.to_string(), "legalflow.stage_types");
    }

    #[test]
    fn table_ref_defaults_to_public() {
        let t: TableRef = "processos".parse().unwrap();
        assert_eq!(t.schema, "public");
        assert_eq!(t.qualified(), "public.processos");
    }

    #[test]
    fn table_ref_rejects_garbage() {
        assert!("legalflow.".parse::<TableRef>().is_err());
        assert!("drop table;".parse::<TableRef>().is_err());
        assert!("a.b.c".parse::<TableRef>().is_err());
    }

    #[test]
    fn rpc_ref_round_trips_display() {
        let r: RpcRef = "legalflow.seed_api_library".parse().unwrap();
        assert_eq!(r.function, "seed_api_library");
        assert_eq!(r.qualified(), "legalflow.seed_api_library");
    }

    #[test]
    fn filters_treat_missing_column_as_null() {
        let r = row(json!({"status": "active"}));
        assert!(Filter::is_null("trigger_rules").matches(&r));
        assert!(!Filter::not_null("trigger_rules").matches(&r));
        assert!(Filter::eq("status", "active").matches(&r));
        assert!(!Filter::eq("missing", "x").matches(&r));
    }

    #[test]
    fn select_clause_defaults_to_star() {
        let t: TableRef = "autofix_history".parse().unwrap();
        assert_eq!(SelectQuery::from(t.clone()).select_clause(), "*");
        assert_eq!(
            SelectQuery::from(t).columns(["id", "type"]).select_clause(),
            "id,type"
        );
    }
}
