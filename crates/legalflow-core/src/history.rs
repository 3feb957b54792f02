//! Append-only modification history stored in `public.autofix_history`.
//!
//! Every audit run, autofix patch, builder prompt and git import leaves one
//! or more [`ModificationEntry`] rows behind. Entries are stamped client-side
//! (UUIDv4 and UTC timestamp) and written with a single insert; there is no
//! retry. Backend failures are classified into [`HistoryError`] so callers
//! can tell an unprovisioned database from a missing grant.

use std::str::FromStr;
use std::sync::Arc;

use legalflow_gateway::{DataGateway, Filter, GatewayError, Order, Row, SelectQuery, TableRef};
use serde_json::Value;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::domain::{
    GitImport, HistoryError, HistoryQuery, LegalflowError, ModificationEntry, ModificationType,
    NewModification, SystemStats,
};
use crate::metrics::METRICS;
use crate::obs;

/// Schema-qualified name of the history table.
pub const HISTORY_TABLE: &str = "public.autofix_history";

/// Rows fetched per request when scanning the whole history.
pub const STATS_PAGE_SIZE: usize = 1000;

/// Whether a failed history write blocks the action that triggered it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuditTrailPolicy {
    /// Warn and carry on.
    #[default]
    BestEffort,
    /// Abort the action with [`LegalflowError::AuditTrail`].
    Required,
}

impl AuditTrailPolicy {
    pub const ENV_VAR: &'static str = "LEGALFLOW_AUDIT_TRAIL";

    pub fn from_env() -> crate::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve the policy through an arbitrary variable lookup. Unset means
    /// [`AuditTrailPolicy::BestEffort`].
    pub fn from_lookup<F>(lookup: F) -> crate::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        match lookup(Self::ENV_VAR) {
            None => Ok(Self::default()),
            Some(raw) if raw.trim().is_empty() => Ok(Self::default()),
            Some(raw) => raw.parse().map_err(LegalflowError::Config),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::BestEffort => "best_effort",
            Self::Required => "required",
        }
    }
}

impl FromStr for AuditTrailPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "best_effort" | "best-effort" => Ok(Self::BestEffort),
            "required" => Ok(Self::Required),
            other => Err(format!(
                "invalid {} value '{other}' (expected best_effort or required)",
                Self::ENV_VAR
            )),
        }
    }
}

/// Map a gateway failure on `table` onto the history taxonomy.
///
/// Codes are checked first (`42P01`/`PGRST205` for a missing relation,
/// `42501` for a missing grant), then the provider's message text.
pub fn classify_gateway_error(table: &str, err: GatewayError) -> HistoryError {
    let message = err.provider_message();
    let lower = message.to_lowercase();

    let missing = matches!(err.code(), Some("42P01" | "PGRST205"))
        || (lower.contains("relation") && lower.contains("does not exist"));
    if missing {
        return HistoryError::TablesMissing {
            table: table.to_string(),
            message,
        };
    }

    if err.code() == Some("42501") || lower.contains("permission denied") {
        return HistoryError::PermissionDenied {
            table: table.to_string(),
            message,
        };
    }

    match err {
        GatewayError::Decode(msg) => HistoryError::Decode(msg),
        _ => HistoryError::Remote(message),
    }
}

/// Reads and writes the modification history.
#[derive(Clone)]
pub struct HistoryRecorder {
    gateway: Arc<dyn DataGateway>,
    table: TableRef,
}

impl std::fmt::Debug for HistoryRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryRecorder")
            .field("table", &self.table.qualified())
            .finish()
    }
}

impl HistoryRecorder {
    pub fn new(gateway: Arc<dyn DataGateway>) -> Self {
        Self {
            gateway,
            table: TableRef::new("public", "autofix_history"),
        }
    }

    /// Point the recorder at a different table (staging copies, tests).
    pub fn with_table(mut self, table: TableRef) -> Self {
        self.table = table;
        self
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    fn classify(&self, err: GatewayError) -> HistoryError {
        classify_gateway_error(&self.table.qualified(), err)
    }

    /// Stamp and insert one entry, returning its id.
    #[instrument(
        skip(self, modification),
        fields(kind = %modification.kind, module = %modification.module)
    )]
    pub async fn record_modification(
        &self,
        modification: NewModification,
    ) -> Result<Uuid, HistoryError> {
        let entry = modification.into_entry();
        let row = match serde_json::to_value(&entry) {
            Ok(Value::Object(row)) => row,
            Ok(other) => {
                return Err(HistoryError::Decode(format!(
                    "history entry serialized to {other}, expected an object"
                )))
            }
            Err(e) => return Err(HistoryError::Decode(e.to_string())),
        };

        self.gateway
            .insert(&self.table, vec![row])
            .await
            .map_err(|e| self.classify(e))?;

        METRICS.inc_history_writes();
        debug!(id = %entry.id, "modification recorded");
        Ok(entry.id)
    }

    /// Newest-first page of the history.
    #[instrument(skip(self))]
    pub async fn get_modification_history(
        &self,
        query: &HistoryQuery,
    ) -> Result<Vec<ModificationEntry>, HistoryError> {
        let mut select = SelectQuery::from(self.table.clone())
            .order(Order::desc("timestamp"))
            .limit(query.limit)
            .offset(query.offset);
        if let Some(module) = &query.module {
            select = select.filter(Filter::eq("module", module.as_str()));
        }
        if let Some(kind) = query.kind {
            select = select.filter(Filter::eq("type", kind.as_str()));
        }

        let rows = self
            .gateway
            .select(&select)
            .await
            .map_err(|e| self.classify(e))?;

        rows.into_iter()
            .map(|row| {
                serde_json::from_value(Value::Object(row))
                    .map_err(|e| HistoryError::Decode(e.to_string()))
            })
            .collect()
    }

    /// Aggregate counts over every entry.
    ///
    /// The table is read in pages ordered by id until an empty page comes
    /// back. The server may return fewer rows than asked for (PostgREST
    /// `max-rows`), so a short page does not end the scan.
    #[instrument(skip(self))]
    pub async fn get_system_stats(&self) -> Result<SystemStats, HistoryError> {
        let mut stats = SystemStats::default();
        let mut offset = 0;
        loop {
            let select = SelectQuery::from(self.table.clone())
                .columns(["id", "type", "module", "success", "timestamp"])
                .order(Order::asc("id"))
                .limit(STATS_PAGE_SIZE)
                .offset(offset);
            let rows = self
                .gateway
                .select(&select)
                .await
                .map_err(|e| self.classify(e))?;
            if rows.is_empty() {
                break;
            }
            offset += rows.len();
            for row in &rows {
                let (kind, module, success, at) = stats_fields(row)?;
                stats.observe(kind, &module, success, at);
            }
        }
        debug!(total = stats.total_modifications, "system stats aggregated");
        Ok(stats)
    }

    /// Record a batch of imported commits as one `git_import` entry.
    pub async fn record_git_import(&self, import: &GitImport) -> Result<Uuid, HistoryError> {
        let description = format!(
            "Imported {} commit(s) from {}@{}",
            import.commits.len(),
            import.repository,
            import.branch
        );
        let modification = NewModification::new(ModificationType::GitImport, "git", description)
            .with_changes(import.files_changed.clone())
            .with_context("repository", import.repository.as_str())
            .with_context("branch", import.branch.as_str())
            .with_metadata("commits", import.commits.clone())
            .with_metadata("files_changed", import.files_changed.len() as u64);
        self.record_modification(modification).await
    }

    /// Write an entry under `policy`.
    ///
    /// Under [`AuditTrailPolicy::BestEffort`] a failed write is logged and
    /// reported as `Ok(None)`. Under [`AuditTrailPolicy::Required`] it
    /// becomes [`LegalflowError::AuditTrail`].
    pub async fn record_with_policy(
        &self,
        modification: NewModification,
        policy: AuditTrailPolicy,
    ) -> crate::Result<Option<Uuid>> {
        let module = modification.module.clone();
        match self.record_modification(modification).await {
            Ok(id) => Ok(Some(id)),
            Err(err) => {
                METRICS.inc_history_write_failures();
                obs::emit_history_write_failed(&module, &err);
                match policy {
                    AuditTrailPolicy::BestEffort => Ok(None),
                    AuditTrailPolicy::Required => Err(LegalflowError::AuditTrail(err.to_string())),
                }
            }
        }
    }
}

fn stats_fields(
    row: &Row,
) -> Result<(ModificationType, String, bool, chrono::DateTime<chrono::Utc>), HistoryError> {
    let kind_raw = row.get("type").and_then(Value::as_str).unwrap_or_default();
    let kind = ModificationType::from_db_value(kind_raw)
        .ok_or_else(|| HistoryError::Decode(format!("unknown modification type '{kind_raw}'")))?;
    let module = row
        .get("module")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let success = row.get("success").and_then(Value::as_bool).unwrap_or(false);
    let ts_raw = row.get("timestamp").and_then(Value::as_str).unwrap_or_default();
    let at = chrono::DateTime::parse_from_rfc3339(ts_raw)
        .map(|ts| ts.with_timezone(&chrono::Utc))
        .map_err(|e| HistoryError::Decode(format!("bad timestamp '{ts_raw}': {e}")))?;
    Ok((kind, module, success, at))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_relation_by_code_or_text() {
        let err = classify_gateway_error(
            HISTORY_TABLE,
            GatewayError::remote_with_code(404, "PGRST205", "Could not find the table"),
        );
        assert!(matches!(err, HistoryError::TablesMissing { .. }));

        let err = classify_gateway_error(
            HISTORY_TABLE,
            GatewayError::remote(400, "relation \"public.autofix_history\" does not exist"),
        );
        assert!(err.to_string().contains("Database tables not found"));
    }

    #[test]
    fn permission_denied_by_code_or_text() {
        let err = classify_gateway_error(
            HISTORY_TABLE,
            GatewayError::remote_with_code(403, "42501", "nope"),
        );
        assert!(matches!(err, HistoryError::PermissionDenied { .. }));

        let err = classify_gateway_error(
            HISTORY_TABLE,
            GatewayError::remote(401, "permission denied for table autofix_history"),
        );
        assert!(matches!(err, HistoryError::PermissionDenied { .. }));
    }

    #[test]
    fn other_failures_keep_provider_message() {
        let err = classify_gateway_error(
            HISTORY_TABLE,
            GatewayError::remote(500, "upstream exploded"),
        );
        assert_eq!(err, HistoryError::Remote("upstream exploded".to_string()));

        let err = classify_gateway_error(
            HISTORY_TABLE,
            GatewayError::Transport("connection refused".to_string()),
        );
        assert!(matches!(err, HistoryError::Remote(m) if m.contains("connection refused")));
    }

    #[test]
    fn policy_parses_env_values() {
        let policy = AuditTrailPolicy::from_lookup(|_| Some("required".to_string())).unwrap();
        assert_eq!(policy, AuditTrailPolicy::Required);

        let policy = AuditTrailPolicy::from_lookup(|_| None).unwrap();
        assert_eq!(policy, AuditTrailPolicy::BestEffort);

        let err = AuditTrailPolicy::from_lookup(|_| Some("always".to_string())).unwrap_err();
        assert!(matches!(err, LegalflowError::Config(_)));
    }
}
