//! Structured lifecycle events for audit, autofix and builder operations.
//!
//! Every event carries an `event` field (`audit.started`, `autofix.finished`,
//! ...) so log pipelines can filter on it. Filtering is configured through
//! `LEGALFLOW_LOG` / `RUST_LOG` (see [`crate::telemetry`]).

use tracing::{info, warn};

/// Span tagging every event of one operation with its id.
///
/// Attach it to a future with [`tracing::Instrument`]:
///
/// ```ignore
/// async { /* ... */ }.instrument(operation_span("autofix", &op_id)).await
/// ```
pub fn operation_span(operation: &str, op_id: &str) -> tracing::Span {
    tracing::info_span!("legalflow.op", operation = %operation, op_id = %op_id)
}

pub fn emit_audit_started(run_id: &str, modules: usize) {
    info!(event = "audit.started", run_id = %run_id, modules = modules);
}

/// Emit event: audit finished with per-status module counts.
pub fn emit_audit_finished(
    run_id: &str,
    ok: usize,
    error: usize,
    pending: usize,
    digest: &str,
    duration_ms: u64,
) {
    info!(
        event = "audit.finished",
        run_id = %run_id,
        ok = ok,
        error = error,
        pending = pending,
        digest = %digest,
        duration_ms = duration_ms,
    );
}

/// Emit event: the backend was unreachable and the audit was aborted.
pub fn emit_audit_aborted(run_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "audit.aborted", run_id = %run_id, error = %error);
}

pub fn emit_autofix_dispatched(patch_code: &str) {
    info!(event = "autofix.dispatched", patch_code = %patch_code);
}

pub fn emit_autofix_finished(patch_code: &str, success: bool, changes: usize, errors: usize) {
    info!(
        event = "autofix.finished",
        patch_code = %patch_code,
        success = success,
        changes = changes,
        errors = errors,
    );
}

/// Emit event: a history write failed (warning level).
pub fn emit_history_write_failed(module: &str, error: &dyn std::fmt::Display) {
    warn!(event = "history.write_failed", module = %module, error = %error);
}

/// Emit event: the builder endpoint was skipped or failed and the local
/// simulation answered instead.
pub fn emit_builder_fallback(request_id: &str, reason: &str) {
    warn!(event = "builder.fallback", request_id = %request_id, reason = %reason);
}

pub fn emit_builder_completed(request_id: &str, source: &str, duration_ms: u64) {
    info!(
        event = "builder.completed",
        request_id = %request_id,
        source = %source,
        duration_ms = duration_ms,
    );
}

pub fn emit_schema_checked(table: &str, column: &str, status: &str, sampled: usize) {
    info!(
        event = "schema.checked",
        table = %table,
        column = %column,
        status = %status,
        sampled = sampled,
    );
}

/// Emit event: a compensating delete ran after a failed composite write.
pub fn emit_compensation(table: &str, id: &str, succeeded: bool) {
    warn!(event = "write.compensated", table = %table, id = %id, succeeded = succeeded);
}
