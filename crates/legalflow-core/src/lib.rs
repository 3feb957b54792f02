//! LegalFlow Core Library
//!
//! The operational engine behind the LegalFlow dashboard: module health
//! audits, autofix patches, the modification history, builder prompts,
//! schema drift checks and activity notices. All I/O goes through a
//! [`legalflow_gateway::DataGateway`] injected at construction.

pub mod activity;
pub mod audit;
pub mod autofix;
pub mod builder;
pub mod domain;
pub mod history;
pub mod metrics;
pub mod obs;
pub mod schema_validator;
pub mod telemetry;

pub use domain::{
    AuditResult, AutofixResult, BuilderPromptRequest, BuilderPromptResponse, BuilderResult,
    CheckResult, CheckStatus, GitImport, HistoryError, HistoryQuery, LegalflowError,
    ModificationEntry, ModificationType, ModuleReport, NewModification, PatchCode,
    PromptCategory, PromptPriority, PromptStatus, ResponseSource, Result, SystemStats,
    DEFAULT_HISTORY_LIMIT, PATCH_NOT_FOUND,
};

pub use activity::{ActivityNotices, NewActivity, PostedNotice};
pub use audit::{AuditRunner, CheckProbe, CheckRegistry, CheckSpec, AUDIT_ABORTED};
pub use autofix::{catalogue, result_from_rpc, AutofixDispatcher};
pub use builder::{BuilderConfig, BuilderPromptExecutor, DEFAULT_BUILDER_ENDPOINT};
pub use history::{
    classify_gateway_error, AuditTrailPolicy, HistoryRecorder, HISTORY_TABLE, STATS_PAGE_SIZE,
};
pub use schema_validator::{
    ColumnCheck, ColumnStatus, EnumExpectation, SchemaValidationReport, SchemaValidator,
    EXPECTATIONS, SAMPLE_SIZE,
};

pub use metrics::METRICS;
pub use obs::{
    emit_audit_finished, emit_audit_started, emit_autofix_dispatched, emit_autofix_finished,
    emit_builder_fallback, emit_history_write_failed, operation_span,
};
pub use telemetry::init_tracing;
