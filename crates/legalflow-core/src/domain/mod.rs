//! Domain models for LegalFlow operations.
//!
//! - `ModificationEntry`: one immutable row of the modification history
//! - `AuditResult`: per-module health report
//! - `PatchCode` / `AutofixResult`: the autofix catalogue and its outcomes
//! - `BuilderPromptRequest` / `BuilderPromptResponse`: code-generation contract

pub mod audit;
pub mod autofix;
pub mod builder;
pub mod error;
pub mod modification;

pub use audit::{AuditResult, CheckResult, CheckStatus, ModuleReport};
pub use autofix::{AutofixResult, PatchCode, UnknownPatch, PATCH_NOT_FOUND};
pub use builder::{
    BuilderPromptRequest, BuilderPromptResponse, BuilderResult, PromptCategory, PromptPriority,
    PromptStatus, ResponseSource,
};
pub use error::{HistoryError, LegalflowError, Result};
pub use modification::{
    GitImport, HistoryQuery, ModificationEntry, ModificationType, NewModification, SystemStats,
    DEFAULT_HISTORY_LIMIT,
};
