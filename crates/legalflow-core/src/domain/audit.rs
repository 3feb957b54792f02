//! Audit report model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Health of a single check or of a whole module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Ok,
    Error,
    /// Not verified automatically.
    Pending,
}

impl CheckStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
            Self::Pending => "pending",
        }
    }
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub id: String,
    pub name: String,
    pub status: CheckStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// All checks of one module plus the aggregated status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleReport {
    pub status: CheckStatus,
    pub checks: Vec<CheckResult>,
}

impl ModuleReport {
    /// Aggregate a module's checks.
    ///
    /// Any failing verified check fails the module. Pending checks never
    /// make a module healthy on their own: a module with nothing but
    /// pending checks stays pending.
    pub fn from_checks(checks: Vec<CheckResult>) -> Self {
        let verified: Vec<CheckStatus> = checks
            .iter()
            .map(|c| c.status)
            .filter(|s| *s != CheckStatus::Pending)
            .collect();

        let status = if verified.contains(&CheckStatus::Error) {
            CheckStatus::Error
        } else if verified.is_empty() {
            CheckStatus::Pending
        } else {
            CheckStatus::Ok
        };
        Self { status, checks }
    }
}

/// Module id -> report. Recomputed on every run, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditResult {
    pub modules: BTreeMap<String, ModuleReport>,
}

impl AuditResult {
    pub fn module(&self, id: &str) -> Option<&ModuleReport> {
        self.modules.get(id)
    }

    pub fn insert(&mut self, id: impl Into<String>, report: ModuleReport) {
        self.modules.insert(id.into(), report);
    }

    /// Number of modules in each status: (ok, error, pending).
    pub fn tally(&self) -> (usize, usize, usize) {
        self.modules
            .values()
            .fold((0, 0, 0), |(ok, err, pending), m| match m.status {
                CheckStatus::Ok => (ok + 1, err, pending),
                CheckStatus::Error => (ok, err + 1, pending),
                CheckStatus::Pending => (ok, err, pending + 1),
            })
    }

    /// True when no module is in error.
    pub fn is_healthy(&self) -> bool {
        self.tally().1 == 0
    }

    /// SHA-256 over the canonical JSON form; identical reports share a digest.
    pub fn digest(&self) -> String {
        // BTreeMap keys and struct fields serialize in a fixed order.
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        hex::encode(hasher.finalize())
    }
}
