//! Builder prompt request/response contract.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptPriority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptCategory {
    BugFix,
    Feature,
    Improvement,
    Refactor,
}

impl PromptCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BugFix => "bug_fix",
            Self::Feature => "feature",
            Self::Improvement => "improvement",
            Self::Refactor => "refactor",
        }
    }
}

impl std::fmt::Display for PromptCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A code-generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderPromptRequest {
    pub prompt: String,
    #[serde(default)]
    pub context: String,
    pub priority: PromptPriority,
    pub category: PromptCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_files: Option<Vec<String>>,
}

impl BuilderPromptRequest {
    pub fn new(prompt: impl Into<String>, category: PromptCategory) -> Self {
        Self {
            prompt: prompt.into(),
            context: String::new(),
            priority: PromptPriority::Medium,
            category,
            expected_files: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn with_priority(mut self, priority: PromptPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_expected_files(mut self, files: Vec<String>) -> Self {
        self.expected_files = Some(files);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// What the code generator produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderResult {
    pub modifications: Vec<String>,
    pub files_changed: Vec<String>,
    pub summary: String,
    pub execution_time_ms: u64,
}

/// Where a response came from. Callers can always tell a real result
/// from a locally simulated one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponseSource {
    Remote,
    Simulated { reason: String },
}

impl ResponseSource {
    pub fn is_simulated(&self) -> bool {
        matches!(self, ResponseSource::Simulated { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            ResponseSource::Remote => "remote",
            ResponseSource::Simulated { .. } => "simulated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderPromptResponse {
    pub id: String,
    pub status: PromptStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<BuilderResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub source: ResponseSource,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_wire_names() {
        let request = BuilderPromptRequest::new("Corrigir filtro de prazos", PromptCategory::BugFix)
            .with_priority(PromptPriority::High)
            .with_expected_files(vec!["client/pages/Prazos.tsx".to_string()]);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["category"], "bug_fix");
        assert_eq!(value["priority"], "high");
        assert_eq!(value["expected_files"][0], "client/pages/Prazos.tsx");
    }

    #[test]
    fn source_is_tagged() {
        let simulated = ResponseSource::Simulated {
            reason: "timeout".to_string(),
        };
        let value = serde_json::to_value(&simulated).unwrap();
        assert_eq!(value["kind"], "simulated");
        assert_eq!(value["reason"], "timeout");
        assert!(simulated.is_simulated());
        assert_eq!(
            serde_json::to_value(ResponseSource::Remote).unwrap()["kind"],
            "remote"
        );
    }
}
