//! Builder prompt executor.
//!
//! Sends one request to the external AI code-generation endpoint. When the
//! credentials look unusable, or the call fails in any way (timeout, network,
//! non-2xx, undecodable body), a local simulation answers instead after a
//! short artificial delay. The response's [`ResponseSource`] always says
//! which of the two produced the result.

use std::time::{Duration, Instant};

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, Instrument};

use crate::domain::{
    BuilderPromptRequest, BuilderPromptResponse, BuilderResult, LegalflowError,
    ModificationType, NewModification, PromptCategory, PromptStatus, ResponseSource,
};
use crate::history::{AuditTrailPolicy, HistoryRecorder};
use crate::metrics::METRICS;
use crate::obs;

pub const DEFAULT_BUILDER_ENDPOINT: &str = "https://builder.io/api/v1/ai-code-gen";
pub const DEFAULT_BUILDER_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_FALLBACK_DELAY: Duration = Duration::from_millis(1500);

/// Keys shorter than this are treated as placeholders.
const MIN_KEY_LEN: usize = 16;
const PLACEHOLDER_MARKERS: [&str; 4] = ["your_", "your-", "placeholder", "example"];

/// Endpoint and credentials for the code-generation service.
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    pub endpoint: String,
    pub public_key: Option<SecretString>,
    pub private_key: Option<SecretString>,
    pub timeout: Duration,
    pub fallback_delay: Duration,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_BUILDER_ENDPOINT.to_string(),
            public_key: None,
            private_key: None,
            timeout: DEFAULT_BUILDER_TIMEOUT,
            fallback_delay: DEFAULT_FALLBACK_DELAY,
        }
    }
}

impl BuilderConfig {
    pub fn new(public_key: impl Into<String>, private_key: impl Into<String>) -> Self {
        Self {
            public_key: Some(SecretString::from(public_key.into())),
            private_key: Some(SecretString::from(private_key.into())),
            ..Self::default()
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_fallback_delay(mut self, delay: Duration) -> Self {
        self.fallback_delay = delay;
        self
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - BUILDER_IO_PUBLIC_KEY, BUILDER_IO_PRIVATE_KEY (optional; missing
    ///   keys route every prompt to the simulation)
    /// - BUILDER_IO_ENDPOINT (optional override)
    /// - BUILDER_IO_TIMEOUT_SECS (optional, default: 10)
    /// - BUILDER_IO_FALLBACK_DELAY_MS (optional, default: 1500)
    pub fn from_env() -> crate::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> crate::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let number = |key: &str| -> crate::Result<Option<u64>> {
            non_empty(key)
                .map(|raw| {
                    raw.trim().parse::<u64>().map_err(|_| {
                        LegalflowError::Config(format!("{key} must be a whole number, got '{raw}'"))
                    })
                })
                .transpose()
        };

        let mut config = Self::default();
        config.public_key = non_empty("BUILDER_IO_PUBLIC_KEY").map(SecretString::from);
        config.private_key = non_empty("BUILDER_IO_PRIVATE_KEY").map(SecretString::from);
        if let Some(endpoint) = non_empty("BUILDER_IO_ENDPOINT") {
            config.endpoint = endpoint;
        }
        if let Some(secs) = number("BUILDER_IO_TIMEOUT_SECS")? {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = number("BUILDER_IO_FALLBACK_DELAY_MS")? {
            config.fallback_delay = Duration::from_millis(ms);
        }
        Ok(config)
    }

    /// Why the configured keys cannot be used, if they cannot.
    pub fn credential_problem(&self) -> Option<String> {
        key_problem("public key", self.public_key.as_ref())
            .or_else(|| key_problem("private key", self.private_key.as_ref()))
    }
}

fn key_problem(label: &str, key: Option<&SecretString>) -> Option<String> {
    let Some(key) = key else {
        return Some(format!("{label} not configured"));
    };
    let raw = key.expose_secret().trim();
    let lower = raw.to_lowercase();
    if raw.is_empty() {
        Some(format!("{label} is empty"))
    } else if PLACEHOLDER_MARKERS.iter().any(|m| lower.contains(m)) {
        Some(format!("{label} looks like a placeholder"))
    } else if raw.len() < MIN_KEY_LEN {
        Some(format!("{label} is too short"))
    } else {
        None
    }
}

/// Body returned by the endpoint; every field is optional.
#[derive(Debug, Default, Deserialize)]
struct EndpointAnswer {
    #[serde(default)]
    modifications: Option<Vec<String>>,
    #[serde(default)]
    files_changed: Option<Vec<String>>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    execution_time: Option<u64>,
}

impl EndpointAnswer {
    fn into_result(self, elapsed: Duration) -> BuilderResult {
        BuilderResult {
            modifications: self.modifications.unwrap_or_default(),
            files_changed: self.files_changed.unwrap_or_default(),
            summary: self
                .summary
                .unwrap_or_else(|| "Código gerado pelo Builder.io".to_string()),
            execution_time_ms: self
                .execution_time
                .unwrap_or(elapsed.as_millis() as u64),
        }
    }
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push_str("...");
    }
    out
}

/// Locally fabricated result used when the endpoint is unavailable.
fn simulated_result(request: &BuilderPromptRequest, delay: Duration) -> BuilderResult {
    let modifications = match request.category {
        PromptCategory::BugFix => vec![
            "Causa do problema identificada".to_string(),
            "Correção aplicada com tratamento de erro".to_string(),
        ],
        PromptCategory::Feature => vec![
            "Componente da nova funcionalidade criado".to_string(),
            "Integração com a camada de dados adicionada".to_string(),
        ],
        PromptCategory::Improvement => vec![
            "Desempenho da consulta otimizado".to_string(),
            "Mensagens de feedback ao usuário aprimoradas".to_string(),
        ],
        PromptCategory::Refactor => vec![
            "Lógica duplicada extraída para função compartilhada".to_string(),
            "Tipos revisados e simplificados".to_string(),
        ],
    };
    let files_changed = request
        .expected_files
        .clone()
        .filter(|files| !files.is_empty())
        .unwrap_or_else(|| vec![format!("client/lib/{}.ts", request.category)]);

    BuilderResult {
        modifications,
        files_changed,
        summary: format!(
            "Simulação local ({}): {}",
            request.category,
            excerpt(&request.prompt, 80)
        ),
        execution_time_ms: delay.as_millis() as u64,
    }
}

/// Runs builder prompts and records each one in the history.
pub struct BuilderPromptExecutor {
    config: BuilderConfig,
    http_client: reqwest::Client,
    history: HistoryRecorder,
    policy: AuditTrailPolicy,
}

impl BuilderPromptExecutor {
    pub fn new(config: BuilderConfig, history: HistoryRecorder) -> crate::Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("legalflow-core/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LegalflowError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            config,
            http_client,
            history,
            policy: AuditTrailPolicy::default(),
        })
    }

    pub fn with_policy(mut self, policy: AuditTrailPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// Execute a prompt. Never fails: endpoint problems fall back to the
    /// simulation, and a blocked audit trail is reported as `Failed`.
    pub async fn execute_builder_prompt(
        &self,
        request: &BuilderPromptRequest,
    ) -> BuilderPromptResponse {
        let id = uuid::Uuid::new_v4().to_string();
        let span = obs::operation_span("builder_prompt", &id);
        self.execute(id.clone(), request).instrument(span).await
    }

    async fn execute(&self, id: String, request: &BuilderPromptRequest) -> BuilderPromptResponse {
        let started = Instant::now();

        let (result, source) = match self.call_endpoint(request).await {
            Ok(result) => (result, ResponseSource::Remote),
            Err(reason) => {
                obs::emit_builder_fallback(&id, &reason);
                METRICS.inc_builder_fallbacks();
                tokio::time::sleep(self.config.fallback_delay).await;
                (
                    simulated_result(request, self.config.fallback_delay),
                    ResponseSource::Simulated { reason },
                )
            }
        };

        let fallback_reason = match &source {
            ResponseSource::Simulated { reason } => serde_json::Value::from(reason.as_str()),
            ResponseSource::Remote => serde_json::Value::Null,
        };
        let entry = NewModification::new(
            ModificationType::BuilderPrompt,
            "builder",
            format!("Prompt Builder.io: {}", excerpt(&request.prompt, 80)),
        )
        .with_changes(result.modifications.clone())
        .with_context("request_id", id.as_str())
        .with_context("category", request.category.as_str())
        .with_context("priority", serde_json::to_value(request.priority).unwrap_or_default())
        .with_metadata("source", source.label())
        .with_metadata("fallback_reason", fallback_reason)
        .with_metadata("files_changed", result.files_changed.clone());

        let (status, error) = match self.history.record_with_policy(entry, self.policy).await {
            Ok(_) => (PromptStatus::Completed, None),
            Err(err) => (PromptStatus::Failed, Some(err.to_string())),
        };

        obs::emit_builder_completed(&id, source.label(), started.elapsed().as_millis() as u64);
        BuilderPromptResponse {
            id,
            status,
            result: Some(result),
            error,
            source,
        }
    }

    /// One attempt against the endpoint; `Err` carries the fallback reason.
    async fn call_endpoint(&self, request: &BuilderPromptRequest) -> Result<BuilderResult, String> {
        if let Some(problem) = self.config.credential_problem() {
            return Err(format!("credentials unusable: {problem}"));
        }
        let private_key = self
            .config
            .private_key
            .as_ref()
            .map(|k| k.expose_secret().to_string())
            .unwrap_or_default();

        let started = Instant::now();
        let exchange = async {
            let response = self
                .http_client
                .post(&self.config.endpoint)
                .bearer_auth(private_key)
                .json(request)
                .send()
                .await
                .map_err(|e| format!("network error: {e}"))?;

            let status = response.status();
            if !status.is_success() {
                return Err(format!("endpoint returned HTTP {}", status.as_u16()));
            }
            response
                .json::<EndpointAnswer>()
                .await
                .map_err(|e| format!("invalid response body: {e}"))
        };

        match tokio::time::timeout(self.config.timeout, exchange).await {
            Ok(Ok(answer)) => {
                debug!(endpoint = %self.config.endpoint, "builder endpoint answered");
                Ok(answer.into_result(started.elapsed()))
            }
            Ok(Err(reason)) => Err(reason),
            Err(_) => Err(format!(
                "timed out after {} ms",
                self.config.timeout.as_millis()
            )),
        }
    }
}
