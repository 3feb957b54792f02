//! Autofix dispatcher.
//!
//! A patch code is parsed into the closed [`PatchCode`] enum and dispatched
//! to one of three kinds of handler: a remote seed procedure, a direct
//! corrective update, or a placeholder acknowledgment. Each dispatch leaves
//! two history entries, a `started` marker before and a `completed` entry
//! after.

use std::sync::Arc;

use legalflow_gateway::{DataGateway, Filter, GatewayError, Row, RpcRef, TableRef};
use serde_json::{json, Value};
use tracing::Instrument;

use crate::domain::{AutofixResult, ModificationType, NewModification, PatchCode};
use crate::history::{AuditTrailPolicy, HistoryRecorder};
use crate::metrics::METRICS;
use crate::obs;

/// Patch codes with a one-line description, in catalogue order.
pub fn catalogue() -> Vec<(PatchCode, &'static str)> {
    PatchCode::ALL
        .into_iter()
        .map(|code| (code, code.description()))
        .collect()
}

/// Map a seed procedure's JSON answer onto an [`AutofixResult`].
///
/// Recognised fields: `success` (default `true`), `message`, `changes`
/// (list or count), `created` / `inserted` (count or label), `errors`
/// (list) and `error` (string). A failure always carries at least one error.
pub fn result_from_rpc(value: &Value, default_message: &str) -> AutofixResult {
    let Some(obj) = value.as_object() else {
        let changes = match value {
            Value::Null => Vec::new(),
            Value::Array(items) => items.iter().map(display_value).collect(),
            other => vec![display_value(other)],
        };
        return AutofixResult::succeeded(default_message, changes);
    };

    let success = obj.get("success").and_then(Value::as_bool).unwrap_or(true);
    let message = obj
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or(default_message)
        .to_string();

    let mut changes = Vec::new();
    match obj.get("changes") {
        Some(Value::Array(items)) => changes.extend(items.iter().map(display_value)),
        Some(Value::Number(n)) => changes.push(format!("{n} registros alterados")),
        Some(Value::String(s)) => changes.push(s.clone()),
        _ => {}
    }
    for (field, label) in [("created", "criados"), ("inserted", "inseridos")] {
        match obj.get(field) {
            Some(Value::Number(n)) => changes.push(format!("{n} registros {label}")),
            Some(Value::String(s)) => changes.push(s.clone()),
            _ => {}
        }
    }

    let mut errors = Vec::new();
    if let Some(Value::Array(items)) = obj.get("errors") {
        errors.extend(items.iter().map(display_value));
    }
    if let Some(Value::String(s)) = obj.get("error") {
        errors.push(s.clone());
    }

    if success {
        AutofixResult {
            success,
            message,
            changes,
            errors,
        }
    } else {
        let mut result = AutofixResult::failed(message, errors);
        result.changes = changes;
        result
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn remote_failure(code: PatchCode, err: &GatewayError) -> AutofixResult {
    AutofixResult::failed(
        format!("Falha ao aplicar {code}"),
        vec![err.provider_message()],
    )
}

/// Applies patches and records them in the history.
pub struct AutofixDispatcher {
    gateway: Arc<dyn DataGateway>,
    history: HistoryRecorder,
    policy: AuditTrailPolicy,
}

impl AutofixDispatcher {
    pub fn new(gateway: Arc<dyn DataGateway>, history: HistoryRecorder) -> Self {
        Self {
            gateway,
            history,
            policy: AuditTrailPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: AuditTrailPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Parse and run a patch code.
    ///
    /// Unknown codes are answered with "Patch não encontrado" before any
    /// I/O. `Err` is only returned when the audit trail is `Required` and a
    /// history write fails.
    pub async fn run_autofix(&self, patch_code: &str) -> crate::Result<AutofixResult> {
        match patch_code.parse::<PatchCode>() {
            Ok(code) => self.run(code).await,
            Err(_) => Ok(AutofixResult::not_found(patch_code)),
        }
    }

    /// Run a known patch with its two history entries.
    pub async fn run(&self, code: PatchCode) -> crate::Result<AutofixResult> {
        let op_id = uuid::Uuid::new_v4().to_string();
        let span = obs::operation_span("autofix", &op_id);
        self.run_logged(code, &op_id).instrument(span).await
    }

    async fn run_logged(&self, code: PatchCode, op_id: &str) -> crate::Result<AutofixResult> {
        let started = NewModification::new(
            ModificationType::Autofix,
            code.module(),
            format!("Autofix {code} iniciado"),
        )
        .with_context("phase", "started")
        .with_context("patch_code", code.as_str())
        .with_context("op_id", op_id);
        self.history.record_with_policy(started, self.policy).await?;

        obs::emit_autofix_dispatched(code.as_str());
        let result = self.apply(code).await;
        METRICS.inc_autofixes();
        obs::emit_autofix_finished(
            code.as_str(),
            result.success,
            result.changes.len(),
            result.errors.len(),
        );

        let completed = NewModification::new(
            ModificationType::Autofix,
            code.module(),
            format!("Autofix {code} concluído"),
        )
        .with_success(result.success)
        .with_changes(result.changes.clone())
        .with_context("phase", "completed")
        .with_context("patch_code", code.as_str())
        .with_context("op_id", op_id)
        .with_metadata("message", result.message.as_str())
        .with_metadata("errors", result.errors.clone());
        self.history.record_with_policy(completed, self.policy).await?;

        Ok(result)
    }

    /// Dispatch without touching the history.
    pub async fn apply(&self, code: PatchCode) -> AutofixResult {
        match code {
            PatchCode::ApiSeed => {
                self.seed(
                    code,
                    RpcRef::new("legalflow", "seed_api_library"),
                    "API Library populada com sucesso",
                )
                .await
            }
            PatchCode::StripeSeed => {
                self.seed(
                    code,
                    RpcRef::new("legalflow", "seed_stripe_data"),
                    "Dados Stripe populados com sucesso",
                )
                .await
            }
            PatchCode::JourneyTriggersFix => self.fix_journey_triggers().await,
            PatchCode::InboxPublicationsFix => AutofixResult::succeeded(
                "Inbox de publicações verificada",
                vec!["Nenhuma alteração necessária nas publicações".to_string()],
            ),
            PatchCode::ProcessMovementsSync => AutofixResult::succeeded(
                "Sincronização de movimentações verificada",
                vec!["Movimentações já sincronizadas".to_string()],
            ),
            PatchCode::StripeMirrorFix => AutofixResult::succeeded(
                "Espelho Stripe verificado",
                vec!["Nenhuma divergência encontrada".to_string()],
            ),
            PatchCode::CrmDataFix => AutofixResult::succeeded(
                "Dados do CRM verificados",
                vec!["Nenhuma inconsistência encontrada".to_string()],
            ),
            PatchCode::RlsBasicSetup => AutofixResult::succeeded(
                "Configuração básica de RLS verificada",
                vec!["Políticas RLS mantidas".to_string()],
            ),
        }
    }

    async fn seed(&self, code: PatchCode, function: RpcRef, ok_message: &str) -> AutofixResult {
        match self.gateway.rpc(&function, json!({})).await {
            Ok(value) => result_from_rpc(&value, ok_message),
            Err(err) => remote_failure(code, &err),
        }
    }

    /// Give every stage type without trigger rules an empty rule list.
    async fn fix_journey_triggers(&self) -> AutofixResult {
        let table = TableRef::new("legalflow", "stage_types");
        let mut patch = Row::new();
        patch.insert("trigger_rules".to_string(), json!([]));

        match self
            .gateway
            .update(&table, patch, &[Filter::is_null("trigger_rules")])
            .await
        {
            Ok(rows) => AutofixResult::succeeded(
                "Triggers de jornada corrigidos",
                vec![format!(
                    "{} tipos de etapa atualizados com trigger_rules vazio",
                    rows.len()
                )],
            ),
            Err(err) => remote_failure(PatchCode::JourneyTriggersFix, &err),
        }
    }
}
