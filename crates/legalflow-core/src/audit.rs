//! Per-module health audit.
//!
//! The [`CheckRegistry`] is a fixed table of existence probes, one query per
//! check. [`AuditRunner::run_audit`] executes them in order and folds the
//! outcomes into an [`AuditResult`].
//!
//! Remote query errors stay scoped to their check. A transport failure
//! (backend unreachable) aborts the run: every module is reported as
//! `error` with a generic message and no partial results.

use std::sync::Arc;
use std::time::Instant;

use legalflow_gateway::{DataGateway, GatewayError, SelectQuery, TableRef};
use tracing::{debug, Instrument};

use crate::domain::{
    AuditResult, CheckResult, CheckStatus, ModificationType, ModuleReport, NewModification,
};
use crate::history::{AuditTrailPolicy, HistoryRecorder};
use crate::metrics::METRICS;
use crate::obs;

/// Message placed on every module when the run is aborted.
pub const AUDIT_ABORTED: &str = "Erro ao executar auditoria";

/// How a check is verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckProbe {
    /// Passes when the table returns at least one row.
    RowsExist { table: TableRef },
    /// Not verified automatically; always reports `pending`.
    Manual { reason: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckSpec {
    pub module: &'static str,
    pub id: &'static str,
    pub name: &'static str,
    pub probe: CheckProbe,
}

impl CheckSpec {
    fn rows(module: &'static str, id: &'static str, name: &'static str, table: &str) -> Self {
        let (schema, relation) = table.split_once('.').unwrap_or(("public", table));
        Self {
            module,
            id,
            name,
            probe: CheckProbe::RowsExist {
                table: TableRef::new(schema, relation),
            },
        }
    }

    fn manual(
        module: &'static str,
        id: &'static str,
        name: &'static str,
        reason: &'static str,
    ) -> Self {
        Self {
            module,
            id,
            name,
            probe: CheckProbe::Manual { reason },
        }
    }
}

/// Ordered list of checks, grouped by module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRegistry {
    checks: Vec<CheckSpec>,
}

impl CheckRegistry {
    /// The production check table.
    #[rustfmt::skip]
    pub fn standard() -> Self {
        Self {
            checks: vec![
                CheckSpec::rows("api-library", "endpoints_seeded", "Endpoints cadastrados", "legalflow.api_endpoints"),
                CheckSpec::rows("api-library", "providers_configured", "Provedores configurados", "legalflow.api_providers"),
                CheckSpec::rows("jornadas", "stage_types_seeded", "Tipos de etapa", "legalflow.stage_types"),
                CheckSpec::rows("jornadas", "journey_templates", "Templates de jornada", "legalflow.journey_templates"),
                CheckSpec::manual("jornadas", "stage_triggers", "Triggers de etapa", "Verificação manual necessária"),
                CheckSpec::rows("inbox-legal", "publicacoes_table", "Tabela de publicações", "public.publicacoes"),
                CheckSpec::rows("inbox-legal", "movimentacoes_table", "Tabela de movimentações", "public.movimentacoes"),
                CheckSpec::rows("processos", "processos_table", "Tabela de processos", "public.processos"),
                CheckSpec::rows("processos", "partes_processo", "Partes do processo", "legalflow.partes_processo"),
                CheckSpec::rows("stripe", "stripe_products", "Produtos Stripe", "legalflow.stripe_products"),
                CheckSpec::rows("stripe", "stripe_prices", "Preços Stripe", "legalflow.stripe_prices"),
                CheckSpec::rows("crm", "contacts_table", "Contatos", "legalflow.contacts"),
                CheckSpec::rows("crm", "deals_table", "Oportunidades", "legalflow.deals"),
                CheckSpec::manual("rls", "rls_policies", "Políticas RLS", "Verificação manual necessária"),
            ],
        }
    }

    pub fn from_checks(checks: Vec<CheckSpec>) -> Self {
        Self { checks }
    }

    pub fn checks(&self) -> &[CheckSpec] {
        &self.checks
    }

    /// Module ids in first-seen order, deduplicated.
    pub fn modules(&self) -> Vec<&'static str> {
        let mut modules: Vec<&'static str> = Vec::new();
        for check in &self.checks {
            if !modules.contains(&check.module) {
                modules.push(check.module);
            }
        }
        modules
    }
}

impl Default for CheckRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

/// Runs the registry against a gateway.
pub struct AuditRunner {
    gateway: Arc<dyn DataGateway>,
    history: HistoryRecorder,
    registry: CheckRegistry,
    policy: AuditTrailPolicy,
}

impl AuditRunner {
    pub fn new(gateway: Arc<dyn DataGateway>, history: HistoryRecorder) -> Self {
        Self {
            gateway,
            history,
            registry: CheckRegistry::standard(),
            policy: AuditTrailPolicy::default(),
        }
    }

    pub fn with_registry(mut self, registry: CheckRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_policy(mut self, policy: AuditTrailPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn registry(&self) -> &CheckRegistry {
        &self.registry
    }

    /// Run every check and aggregate per module.
    ///
    /// Errors only when the audit trail is `Required` and the start entry
    /// cannot be written.
    pub async fn run_audit(&self) -> crate::Result<AuditResult> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = obs::operation_span("audit", &run_id);
        self.run_audit_inner(&run_id).instrument(span).await
    }

    async fn run_audit_inner(&self, run_id: &str) -> crate::Result<AuditResult> {
        let started = Instant::now();

        let start_entry = NewModification::new(
            ModificationType::Manual,
            "audit",
            "Auditoria do sistema iniciada",
        )
        .with_context("run_id", run_id)
        .with_context("modules", self.registry.modules());
        self.history.record_with_policy(start_entry, self.policy).await?;

        obs::emit_audit_started(run_id, self.registry.modules().len());
        METRICS.inc_audits();

        let result = match self.collect().await {
            Ok(result) => result,
            Err(err) => {
                obs::emit_audit_aborted(run_id, &err);
                self.all_failed()
            }
        };

        let (ok, error, pending) = result.tally();
        obs::emit_audit_finished(
            run_id,
            ok,
            error,
            pending,
            &result.digest(),
            started.elapsed().as_millis() as u64,
        );
        Ok(result)
    }

    /// Probe every check. Returns early on a transport failure.
    async fn collect(&self) -> Result<AuditResult, GatewayError> {
        let mut grouped: Vec<(&'static str, Vec<CheckResult>)> = Vec::new();

        for spec in self.registry.checks() {
            let outcome = self.probe(spec).await?;
            match grouped.iter_mut().find(|(module, _)| *module == spec.module) {
                Some((_, checks)) => checks.push(outcome),
                None => grouped.push((spec.module, vec![outcome])),
            }
        }

        let mut result = AuditResult::default();
        for (module, checks) in grouped {
            result.insert(module, ModuleReport::from_checks(checks));
        }
        Ok(result)
    }

    async fn probe(&self, spec: &CheckSpec) -> Result<CheckResult, GatewayError> {
        let (status, details) = match &spec.probe {
            CheckProbe::Manual { reason } => (CheckStatus::Pending, Some(reason.to_string())),
            CheckProbe::RowsExist { table } => {
                let query = SelectQuery::from(table.clone()).limit(1);
                match self.gateway.select(&query).await {
                    Ok(rows) if rows.is_empty() => (
                        CheckStatus::Error,
                        Some(format!("Nenhum registro em {table}")),
                    ),
                    Ok(_) => (CheckStatus::Ok, None),
                    Err(err) if err.is_transport() => return Err(err),
                    Err(err) => (CheckStatus::Error, Some(err.provider_message())),
                }
            }
        };
        debug!(module = spec.module, check = spec.id, status = %status, "check evaluated");

        Ok(CheckResult {
            id: spec.id.to_string(),
            name: spec.name.to_string(),
            status,
            details,
        })
    }

    /// Every module in error, one check each carrying [`AUDIT_ABORTED`].
    fn all_failed(&self) -> AuditResult {
        let mut result = AuditResult::default();
        for module in self.registry.modules() {
            let check = CheckResult {
                id: "audit".to_string(),
                name: "Auditoria".to_string(),
                status: CheckStatus::Error,
                details: Some(AUDIT_ABORTED.to_string()),
            };
            result.insert(
                module,
                ModuleReport {
                    status: CheckStatus::Error,
                    checks: vec![check],
                },
            );
        }
        result
    }
}
