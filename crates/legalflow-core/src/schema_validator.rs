//! Compares remote column values against the enumerations the engine and
//! the dashboard rely on.
//!
//! Each expectation samples up to [`SAMPLE_SIZE`] rows of one column and
//! reports any distinct value outside the allowed set.

use std::collections::BTreeSet;
use std::sync::Arc;

use legalflow_gateway::{DataGateway, SelectQuery, TableRef};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::history::classify_gateway_error;
use crate::obs;

/// Rows sampled per expectation.
pub const SAMPLE_SIZE: usize = 200;

/// One closed enumeration stored in a text column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumExpectation {
    pub schema: &'static str,
    pub table: &'static str,
    pub column: &'static str,
    pub allowed: &'static [&'static str],
}

impl EnumExpectation {
    pub fn table_ref(&self) -> TableRef {
        TableRef::new(self.schema, self.table)
    }
}

pub const EXPECTATIONS: &[EnumExpectation] = &[
    EnumExpectation {
        schema: "public",
        table: "autofix_history",
        column: "type",
        allowed: &["autofix", "manual", "builder_prompt", "git_import"],
    },
    EnumExpectation {
        schema: "legalflow",
        table: "journey_instances",
        column: "status",
        allowed: &["active", "paused", "completed", "cancelled"],
    },
    EnumExpectation {
        schema: "legalflow",
        table: "stage_instances",
        column: "status",
        allowed: &["pending", "in_progress", "completed", "skipped", "blocked"],
    },
    EnumExpectation {
        schema: "legalflow",
        table: "stripe_subscriptions",
        column: "status",
        allowed: &[
            "trialing",
            "active",
            "past_due",
            "canceled",
            "unpaid",
            "incomplete",
            "incomplete_expired",
            "paused",
        ],
    },
    EnumExpectation {
        schema: "legalflow",
        table: "deals",
        column: "stage",
        allowed: &["lead", "qualified", "proposal", "negotiation", "won", "lost"],
    },
    EnumExpectation {
        schema: "legalflow",
        table: "conversation_threads",
        column: "status",
        allowed: &["open", "pending", "resolved", "archived"],
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnStatus {
    Valid,
    Mismatch,
    /// The sample query failed.
    Unavailable,
}

impl ColumnStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Mismatch => "mismatch",
            Self::Unavailable => "unavailable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnCheck {
    pub table: String,
    pub column: String,
    pub status: ColumnStatus,
    pub sampled: usize,
    pub unexpected: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaValidationReport {
    pub checks: Vec<ColumnCheck>,
}

impl SchemaValidationReport {
    /// True when no sampled column holds an unexpected value.
    pub fn is_consistent(&self) -> bool {
        self.checks
            .iter()
            .all(|c| c.status != ColumnStatus::Mismatch)
    }

    pub fn mismatches(&self) -> impl Iterator<Item = &ColumnCheck> {
        self.checks
            .iter()
            .filter(|c| c.status == ColumnStatus::Mismatch)
    }
}

/// Distinct non-null string values of `column` that are not in `allowed`.
fn unexpected_values(
    rows: &[legalflow_gateway::Row],
    column: &str,
    allowed: &[&str],
) -> BTreeSet<String> {
    rows.iter()
        .filter_map(|row| match row.get(column) {
            Some(Value::String(s)) => Some(s.as_str()),
            _ => None,
        })
        .filter(|value| !allowed.contains(value))
        .map(str::to_string)
        .collect()
}

pub struct SchemaValidator {
    gateway: Arc<dyn DataGateway>,
    expectations: Vec<EnumExpectation>,
}

impl SchemaValidator {
    pub fn new(gateway: Arc<dyn DataGateway>) -> Self {
        Self {
            gateway,
            expectations: EXPECTATIONS.to_vec(),
        }
    }

    pub fn with_expectations(mut self, expectations: Vec<EnumExpectation>) -> Self {
        self.expectations = expectations;
        self
    }

    pub async fn validate_schema(&self) -> SchemaValidationReport {
        let mut report = SchemaValidationReport::default();
        for expectation in &self.expectations {
            report.checks.push(self.check(expectation).await);
        }
        report
    }

    async fn check(&self, expectation: &EnumExpectation) -> ColumnCheck {
        let table = expectation.table_ref();
        let query = SelectQuery::from(table.clone())
            .columns([expectation.column])
            .limit(SAMPLE_SIZE);

        let check = match self.gateway.select(&query).await {
            Ok(rows) => {
                let unexpected = unexpected_values(&rows, expectation.column, expectation.allowed);
                let status = if unexpected.is_empty() {
                    ColumnStatus::Valid
                } else {
                    ColumnStatus::Mismatch
                };
                ColumnCheck {
                    table: table.qualified(),
                    column: expectation.column.to_string(),
                    status,
                    sampled: rows.len(),
                    unexpected,
                    details: None,
                }
            }
            Err(err) => ColumnCheck {
                table: table.qualified(),
                column: expectation.column.to_string(),
                status: ColumnStatus::Unavailable,
                sampled: 0,
                unexpected: BTreeSet::new(),
                details: Some(classify_gateway_error(&table.qualified(), err).to_string()),
            },
        };

        obs::emit_schema_checked(&check.table, &check.column, check.status.as_str(), check.sampled);
        check
    }
}
