//! Schema drift detection over sampled rows.

use std::sync::Arc;

use legalflow_core::{
    ColumnStatus, EnumExpectation, SchemaValidator, EXPECTATIONS, SAMPLE_SIZE,
};
use legalflow_gateway::MemoryGateway;
use pretty_assertions::assert_eq;
use serde_json::json;

const DEAL_STAGE: EnumExpectation = EnumExpectation {
    schema: "legalflow",
    table: "deals",
    column: "stage",
    allowed: &["lead", "qualified", "proposal", "negotiation", "won", "lost"],
};

#[tokio::test]
async fn known_values_are_valid() {
    let gw = MemoryGateway::new();
    gw.seed_rows(
        "legalflow.deals",
        vec![json!({"stage": "lead"}), json!({"stage": "won"}), json!({"stage": null})],
    );
    let validator = SchemaValidator::new(Arc::new(gw)).with_expectations(vec![DEAL_STAGE]);

    let report = validator.validate_schema().await;
    assert_eq!(report.checks.len(), 1);
    assert_eq!(report.checks[0].status, ColumnStatus::Valid);
    assert_eq!(report.checks[0].sampled, 3);
    assert!(report.is_consistent());
}

#[tokio::test]
async fn unknown_values_are_reported_sorted() {
    let gw = MemoryGateway::new();
    gw.seed_rows(
        "legalflow.deals",
        vec![
            json!({"stage": "won"}),
            json!({"stage": "ganho"}),
            json!({"stage": "archived"}),
            json!({"stage": "ganho"}),
        ],
    );
    let validator = SchemaValidator::new(Arc::new(gw)).with_expectations(vec![DEAL_STAGE]);

    let report = validator.validate_schema().await;
    let check = &report.checks[0];
    assert_eq!(check.status, ColumnStatus::Mismatch);
    assert_eq!(
        check.unexpected.iter().cloned().collect::<Vec<_>>(),
        vec!["archived".to_string(), "ganho".to_string()]
    );
    assert!(!report.is_consistent());
    assert_eq!(report.mismatches().count(), 1);
}

#[tokio::test]
async fn sample_is_capped() {
    let gw = MemoryGateway::new();
    let rows = (0..SAMPLE_SIZE + 50).map(|_| json!({"stage": "lead"})).collect();
    gw.seed_rows("legalflow.deals", rows);
    let validator = SchemaValidator::new(Arc::new(gw)).with_expectations(vec![DEAL_STAGE]);

    let report = validator.validate_schema().await;
    assert_eq!(report.checks[0].sampled, SAMPLE_SIZE);
}

#[tokio::test]
async fn missing_tables_are_unavailable_not_mismatched() {
    let gw = MemoryGateway::new();
    let validator = SchemaValidator::new(Arc::new(gw));

    let report = validator.validate_schema().await;
    assert_eq!(report.checks.len(), EXPECTATIONS.len());
    for check in &report.checks {
        assert_eq!(check.status, ColumnStatus::Unavailable);
        assert!(check
            .details
            .as_deref()
            .unwrap()
            .contains("Database tables not found"));
    }
    assert!(report.is_consistent());
}
