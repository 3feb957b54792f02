//! Trait contract tests for DataGateway.
//!
//! These tests pin the behavioral contract every gateway implementation
//! must honor, exercised against the in-memory fake.

use legalflow_gateway::fakes::{GatewayCall, MemoryGateway};
use legalflow_gateway::gateway_traits::*;
use legalflow_gateway::GatewayError;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn table(name: &str) -> TableRef {
    name.parse().unwrap()
}

fn row(value: Value) -> Row {
    value.as_object().cloned().unwrap()
}

// ===========================================================================
// select
// ===========================================================================

#[tokio::test]
async fn select_empty_table_returns_no_rows() {
    let gw = MemoryGateway::new();
    gw.create_table("legalflow.api_endpoints");

    let rows = gw
        .select(&SelectQuery::from(table("legalflow.api_endpoints")).limit(1))
        .await
        .unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn select_applies_all_filters() {
    let gw = MemoryGateway::new();
    gw.seed_rows(
        "autofix_history",
        vec![
            json!({"id": "1", "module": "stripe", "type": "autofix"}),
            json!({"id": "2", "module": "stripe", "type": "manual"}),
            json!({"id": "3", "module": "crm", "type": "autofix"}),
        ],
    );

    let rows = gw
        .select(
            &SelectQuery::from(table("autofix_history"))
                .filter(Filter::eq("module", "stripe"))
                .filter(Filter::eq("type", "autofix")),
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], "1");
}

#[tokio::test]
async fn select_on_unknown_relation_is_a_remote_error() {
    let gw = MemoryGateway::new();
    let err = gw
        .select(&SelectQuery::from(table("public.autofix_history")))
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::Remote { .. }));
    assert!(!err.is_transport());
}

// ===========================================================================
// insert / update / delete
// ===========================================================================

#[tokio::test]
async fn insert_returns_stored_rows() {
    let gw = MemoryGateway::new();
    gw.create_table("legalflow.activities");

    let stored = gw
        .insert(
            &table("legalflow.activities"),
            vec![row(json!({"id": "act-1", "title": "Audiência marcada"}))],
        )
        .await
        .unwrap();

    assert_eq!(stored.len(), 1);
    assert_eq!(gw.rows("legalflow.activities"), stored);
}

#[tokio::test]
async fn failing_inserts_leave_table_untouched() {
    let gw = MemoryGateway::new();
    gw.create_table("legalflow.thread_messages")
        .fail_inserts("legalflow.thread_messages");

    let err = gw
        .insert(
            &table("legalflow.thread_messages"),
            vec![row(json!({"id": "m-1"}))],
        )
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::Remote { status: 500, .. }));
    assert!(gw.rows("legalflow.thread_messages").is_empty());
}

#[tokio::test]
async fn update_without_matches_returns_empty() {
    let gw = MemoryGateway::new();
    gw.seed_rows("legalflow.stage_types", vec![json!({"id": 1, "trigger_rules": []})]);

    let updated = gw
        .update(
            &table("legalflow.stage_types"),
            row(json!({"trigger_rules": []})),
            &[Filter::is_null("trigger_rules")],
        )
        .await
        .unwrap();
    assert!(updated.is_empty());
}

#[tokio::test]
async fn delete_removes_only_matching_rows() {
    let gw = MemoryGateway::new();
    gw.seed_rows(
        "legalflow.activities",
        vec![json!({"id": "a"}), json!({"id": "b"})],
    );

    let removed = gw
        .delete(&table("legalflow.activities"), &[Filter::eq("id", "a")])
        .await
        .unwrap();

    assert_eq!(removed.len(), 1);
    let left = gw.rows("legalflow.activities");
    assert_eq!(left.len(), 1);
    assert_eq!(left[0]["id"], "b");
}

// ===========================================================================
// rpc
// ===========================================================================

#[tokio::test]
async fn rpc_receives_params() {
    let gw = MemoryGateway::new();
    gw.register_rpc("legalflow.create_checkout_session", |params| {
        let price = params["price_id"].as_str().unwrap_or("");
        Ok(json!({"url": format!("https://checkout.test/{price}")}))
    });

    let out = gw
        .rpc(
            &"legalflow.create_checkout_session".parse().unwrap(),
            json!({"price_id": "price_123"}),
        )
        .await
        .unwrap();
    assert_eq!(out["url"], "https://checkout.test/price_123");
}

#[tokio::test]
async fn rpc_errors_propagate_unchanged() {
    let gw = MemoryGateway::new();
    gw.register_rpc("legalflow.seed_api_library", |_| {
        Err(GatewayError::remote_with_code(400, "P0001", "seed failed"))
    });

    let err = gw
        .rpc(&"legalflow.seed_api_library".parse().unwrap(), json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some("P0001"));
}

#[tokio::test]
async fn call_log_records_every_operation() {
    let gw = MemoryGateway::new();
    gw.create_table("t");
    let t = table("t");

    gw.insert(&t, vec![row(json!({"id": 1}))]).await.unwrap();
    gw.select(&SelectQuery::from(t.clone())).await.unwrap();
    gw.update(&t, row(json!({"x": 1})), &[]).await.unwrap();
    gw.delete(&t, &[]).await.unwrap();

    assert_eq!(
        gw.calls(),
        vec![
            GatewayCall::Insert("public.t".to_string(), 1),
            GatewayCall::Select("public.t".to_string()),
            GatewayCall::Update("public.t".to_string()),
            GatewayCall::Delete("public.t".to_string()),
        ]
    );
}
