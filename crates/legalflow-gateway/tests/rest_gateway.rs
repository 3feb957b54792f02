//! RestGateway against a one-shot local HTTP responder.
//!
//! Each test binds a listener on an ephemeral port, answers exactly one
//! request with a canned response, and hands the raw request text back for
//! assertions.

use legalflow_gateway::{
    DataGateway, Filter, GatewayConfig, GatewayError, Order, RestGateway, Row, SelectQuery,
    TableRef,
};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..pos]).to_lowercase();
            let body_len = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= pos + 4 + body_len {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).to_string()
}

async fn serve_once(status: u16, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        let response = format!(
            "HTTP/1.1 {status} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        let _ = socket.shutdown().await;
        request
    });
    (format!("http://{addr}"), handle)
}

fn gateway(base_url: &str) -> RestGateway {
    RestGateway::new(GatewayConfig::new(base_url, "test-service-key")).unwrap()
}

fn table(name: &str) -> TableRef {
    name.parse().unwrap()
}

#[tokio::test]
async fn select_sends_profile_auth_and_query() {
    let (url, server) = serve_once(200, r#"[{"id":"1","module":"stripe"}]"#).await;
    let gw = gateway(&url);

    let rows = gw
        .select(
            &SelectQuery::from(table("legalflow.stripe_products"))
                .filter(Filter::eq("module", "stripe"))
                .order(Order::desc("timestamp"))
                .limit(5),
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["module"], "stripe");

    let request = server.await.unwrap().to_lowercase();
    assert!(request.starts_with("get /rest/v1/stripe_products?"));
    assert!(request.contains("select=*"));
    assert!(request.contains("module=eq.stripe"));
    assert!(request.contains("order=timestamp.desc"));
    assert!(request.contains("limit=5"));
    assert!(request.contains("accept-profile: legalflow"));
    assert!(request.contains("apikey: test-service-key"));
    assert!(request.contains("authorization: bearer test-service-key"));
}

#[tokio::test]
async fn insert_requests_representation() {
    let (url, server) = serve_once(201, r#"[{"id":"abc"}]"#).await;
    let gw = gateway(&url);

    let mut new_row = Row::new();
    new_row.insert("id".into(), json!("abc"));
    let stored = gw
        .insert(&table("autofix_history"), vec![new_row])
        .await
        .unwrap();
    assert_eq!(stored[0]["id"], "abc");

    let request = server.await.unwrap();
    let lower = request.to_lowercase();
    assert!(lower.starts_with("post /rest/v1/autofix_history"));
    assert!(lower.contains("content-profile: public"));
    assert!(lower.contains("prefer: return=representation"));
    assert!(request.contains(r#"[{"id":"abc"}]"#));
}

#[tokio::test]
async fn remote_error_body_is_decoded() {
    let (url, server) = serve_once(
        404,
        r#"{"code":"42P01","message":"relation \"public.autofix_history\" does not exist","details":null,"hint":null}"#,
    )
    .await;
    let gw = gateway(&url);

    let err = gw
        .select(&SelectQuery::from(table("autofix_history")))
        .await
        .unwrap_err();
    server.await.unwrap();

    assert_eq!(err.code(), Some("42P01"));
    assert!(err.provider_message().contains("does not exist"));
}

#[tokio::test]
async fn rpc_posts_to_function_endpoint() {
    let (url, server) = serve_once(200, r#"{"success":true,"created":12}"#).await;
    let gw = gateway(&url);

    let out = gw
        .rpc(
            &"legalflow.seed_api_library".parse().unwrap(),
            serde_json::Value::Null,
        )
        .await
        .unwrap();
    assert_eq!(out["created"], 12);

    let request = server.await.unwrap();
    let lower = request.to_lowercase();
    assert!(lower.starts_with("post /rest/v1/rpc/seed_api_library"));
    assert!(lower.contains("content-profile: legalflow"));
    assert!(request.ends_with("{}"));
}

#[tokio::test]
async fn unexposed_rpc_maps_to_unknown_rpc() {
    let (url, server) = serve_once(
        404,
        r#"{"code":"PGRST202","message":"Could not find the function legalflow.nope without parameters"}"#,
    )
    .await;
    let gw = gateway(&url);

    let err = gw
        .rpc(&"legalflow.nope".parse().unwrap(), json!({}))
        .await
        .unwrap_err();
    server.await.unwrap();
    assert_eq!(err, GatewayError::UnknownRpc("legalflow.nope".to_string()));
}

#[tokio::test]
async fn unreachable_backend_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let gw = gateway(&format!("http://{addr}"));
    let err = gw
        .select(&SelectQuery::from(table("processos")))
        .await
        .unwrap_err();
    assert!(err.is_transport(), "expected transport error, got {err:?}");
}
