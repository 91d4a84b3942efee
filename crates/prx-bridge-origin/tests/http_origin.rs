use std::sync::Arc;
use std::time::Duration;

use prx_bridge_core::JsonRpcRequest;
use prx_bridge_origin::{
    BackendProxy, HttpOriginConfig, HttpOriginTransport, OriginTarget, ProxyConfig,
};
use serde_json::{Value, json};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn proxy(deadline: Duration) -> BackendProxy {
    let transport = HttpOriginTransport::new(HttpOriginConfig::default()).expect("transport");
    BackendProxy::new(Arc::new(transport), ProxyConfig::new(deadline))
}

fn tools_call() -> JsonRpcRequest {
    JsonRpcRequest::new(
        json!(21),
        "tools/call",
        json!({"name": "ask_memory", "arguments": {"question": "Q"}}),
    )
}

#[tokio::test]
async fn posts_call_with_identity_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(header("x-user-id", "U"))
        .and(header("x-client-name", "chatgpt"))
        .and(body_json(json!({
            "jsonrpc": "2.0",
            "id": 21,
            "method": "tools/call",
            "params": {"name": "ask_memory", "arguments": {"question": "Q"}}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 999,
            "result": {"content": [{"type": "text", "text": "answer"}]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let target = OriginTarget::new(server.uri(), "U", "chatgpt");
    let response = proxy(Duration::from_secs(5))
        .forward(&target, &tools_call(), json!(21))
        .await;

    assert_eq!(response.id, json!(21));
    assert_eq!(response.result.as_ref().map(|r| r["content"][0]["text"].clone()), Some(json!("answer")));
}

#[tokio::test]
async fn origin_status_becomes_backend_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(405).set_body_string("Method Not Allowed"))
        .mount(&server)
        .await;

    let target = OriginTarget::new(server.uri(), "U", "claude");
    let response = proxy(Duration::from_secs(5))
        .forward(&target, &tools_call(), json!(21))
        .await;

    let err = response.error.expect("error");
    assert_eq!(err.code, 405);
    assert_eq!(err.message, "Backend Error");
    assert_eq!(err.data, Some(json!("Method Not Allowed")));
}

#[tokio::test]
async fn slow_origin_hits_deadline() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"jsonrpc": "2.0", "id": 21, "result": {}}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let target = OriginTarget::new(server.uri(), "U", "claude");
    let response = proxy(Duration::from_millis(150))
        .forward(&target, &tools_call(), json!(21))
        .await;

    let err = response.error.expect("error");
    assert_eq!(err.code, -32000);
    assert_eq!(err.message, "Proxy Timeout");
    let elapsed = err
        .data
        .as_ref()
        .and_then(|d| d.get("elapsed"))
        .and_then(Value::as_u64)
        .expect("elapsed");
    assert!(elapsed >= 150);
}

#[tokio::test]
async fn unreachable_origin_is_reported_not_raised() {
    let target = OriginTarget::new("http://127.0.0.1:1", "U", "claude");
    let response = proxy(Duration::from_secs(5))
        .forward(&target, &tools_call(), json!(21))
        .await;
    assert_eq!(response.id, json!(21));
    assert_eq!(response.error.map(|e| e.code), Some(-32001));
}
