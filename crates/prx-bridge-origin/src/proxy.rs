use std::sync::Arc;

use prx_bridge_core::protocol::{
    BACKEND_INVALID_JSON, BACKEND_UNREACHABLE, INTERNAL_ERROR, PROXY_TIMEOUT,
};
use prx_bridge_core::{JsonRpcRequest, JsonRpcResponse};
use serde_json::{Value, json};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::ProxyConfig;
use crate::traits::OriginTransport;
use crate::types::{OriginReply, OriginRequest, OriginTarget};

/// Forwards calls to the origin under a hard deadline.
///
/// [`BackendProxy::forward`] never fails: every transport problem, bad status,
/// unparseable body or elapsed deadline comes back as an error envelope
/// carrying the caller's request id.
#[derive(Clone)]
pub struct BackendProxy {
    transport: Arc<dyn OriginTransport>,
    config: ProxyConfig,
}

impl BackendProxy {
    pub fn new(transport: Arc<dyn OriginTransport>, config: ProxyConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub async fn forward(
        &self,
        target: &OriginTarget,
        request: &JsonRpcRequest,
        request_id: Value,
    ) -> JsonRpcResponse {
        let body = match serde_json::to_string(request) {
            Ok(v) => v,
            Err(err) => {
                return JsonRpcResponse::error(
                    request_id,
                    INTERNAL_ERROR,
                    format!("failed to encode request: {err}"),
                );
            }
        };
        self.forward_raw(target, &request.method, body, request_id).await
    }

    /// Sends `body` to the origin exactly as given.
    pub async fn forward_raw(
        &self,
        target: &OriginTarget,
        method: &str,
        body: String,
        request_id: Value,
    ) -> JsonRpcResponse {
        let outbound = OriginRequest {
            url: target.endpoint(&self.config.origin_path),
            body,
            user_id: target.user_id.clone(),
            client_profile: target.client_profile.clone(),
        };

        let started = Instant::now();
        // The send future and its timer live inside `timeout`; both are dropped
        // here on every path, which is what cancels the in-flight request.
        let outcome = tokio::time::timeout(self.config.deadline, self.transport.send(outbound)).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Err(_) => {
                warn!(
                    method = %method,
                    elapsed_ms,
                    transport = self.transport.name(),
                    "origin call exceeded proxy deadline"
                );
                JsonRpcResponse::error_with_data(
                    request_id,
                    PROXY_TIMEOUT,
                    "Proxy Timeout",
                    json!({"elapsed": elapsed_ms}),
                )
            }
            Ok(Err(err)) => {
                warn!(method = %method, elapsed_ms, error = %err, "origin unreachable");
                JsonRpcResponse::error_with_data(
                    request_id,
                    BACKEND_UNREACHABLE,
                    "Backend Unreachable",
                    Value::String(err.to_string()),
                )
            }
            Ok(Ok(reply)) => {
                debug!(method = %method, status = reply.status, elapsed_ms, "origin replied");
                self.interpret(reply, request_id)
            }
        }
    }

    fn interpret(&self, reply: OriginReply, request_id: Value) -> JsonRpcResponse {
        if !reply.is_success() {
            return JsonRpcResponse::error_with_data(
                request_id,
                i64::from(reply.status),
                "Backend Error",
                Value::String(truncate_chars(&reply.body, self.config.body_preview_chars)),
            );
        }
        match serde_json::from_str::<JsonRpcResponse>(&reply.body) {
            Ok(parsed) => parsed.normalized(request_id),
            Err(_) => JsonRpcResponse::error_with_data(
                request_id,
                BACKEND_INVALID_JSON,
                "Backend response is not valid JSON",
                Value::String(truncate_chars(&reply.body, self.config.body_preview_chars)),
            ),
        }
    }
}

fn truncate_chars(raw: &str, max: usize) -> String {
    raw.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::error::OriginError;

    struct ScriptedTransport {
        delay: Duration,
        reply: fn() -> Result<OriginReply, OriginError>,
        seen: Mutex<Vec<OriginRequest>>,
    }

    #[async_trait::async_trait]
    impl OriginTransport for ScriptedTransport {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn send(&self, request: OriginRequest) -> Result<OriginReply, OriginError> {
            self.seen.lock().expect("seen lock").push(request);
            tokio::time::sleep(self.delay).await;
            (self.reply)()
        }
    }

    fn proxy_with(
        delay: Duration,
        reply: fn() -> Result<OriginReply, OriginError>,
    ) -> (BackendProxy, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport {
            delay,
            reply,
            seen: Mutex::new(Vec::new()),
        });
        let proxy = BackendProxy::new(transport.clone(), ProxyConfig::default());
        (proxy, transport)
    }

    fn target() -> OriginTarget {
        OriginTarget::new("https://origin.example", "U", "chatgpt")
    }

    fn ping() -> JsonRpcRequest {
        JsonRpcRequest::new(json!(9), "ping", Value::Null)
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_yields_proxy_timeout_with_elapsed() {
        let (proxy, _) = proxy_with(Duration::from_secs(300), || {
            Ok(OriginReply { status: 200, body: "{}".to_string() })
        });
        let response = proxy.forward(&target(), &ping(), json!(9)).await;
        let err = response.error.expect("error");
        assert_eq!(err.code, PROXY_TIMEOUT);
        assert_eq!(err.message, "Proxy Timeout");
        let elapsed = err.data.as_ref().and_then(|d| d["elapsed"].as_u64()).expect("elapsed");
        assert!(elapsed >= 90_000);
        assert_eq!(response.id, json!(9));
    }

    #[tokio::test(start_paused = true)]
    async fn origin_id_is_overwritten() {
        let (proxy, transport) = proxy_with(Duration::from_millis(5), || {
            Ok(OriginReply {
                status: 200,
                body: r#"{"jsonrpc":"2.0","id":"echo-bug","result":{"ok":true}}"#.to_string(),
            })
        });
        let response = proxy.forward(&target(), &ping(), json!(9)).await;
        assert_eq!(response.id, json!(9));
        assert_eq!(response.result, Some(json!({"ok": true})));

        let seen = transport.seen.lock().expect("seen lock");
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].url, "https://origin.example/mcp");
        assert_eq!(seen[0].user_id, "U");
        assert_eq!(seen[0].client_profile, "chatgpt");
    }

    #[tokio::test(start_paused = true)]
    async fn non_success_status_is_backend_error_with_truncated_body() {
        let (proxy, _) = proxy_with(Duration::ZERO, || {
            Ok(OriginReply { status: 503, body: "e".repeat(2_000) })
        });
        let err = proxy.forward(&target(), &ping(), json!(9)).await.error.expect("error");
        assert_eq!(err.code, 503);
        assert_eq!(err.message, "Backend Error");
        assert_eq!(err.data.as_ref().and_then(Value::as_str).map(str::len), Some(500));
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_body_is_reported() {
        let (proxy, _) = proxy_with(Duration::ZERO, || {
            Ok(OriginReply { status: 200, body: "<html>oops</html>".to_string() })
        });
        let err = proxy.forward(&target(), &ping(), json!(9)).await.error.expect("error");
        assert_eq!(err.code, BACKEND_INVALID_JSON);
        assert_eq!(err.message, "Backend response is not valid JSON");
        assert_eq!(err.data, Some(json!("<html>oops</html>")));
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_is_backend_unreachable() {
        let (proxy, _) = proxy_with(Duration::ZERO, || {
            Err(OriginError::Config("connection refused".to_string()))
        });
        let response = proxy.forward(&target(), &ping(), json!("abc")).await;
        assert_eq!(response.id, json!("abc"));
        assert_eq!(response.error.map(|e| e.code), Some(BACKEND_UNREACHABLE));
    }

    #[tokio::test(start_paused = true)]
    async fn raw_forward_sends_body_untouched() {
        let (proxy, transport) = proxy_with(Duration::ZERO, || {
            Ok(OriginReply {
                status: 200,
                body: r#"{"jsonrpc":"2.0","id":1,"result":{}}"#.to_string(),
            })
        });
        let raw = r#"{ "jsonrpc": "2.0", "id": 123456789012345678901234, "method": "ping" }"#;
        let id: Value = serde_json::from_str("123456789012345678901234").expect("id");
        let response = proxy
            .forward_raw(&target(), "ping", raw.to_string(), id)
            .await;

        assert_eq!(transport.seen.lock().expect("seen lock")[0].body, raw);
        assert!(response
            .to_value()
            .to_string()
            .contains(r#""id":123456789012345678901234"#));
    }

    #[test]
    fn truncate_is_char_safe() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
    }
}
