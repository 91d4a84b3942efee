use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const INTERNAL_ERROR: i64 = -32603;
pub const PROXY_TIMEOUT: i64 = -32000;
pub const BACKEND_UNREACHABLE: i64 = -32001;
pub const BACKEND_INVALID_JSON: i64 = -32002;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    /// `None` only when the member is absent; an explicit `"id": null` is
    /// `Some(Value::Null)` and still expects a response.
    #[serde(
        default,
        deserialize_with = "present_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

fn present_id<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl JsonRpcRequest {
    pub fn new(id: Value, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            method: method.into(),
            params,
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    pub fn parse(raw: &str) -> Result<Self, JsonRpcResponse> {
        let request: Self = serde_json::from_str(raw).map_err(|err| {
            JsonRpcResponse::error(Value::Null, PARSE_ERROR, format!("parse error: {err}"))
        })?;
        if request.jsonrpc != JSONRPC_VERSION {
            return Err(JsonRpcResponse::error(
                request.id.unwrap_or(Value::Null),
                INVALID_REQUEST,
                "invalid jsonrpc version",
            ));
        }
        Ok(request)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

fn default_version() -> String {
    JSONRPC_VERSION.to_string()
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: default_version(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: default_version(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    pub fn error_with_data(id: Value, code: i64, message: impl Into<String>, data: Value) -> Self {
        let mut response = Self::error(id, code, message);
        if let Some(err) = response.error.as_mut() {
            err.data = Some(data);
        }
        response
    }

    /// Rebinds the response to `id` and fills in the fields a sloppy origin
    /// may omit. `"result": null` collapses to `None` during deserialization,
    /// so a response carrying neither side is restored to a null result.
    pub fn normalized(mut self, id: Value) -> Self {
        self.id = id;
        self.jsonrpc = default_version();
        if self.result.is_none() && self.error.is_none() {
            self.result = Some(Value::Null);
        }
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_rejects_garbage_with_null_id() {
        let err = JsonRpcRequest::parse("{not json").expect_err("must fail");
        assert_eq!(err.id, Value::Null);
        assert_eq!(err.error.as_ref().map(|e| e.code), Some(PARSE_ERROR));
    }

    #[test]
    fn parse_rejects_wrong_version_keeping_id() {
        let err = JsonRpcRequest::parse(r#"{"jsonrpc":"1.0","id":7,"method":"ping"}"#)
            .expect_err("must fail");
        assert_eq!(err.id, json!(7));
        assert_eq!(err.error.as_ref().map(|e| e.code), Some(INVALID_REQUEST));
    }

    #[test]
    fn notification_has_no_id() {
        let req = JsonRpcRequest::parse(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .expect("parse");
        assert!(req.is_notification());
        let encoded = serde_json::to_value(&req).expect("encode");
        assert!(encoded.get("id").is_none());
        assert!(encoded.get("params").is_none());
    }

    #[test]
    fn explicit_null_id_is_a_call_not_a_notification() {
        let req = JsonRpcRequest::parse(r#"{"jsonrpc":"2.0","id":null,"method":"ping"}"#)
            .expect("parse");
        assert!(!req.is_notification());
        assert_eq!(req.id, Some(Value::Null));
        let encoded = serde_json::to_string(&req).expect("encode");
        assert!(encoded.contains(r#""id":null"#));
    }

    #[test]
    fn oversized_integer_id_keeps_its_digits() {
        let req = JsonRpcRequest::parse(
            r#"{"jsonrpc":"2.0","id":123456789012345678901234,"method":"ping"}"#,
        )
        .expect("parse");
        let id = req.id.expect("id");
        let reply = JsonRpcResponse::success(id, json!({})).to_value().to_string();
        assert!(reply.contains(r#""id":123456789012345678901234"#));
    }

    #[test]
    fn normalized_overrides_echoed_id_and_restores_null_result() {
        let parsed: JsonRpcResponse =
            serde_json::from_str(r#"{"id":"wrong","result":null}"#).expect("parse");
        let fixed = parsed.normalized(json!(42));
        assert_eq!(fixed.id, json!(42));
        assert_eq!(fixed.jsonrpc, "2.0");
        assert_eq!(fixed.result, Some(Value::Null));
        assert_eq!(fixed.to_value()["result"], Value::Null);
    }

    #[test]
    fn error_data_is_serialized_only_when_present() {
        let bare = JsonRpcResponse::error(json!(1), INTERNAL_ERROR, "boom").to_value();
        assert!(bare["error"].get("data").is_none());
        let rich = JsonRpcResponse::error_with_data(json!(1), PROXY_TIMEOUT, "Proxy Timeout", json!({"elapsed": 5}))
            .to_value();
        assert_eq!(rich["error"]["data"]["elapsed"], 5);
        assert!(rich.get("result").is_none());
    }
}
