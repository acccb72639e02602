//! JSON-RPC 2.0 message types and codec.
//!
//! A [`Message`] is classified from raw JSON by field shape: a `method`
//! with an `id` is a request, a `method` without an `id` is a
//! notification, and a `result` or `error` with an `id` is a response.
//! Notifications carry no id field at all, so serializing one can never
//! emit an `id` key.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// The JSON-RPC protocol version string every message carries.
pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC request/response ID. Number or string per the spec; `Null` is
/// reserved for error responses to messages whose id could not be read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RpcId {
    Number(i64),
    String(String),
    Null,
}

/// A JSON-RPC 2.0 request message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    pub jsonrpc: String,
    pub id: RpcId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// A JSON-RPC 2.0 notification (no id, no response expected).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// A JSON-RPC 2.0 response message (success or error).
///
/// Exactly one of `result`/`error` is set; the constructors maintain the
/// invariant and [`Message::parse`] rejects texts that violate it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    pub jsonrpc: String,
    pub id: RpcId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A classified JSON-RPC 2.0 message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request(Request),
    Notification(Notification),
    Response(Response),
}

impl Message {
    /// Create a request message.
    pub fn request(id: RpcId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self::Request(Request {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        })
    }

    /// Create a notification message.
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self::Notification(Notification {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        })
    }

    /// Create a successful response.
    pub fn response(id: RpcId, result: Value) -> Self {
        Self::Response(Response {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        })
    }

    /// Create an error response.
    pub fn error_response(id: RpcId, error: RpcError) -> Self {
        Self::Response(Response {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        })
    }

    /// Parse and classify a JSON-RPC message from text.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let raw: Value = serde_json::from_str(text)
            .map_err(|e| ProtocolError::Parse(e.to_string()))?;

        let obj = raw
            .as_object()
            .ok_or_else(|| ProtocolError::Parse("message is not a JSON object".to_string()))?;

        match obj.get("jsonrpc").and_then(Value::as_str) {
            Some(JSONRPC_VERSION) => {}
            Some(other) => {
                return Err(ProtocolError::Parse(format!(
                    "unsupported jsonrpc version: {other}"
                )))
            }
            None => {
                return Err(ProtocolError::Parse(
                    "missing \"jsonrpc\":\"2.0\" field".to_string(),
                ))
            }
        }

        if obj.contains_key("method") {
            if obj.get("method").and_then(Value::as_str).is_none() {
                return Err(ProtocolError::Parse("\"method\" is not a string".to_string()));
            }
            // method + id => request; method without id => notification
            if obj.contains_key("id") {
                let request: Request = serde_json::from_value(raw)?;
                Ok(Self::Request(request))
            } else {
                let notification: Notification = serde_json::from_value(raw)?;
                Ok(Self::Notification(notification))
            }
        } else if obj.contains_key("result") || obj.contains_key("error") {
            if obj.contains_key("result") && obj.contains_key("error") {
                return Err(ProtocolError::Parse(
                    "response carries both result and error".to_string(),
                ));
            }
            if !obj.contains_key("id") {
                return Err(ProtocolError::Parse("response is missing an id".to_string()));
            }
            let response: Response = serde_json::from_value(raw)?;
            Ok(Self::Response(response))
        } else {
            Err(ProtocolError::Parse(
                "message has neither method nor result/error".to_string(),
            ))
        }
    }

    /// Serialize to a single-line JSON string.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        let json = match self {
            Self::Request(m) => serde_json::to_string(m)?,
            Self::Notification(m) => serde_json::to_string(m)?,
            Self::Response(m) => serde_json::to_string(m)?,
        };
        Ok(json)
    }

    pub fn is_request(&self) -> bool {
        matches!(self, Self::Request(_))
    }

    pub fn is_notification(&self) -> bool {
        matches!(self, Self::Notification(_))
    }

    pub fn is_response(&self) -> bool {
        matches!(self, Self::Response(_))
    }

    /// Method name for requests and notifications.
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request(m) => Some(&m.method),
            Self::Notification(m) => Some(&m.method),
            Self::Response(_) => None,
        }
    }

    /// Message id for requests and responses.
    pub fn id(&self) -> Option<&RpcId> {
        match self {
            Self::Request(m) => Some(&m.id),
            Self::Response(m) => Some(&m.id),
            Self::Notification(_) => None,
        }
    }
}

impl Response {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Result value, or a typed failure mapped from the error code.
    pub fn into_result(self) -> Result<Value, ProtocolError> {
        if let Some(err) = self.error {
            return Err(err.into_protocol_error());
        }
        self.result
            .ok_or_else(|| ProtocolError::InvalidRequest("response carries no result".to_string()))
    }
}

impl RpcError {
    /// Map a wire error back into the typed taxonomy.
    pub fn into_protocol_error(self) -> ProtocolError {
        use crate::error::error_codes::*;
        match self.code {
            PARSE_ERROR => ProtocolError::Parse(self.message),
            INVALID_REQUEST => ProtocolError::InvalidRequest(self.message),
            METHOD_NOT_FOUND => ProtocolError::MethodNotFound(self.message),
            INVALID_PARAMS => ProtocolError::InvalidParams(self.message),
            RESOURCE_NOT_FOUND => ProtocolError::ResourceNotFound(self.message),
            TOOL_NOT_FOUND => ProtocolError::ToolNotFound(self.message),
            INVALID_TOOL_INPUT => ProtocolError::InvalidToolInput(self.message),
            ACCESS_DENIED => ProtocolError::AccessDenied(self.message),
            _ => ProtocolError::Internal(self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_request() {
        let msg = Message::parse(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).unwrap();
        assert!(msg.is_request());
        assert_eq!(msg.method(), Some("ping"));
        assert_eq!(msg.id(), Some(&RpcId::Number(1)));
    }

    #[test]
    fn test_classify_notification() {
        let msg =
            Message::parse(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).unwrap();
        assert!(msg.is_notification());
        assert_eq!(msg.method(), Some("notifications/initialized"));
        assert!(msg.id().is_none());
    }

    #[test]
    fn test_classify_response() {
        let msg = Message::parse(r#"{"jsonrpc":"2.0","id":"a","result":{"ok":true}}"#).unwrap();
        assert!(msg.is_response());
        assert_eq!(msg.id(), Some(&RpcId::String("a".to_string())));
    }

    #[test]
    fn test_classify_error_response() {
        let msg = Message::parse(
            r#"{"jsonrpc":"2.0","id":7,"error":{"code":-32601,"message":"no such method"}}"#,
        )
        .unwrap();
        match msg {
            Message::Response(resp) => {
                assert!(resp.is_error());
                assert_eq!(resp.error.unwrap().code, -32601);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_invalid_json() {
        assert!(matches!(
            Message::parse("{not json"),
            Err(ProtocolError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_rejects_missing_jsonrpc() {
        assert!(matches!(
            Message::parse(r#"{"id":1,"method":"ping"}"#),
            Err(ProtocolError::Parse(_))
        ));
        assert!(matches!(
            Message::parse(r#"{"jsonrpc":"1.0","id":1,"method":"ping"}"#),
            Err(ProtocolError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_rejects_result_and_error() {
        let text = r#"{"jsonrpc":"2.0","id":1,"result":1,"error":{"code":1,"message":"x"}}"#;
        assert!(matches!(Message::parse(text), Err(ProtocolError::Parse(_))));
    }

    #[test]
    fn test_notification_never_serializes_id() {
        let msg = Message::notification("notifications/progress", Some(serde_json::json!({})));
        let json = msg.to_json().unwrap();
        assert!(!json.contains("\"id\""));
    }

    #[test]
    fn test_response_emits_exactly_one_of_result_error() {
        let ok = Message::response(RpcId::Number(1), serde_json::json!({"ok": true}));
        let json = ok.to_json().unwrap();
        assert!(json.contains("\"result\""));
        assert!(!json.contains("\"error\""));

        let err = Message::error_response(
            RpcId::Number(2),
            RpcError {
                code: -32603,
                message: "boom".to_string(),
                data: None,
            },
        );
        let json = err.to_json().unwrap();
        assert!(json.contains("\"error\""));
        assert!(!json.contains("\"result\""));
    }

    #[test]
    fn test_roundtrip_fixed_point() {
        // Parse(Serialize(Parse(text))) must agree with Parse(text) on
        // structurally significant fields.
        let texts = [
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"add","arguments":{"a":5,"b":3}}}"#,
            r#"{"jsonrpc":"2.0","method":"notifications/cancelled","params":{"requestId":1}}"#,
            r#"{"jsonrpc":"2.0","id":"x-1","result":{"tools":[],"nextCursor":"abc"}}"#,
            r#"{"jsonrpc":"2.0","id":2,"error":{"code":-32001,"message":"gone","data":{"uri":"demo://x"}}}"#,
        ];
        for text in texts {
            let parsed = Message::parse(text).unwrap();
            let reparsed = Message::parse(&parsed.to_json().unwrap()).unwrap();
            assert_eq!(parsed, reparsed, "{text}");
        }
    }

    #[test]
    fn test_params_preserved_opaquely() {
        // Unknown fields inside params survive the roundtrip untouched.
        let text = r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"q","x-vendor-hint":{"deep":[1,2,3]}}}"#;
        let parsed = Message::parse(text).unwrap();
        let json = parsed.to_json().unwrap();
        assert!(json.contains("x-vendor-hint"));
        assert!(json.contains("[1,2,3]"));
    }

    #[test]
    fn test_null_id_roundtrip() {
        let msg = Message::error_response(
            RpcId::Null,
            RpcError {
                code: -32700,
                message: "parse error".to_string(),
                data: None,
            },
        );
        let json = msg.to_json().unwrap();
        assert!(json.contains("\"id\":null"));
        let reparsed = Message::parse(&json).unwrap();
        assert_eq!(reparsed.id(), Some(&RpcId::Null));
    }

    #[test]
    fn test_into_result_maps_error_codes() {
        let resp = Response {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: RpcId::Number(1),
            result: None,
            error: Some(RpcError {
                code: -32002,
                message: "tool not found: nope".to_string(),
                data: None,
            }),
        };
        assert!(matches!(
            resp.into_result(),
            Err(ProtocolError::ToolNotFound(_))
        ));
    }
}
