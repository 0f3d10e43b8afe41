//! JSON-RPC 2.0 wire shapes
//!
//! Every document on the stream is one of three shapes:
//!
//! 1. **Request**: `{jsonrpc, id, method, params}`, expects a response
//! 2. **Notification**: `{jsonrpc, method, params}`, never answered
//! 3. **Response**: `{jsonrpc, id, result}` or `{jsonrpc, id, error}`
//!
//! Outbound documents always carry `jsonrpc: "2.0"`. Inbound documents are
//! accepted without it, since the Triggerware server is the only peer and
//! the field carries no information.

use crate::error::{Error, JsonRpcErrorData, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Protocol version stamped on every outbound document
pub const JSONRPC_VERSION: &str = "2.0";

fn default_version() -> String {
    JSONRPC_VERSION.to_string()
}

/// JSON-RPC request identifier
///
/// Outbound calls always use `Number`, allocated from a per-client counter.
/// The peer may still send string or null ids on its own requests, and the
/// reply has to echo them back unchanged.
///
/// ```rust
/// use triggerware_core::Id;
///
/// let id: Id = 7u64.into();
/// assert_eq!(id.to_string(), "7");
/// assert_eq!(Id::from("abc").to_string(), "\"abc\"");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    /// Numeric id
    Number(i64),
    /// String id
    String(String),
    /// Null id, used on error replies to unparseable requests
    #[default]
    Null,
}

impl Id {
    /// The id as a pending-call key, if it is a non-negative number
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Id::Number(n) => u64::try_from(*n).ok(),
            _ => None,
        }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::String(s) => write!(f, "\"{}\"", s),
            Id::Number(n) => write!(f, "{}", n),
            Id::Null => write!(f, "null"),
        }
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Id::String(s)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Id::String(s.to_string())
    }
}

impl From<u64> for Id {
    fn from(n: u64) -> Self {
        Id::Number(n as i64)
    }
}

/// Request document: a call that expects a response with the same id
///
/// ```rust
/// use triggerware_core::{Id, JsonRpcRequest};
/// use serde_json::json;
///
/// let req = JsonRpcRequest::new("next-resultset-batch", Some(json!({"handle": 3})), Id::Number(0));
/// assert_eq!(req.jsonrpc, "2.0");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    pub id: Id,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Create a new request
    pub fn new(method: impl Into<String>, params: Option<Value>, id: Id) -> Self {
        Self {
            jsonrpc: default_version(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// Notification document: no id, no reply, ever
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    /// Create a new notification
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: default_version(),
            method: method.into(),
            params,
        }
    }
}

/// Response document
///
/// Exactly one of `result` and `error` is set by the constructors. On the
/// receiving side a response with neither (or with `result: null`) resolves
/// to `Value::Null`.
///
/// ```rust
/// use triggerware_core::{Id, JsonRpcErrorData, JsonRpcResponse};
/// use serde_json::json;
///
/// let ok = JsonRpcResponse::success(json!({"handle": 4}), Id::Number(1));
/// assert_eq!(ok.into_result().unwrap()["handle"], 4);
///
/// let failed = JsonRpcResponse::error(JsonRpcErrorData::method_not_found("sub9"), Id::Number(2));
/// assert!(failed.into_result().is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Id,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcErrorData>,
}

impl JsonRpcResponse {
    /// Create a success response
    pub fn success(result: Value, id: Id) -> Self {
        Self {
            jsonrpc: default_version(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(error: JsonRpcErrorData, id: Id) -> Self {
        Self {
            jsonrpc: default_version(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Settle the response: the result value, or the typed error rebuilt from its code
    pub fn into_result(self) -> Result<Value> {
        match self.error {
            Some(error) => Err(Error::from(error)),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Any decoded document, classified by shape
///
/// Classification is done by [`crate::codec::classify`]: a document with a
/// `method` member is an invocation (a request when it also has a non-null
/// `id`), anything else is a response.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
    Response(JsonRpcResponse),
}

impl JsonRpcMessage {
    pub fn is_request(&self) -> bool {
        matches!(self, JsonRpcMessage::Request(_))
    }

    pub fn is_notification(&self) -> bool {
        matches!(self, JsonRpcMessage::Notification(_))
    }

    pub fn is_response(&self) -> bool {
        matches!(self, JsonRpcMessage::Response(_))
    }

    /// Method name for invocations
    pub fn method(&self) -> Option<&str> {
        match self {
            JsonRpcMessage::Request(req) => Some(&req.method),
            JsonRpcMessage::Notification(notif) => Some(&notif.method),
            JsonRpcMessage::Response(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_id_display() {
        assert_eq!(Id::String("test".to_string()).to_string(), "\"test\"");
        assert_eq!(Id::Number(42).to_string(), "42");
        assert_eq!(Id::Null.to_string(), "null");
    }

    #[test]
    fn test_id_as_u64() {
        assert_eq!(Id::Number(5).as_u64(), Some(5));
        assert_eq!(Id::Number(-1).as_u64(), None);
        assert_eq!(Id::from("5").as_u64(), None);
        assert_eq!(Id::Null.as_u64(), None);
    }

    #[test]
    fn test_request_carries_version_and_id() {
        let req = JsonRpcRequest::new("noop", None, Id::Number(0));
        let json = serde_json::to_value(&req).unwrap();

        assert_eq!(json, json!({"jsonrpc": "2.0", "id": 0, "method": "noop"}));
    }

    #[test]
    fn test_notification_has_no_id() {
        let notif = JsonRpcNotification::new("add-negative-tweet", Some(json!(["text"])));
        let json = serde_json::to_string(&notif).unwrap();

        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(!json.contains("\"id\""));
    }

    #[test]
    fn test_response_without_result_resolves_to_null() {
        let resp: JsonRpcResponse = serde_json::from_value(json!({"id": 3})).unwrap();
        assert_eq!(resp.jsonrpc, "2.0");
        assert_eq!(resp.into_result().unwrap(), Value::Null);

        let resp: JsonRpcResponse = serde_json::from_value(json!({"id": 3, "result": null})).unwrap();
        assert_eq!(resp.into_result().unwrap(), Value::Null);
    }

    #[test]
    fn test_response_error_becomes_typed_error() {
        let resp: JsonRpcResponse = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": -32000, "message": "unknown relation"}
        }))
        .unwrap();

        assert!(resp.result.is_none());
        match resp.into_result() {
            Err(Error::Server { message: msg, .. }) => assert_eq!(msg, "unknown relation"),
            other => panic!("Expected Server error, got {:?}", other),
        }
    }
}
