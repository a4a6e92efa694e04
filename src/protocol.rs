//! JSON-RPC 2.0 envelope types used to talk to upstream MCP servers.
//!
//! Trimmed from the teacher's `protocol::types`/`protocol::messages` (which
//! model the full 2025-06-18 typed MCP surface — `Tool`, `Resource`,
//! `Prompt`, annotations, audio content, etc.) down to the JSON-RPC envelope
//! itself. The canonicalizer (C1) and snapshotter (C3) work over raw
//! `serde_json::Value` items rather than named structs, since the fingerprint
//! must cover structural equality beyond whatever schema an upstream happens
//! to advertise.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";
/// MCP protocol version this client speaks, per spec.md §4.3.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

pub mod error_codes {
    pub const METHOD_NOT_FOUND: i32 = -32601;
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: i64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Value::from(id),
            method: method.into(),
            params,
        }
    }
}

/// A decoded JSON-RPC response envelope: either `result` or `error` is
/// present, never both (spec.md §4.2).
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponseEnvelope {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<ErrorObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorObject {
    pub code: i32,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

impl JsonRpcResponseEnvelope {
    /// A response envelope, as opposed to a request/notification the server
    /// echoed back on the same stream (spec.md §4.2's SSE filtering rule).
    pub fn is_response(&self) -> bool {
        self.result.is_some() || self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_with_omitted_params_when_none() {
        let req = JsonRpcRequest::new(1, "initialize", None);
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("params").is_none());
        assert_eq!(json["method"], "initialize");
        assert_eq!(json["jsonrpc"], "2.0");
    }

    #[test]
    fn envelope_distinguishes_response_from_notification() {
        let response: JsonRpcResponseEnvelope =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#).unwrap();
        assert!(response.is_response());

        let notification: JsonRpcResponseEnvelope =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"notifications/progress"}"#)
                .unwrap();
        assert!(!notification.is_response());
    }

    #[test]
    fn method_not_found_code_matches_constant() {
        let envelope: JsonRpcResponseEnvelope = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"no such method"}}"#,
        )
        .unwrap();
        assert_eq!(
            envelope.error.unwrap().code,
            error_codes::METHOD_NOT_FOUND
        );
    }
}
