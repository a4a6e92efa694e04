//! C2: JSON-RPC client for talking to upstream MCP servers.
//!
//! Grounded on the teacher's `transport::http::HttpClientTransport` for the
//! `reqwest::Client` construction idiom (timeout/connect_timeout, header
//! map), and on `original_source/mcp_guardian/app/services/proxy_client.py`'s
//! `send_jsonrpc` for the SSE buffering loop this module reimplements.

use std::time::Duration;

use reqwest::{Client, header::HeaderMap};
use serde_json::Value;

use crate::core::error::{GuardianError, GuardianResult};
use crate::protocol::{JsonRpcRequest, JsonRpcResponseEnvelope, error_codes};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of a single JSON-RPC call: a `result` payload, or a flag marking
/// the method as absent (`-32601`) so callers can treat the capability
/// family as empty without special-casing the error path everywhere.
#[derive(Debug, Clone)]
pub enum JsonRpcOutcome {
    Result(Value),
    MethodNotFound,
}

/// Thin wrapper over a `reqwest::Client` used for both the snapshotter's
/// structured calls and the proxy gateway's raw passthrough.
#[derive(Debug, Clone)]
pub struct McpClient {
    client: Client,
    request_id: i64,
}

impl McpClient {
    pub fn new() -> GuardianResult<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> GuardianResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| GuardianError::internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            request_id: 1,
        })
    }

    fn request_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("Content-Type", "application/json".parse().unwrap());
        headers.insert(
            "Accept",
            "application/json, text/event-stream".parse().unwrap(),
        );
        headers.insert("MCP-Protocol-Version", "2024-11-05".parse().unwrap());
        headers
    }

    /// Send a single JSON-RPC request to `url` and return its parsed result.
    ///
    /// spec.md §4.2: the `id` need not be globally unique, only unique within
    /// one open stream — an incrementing per-client counter satisfies this.
    pub async fn call(
        &mut self,
        url: &str,
        method: &str,
        params: Option<Value>,
    ) -> GuardianResult<JsonRpcOutcome> {
        let id = self.request_id;
        self.request_id += 1;

        let request = JsonRpcRequest::new(id, method, params);

        let response = self
            .client
            .post(url)
            .headers(Self::request_headers())
            .json(&request)
            .send()
            .await
            .map_err(|e| GuardianError::upstream_unreachable(e.to_string()))?;

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();

        if content_type.contains("text/event-stream") {
            let body = response
                .text()
                .await
                .map_err(|e| GuardianError::upstream_unreachable(e.to_string()))?;
            decode_sse(&body)
        } else {
            let body = response
                .text()
                .await
                .map_err(|e| GuardianError::upstream_unreachable(e.to_string()))?;
            decode_envelope(&body)
        }
    }

    /// Raw passthrough used by the proxy gateway (C9): forwards an arbitrary
    /// method/headers/body tuple and returns the unparsed `reqwest::Response`
    /// for streaming straight back to the client.
    pub async fn forward(
        &self,
        method: reqwest::Method,
        url: &str,
        headers: HeaderMap,
        body: Option<Vec<u8>>,
    ) -> GuardianResult<reqwest::Response> {
        let mut builder = self.client.request(method, url).headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }
        builder
            .send()
            .await
            .map_err(|e| GuardianError::upstream_unreachable(e.to_string()))
    }
}

fn envelope_to_outcome(envelope: JsonRpcResponseEnvelope) -> GuardianResult<JsonRpcOutcome> {
    if let Some(err) = envelope.error {
        if err.code == error_codes::METHOD_NOT_FOUND {
            return Ok(JsonRpcOutcome::MethodNotFound);
        }
        return Err(GuardianError::Rpc {
            code: err.code,
            message: err.message,
        });
    }
    match envelope.result {
        Some(result) => Ok(JsonRpcOutcome::Result(result)),
        None => Err(GuardianError::protocol(
            "JSON-RPC response carried neither result nor error",
        )),
    }
}

fn decode_envelope(body: &str) -> GuardianResult<JsonRpcOutcome> {
    let envelope: JsonRpcResponseEnvelope = serde_json::from_str(body)
        .map_err(|e| GuardianError::protocol(format!("invalid JSON-RPC body: {e}")))?;
    if envelope.jsonrpc.as_deref() != Some("2.0") {
        return Err(GuardianError::protocol(
            "response missing jsonrpc: \"2.0\"",
        ));
    }
    envelope_to_outcome(envelope)
}

/// Buffer-and-split on the literal `"\n\n"` frame delimiter (spec.md §9: do
/// not collapse `\r\n` to `\n` first, or the boundary moves). Each frame's
/// `data:` lines are joined with `\n` and parsed as one JSON document; the
/// first frame that parses as a JSON-RPC *response* (carries `result` or
/// `error`) wins, matching the proxy_client.py original.
fn decode_sse(body: &str) -> GuardianResult<JsonRpcOutcome> {
    for frame in body.split("\n\n") {
        let data_lines: Vec<&str> = frame
            .lines()
            .filter_map(|line| line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")))
            .collect();
        if data_lines.is_empty() {
            continue;
        }
        let joined = data_lines.join("\n");
        let Ok(envelope) = serde_json::from_str::<JsonRpcResponseEnvelope>(&joined) else {
            continue;
        };
        if envelope.is_response() {
            return envelope_to_outcome(envelope);
        }
    }
    Err(GuardianError::protocol("no response in stream"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_envelope_distinguishes_method_not_found() {
        let outcome =
            decode_envelope(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"x"}}"#)
                .unwrap();
        assert!(matches!(outcome, JsonRpcOutcome::MethodNotFound));
    }

    #[test]
    fn decode_envelope_surfaces_other_rpc_errors() {
        let err = decode_envelope(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"boom"}}"#)
            .unwrap_err();
        match err {
            GuardianError::Rpc { code, message } => {
                assert_eq!(code, -32000);
                assert_eq!(message, "boom");
            }
            other => panic!("expected Rpc error, got {other:?}"),
        }
    }

    #[test]
    fn decode_envelope_rejects_wrong_version() {
        assert!(decode_envelope(r#"{"jsonrpc":"1.0","id":1,"result":{}}"#).is_err());
    }

    #[test]
    fn decode_sse_finds_response_after_skipping_notifications() {
        let body = "data: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\"}\n\n\
                    data: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"ok\":true}}\n\n";
        let outcome = decode_sse(body).unwrap();
        match outcome {
            JsonRpcOutcome::Result(v) => assert_eq!(v["ok"], Value::Bool(true)),
            other => panic!("expected Result, got {other:?}"),
        }
    }

    #[test]
    fn decode_sse_multiline_data_is_joined() {
        let body = "data: {\"jsonrpc\":\"2.0\",\n\
                    data: \"id\":1,\"result\":{}}\n\n";
        let outcome = decode_sse(body).unwrap();
        assert!(matches!(outcome, JsonRpcOutcome::Result(_)));
    }

    #[test]
    fn decode_sse_without_a_response_frame_fails() {
        let body = "data: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\"}\n\n";
        assert!(decode_sse(body).is_err());
    }
}
