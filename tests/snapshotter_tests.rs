//! End-to-end coverage for `snapshotter::snapshot` against a mocked MCP
//! upstream, promised by the stub comment in `src/snapshotter.rs`.
//!
//! Grounded on the teacher's own `wiremock::{Mock, MockServer,
//! ResponseTemplate}` usage in `src/transport/http.rs`'s test module.

use mcp_guardian_rs::canonicalize::IdentityFilter;
use mcp_guardian_rs::mcp_client::McpClient;
use mcp_guardian_rs::snapshotter::snapshot;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn respond_to(server: &MockServer, rpc_method: &str, result: serde_json::Value) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": rpc_method })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/json")
                .set_body_json(json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "result": result,
                })),
        )
        .mount(server)
        .await;
}

async fn respond_method_not_found(server: &MockServer, rpc_method: &str) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": rpc_method })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/json")
                .set_body_json(json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "error": {"code": -32601, "message": "method not found"},
                })),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn full_snapshot_collects_every_capability_family() {
    let server = MockServer::start().await;
    respond_to(&server, "initialize", json!({"capabilities": {}})).await;
    respond_to(
        &server,
        "tools/list",
        json!({"tools": [{"name": "read"}, {"name": "write"}]}),
    )
    .await;
    respond_to(
        &server,
        "resources/list",
        json!({"resources": [{"uri": "file:///a"}]}),
    )
    .await;
    respond_to(
        &server,
        "resources/templates/list",
        json!({"resourceTemplates": [{"uriTemplate": "file:///{path}"}]}),
    )
    .await;
    respond_to(&server, "prompts/list", json!({"prompts": []})).await;

    let mut client = McpClient::new().unwrap();
    let result = snapshot(&mut client, &server.uri(), &IdentityFilter)
        .await
        .unwrap();

    assert_eq!(result.raw.tools.len(), 2);
    assert_eq!(result.raw.resources.len(), 1);
    assert_eq!(result.raw.resource_templates.len(), 1);
    assert!(result.raw.prompts.is_empty());
    assert!(!result.snapshot_hash.is_empty());
    assert!(result.snapshot_json.starts_with('{'));
}

#[tokio::test]
async fn method_not_found_on_a_family_yields_an_empty_list_not_a_failure() {
    let server = MockServer::start().await;
    respond_to(&server, "initialize", json!({"capabilities": {}})).await;
    respond_to(&server, "tools/list", json!({"tools": [{"name": "read"}]})).await;
    respond_method_not_found(&server, "resources/list").await;
    respond_method_not_found(&server, "resources/templates/list").await;
    respond_to(&server, "prompts/list", json!({"prompts": []})).await;

    let mut client = McpClient::new().unwrap();
    let result = snapshot(&mut client, &server.uri(), &IdentityFilter)
        .await
        .unwrap();

    assert_eq!(result.raw.tools.len(), 1);
    assert!(result.raw.resources.is_empty());
    assert!(result.raw.resource_templates.is_empty());
}

#[tokio::test]
async fn a_hard_rpc_error_on_tools_list_fails_the_whole_snapshot() {
    let server = MockServer::start().await;
    respond_to(&server, "initialize", json!({"capabilities": {}})).await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "tools/list" })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/json")
                .set_body_json(json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "error": {"code": -32000, "message": "upstream exploded"},
                })),
        )
        .mount(&server)
        .await;

    let mut client = McpClient::new().unwrap();
    let err = snapshot(&mut client, &server.uri(), &IdentityFilter)
        .await
        .unwrap_err();
    assert!(matches!(err, mcp_guardian_rs::GuardianError::Rpc { code: -32000, .. }));
}

#[tokio::test]
async fn identical_upstream_surfaces_hash_identically_across_two_snapshots() {
    let server = MockServer::start().await;
    respond_to(&server, "initialize", json!({"capabilities": {}})).await;
    respond_to(&server, "tools/list", json!({"tools": [{"name": "read"}]})).await;
    respond_to(&server, "resources/list", json!({"resources": []})).await;
    respond_method_not_found(&server, "resources/templates/list").await;
    respond_to(&server, "prompts/list", json!({"prompts": []})).await;

    let mut client = McpClient::new().unwrap();
    let first = snapshot(&mut client, &server.uri(), &IdentityFilter).await.unwrap();
    let second = snapshot(&mut client, &server.uri(), &IdentityFilter).await.unwrap();

    assert_eq!(first.snapshot_hash, second.snapshot_hash);
}
