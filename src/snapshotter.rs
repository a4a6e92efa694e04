//! C3: orchestrates `initialize` + the four capability-list walks into a
//! canonical fingerprint and hash.
//!
//! Grounded on
//! `original_source/mcp_guardian/app/services/snapshotter.py`. One behavior
//! deliberately diverges from that original: spec.md §4.2 requires any
//! non-`-32601` error on a capability family's *first* page to propagate
//! (fail the whole snapshot), whereas the Python original logs and returns
//! whatever was collected so far. This module follows the spec.

use serde_json::{Value, json};

use crate::canonicalize::{self, VolatileFieldFilter};
use crate::core::error::{GuardianError, GuardianResult};
use crate::mcp_client::{JsonRpcOutcome, McpClient};
use crate::protocol::MCP_PROTOCOL_VERSION;

/// The four raw capability lists as returned by the upstream, pre-sort,
/// pre-canonicalization — kept alongside the hash so callers (admin diff)
/// can inspect identifiers without re-parsing the canonical JSON.
#[derive(Debug, Clone, Default)]
pub struct RawCapabilities {
    pub tools: Vec<Value>,
    pub resources: Vec<Value>,
    pub resource_templates: Vec<Value>,
    pub prompts: Vec<Value>,
}

#[derive(Debug, Clone)]
pub struct SnapshotResult {
    pub snapshot_json: String,
    pub snapshot_hash: String,
    pub raw: RawCapabilities,
}

/// `snapshot(url) -> (canonical_json, hash, raw_lists)` per spec.md §4.3.
pub async fn snapshot(
    client: &mut McpClient,
    url: &str,
    filter: &dyn VolatileFieldFilter,
) -> GuardianResult<SnapshotResult> {
    initialize(client, url).await?;

    let tools = list_paginated(client, url, "tools/list", "tools").await?;
    let resources = list_paginated(client, url, "resources/list", "resources").await?;
    let resource_templates = list_resource_templates(client, url).await;
    let prompts = list_paginated(client, url, "prompts/list", "prompts").await?;

    let (snapshot_json, snapshot_hash) = canonicalize::create_snapshot_hash(
        tools.clone(),
        resources.clone(),
        resource_templates.clone(),
        prompts.clone(),
        filter,
    )?;

    Ok(SnapshotResult {
        snapshot_json,
        snapshot_hash,
        raw: RawCapabilities {
            tools,
            resources,
            resource_templates,
            prompts,
        },
    })
}

async fn initialize(client: &mut McpClient, url: &str) -> GuardianResult<Value> {
    let params = json!({
        "protocolVersion": MCP_PROTOCOL_VERSION,
        "capabilities": {
            "roots": {"listChanged": false},
            "sampling": {},
        },
        "clientInfo": {
            "name": "mcp-guardian-rs",
            "version": env!("CARGO_PKG_VERSION"),
        },
    });

    match client.call(url, "initialize", Some(params)).await? {
        JsonRpcOutcome::Result(result) => Ok(result),
        JsonRpcOutcome::MethodNotFound => {
            Err(GuardianError::protocol("initialize failed: no result in response"))
        }
    }
}

/// Paginated walk of a capability family. `result_key` is the array field
/// inside each page's `result` (`"tools"`, `"resources"`, `"prompts"`).
/// `-32601` on the *first* page means the family doesn't exist — return
/// empty. Any other error on the first page propagates; pagination is
/// expected to be exhaustive, so an error on a later page also propagates
/// rather than silently truncating the history it would otherwise corrupt.
async fn list_paginated(
    client: &mut McpClient,
    url: &str,
    method: &str,
    result_key: &str,
) -> GuardianResult<Vec<Value>> {
    let mut items = Vec::new();
    let mut cursor: Option<String> = None;
    let mut first_page = true;

    loop {
        let params = cursor
            .take()
            .map(|cursor| json!({ "cursor": cursor }));

        match client.call(url, method, params).await {
            Ok(JsonRpcOutcome::MethodNotFound) if first_page => return Ok(Vec::new()),
            Ok(JsonRpcOutcome::MethodNotFound) => {
                return Err(GuardianError::protocol(format!(
                    "{method} reported method-not-found mid-pagination"
                )));
            }
            Ok(JsonRpcOutcome::Result(result)) => {
                let page_items = result
                    .get(result_key)
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                items.extend(page_items);

                cursor = result
                    .get("nextCursor")
                    .and_then(Value::as_str)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string);

                if cursor.is_none() {
                    break;
                }
            }
            Err(err) => return Err(err),
        }
        first_page = false;
    }

    Ok(items)
}

/// `resources/templates/list`: a single call, no pagination. Any error —
/// including method-not-found — yields an empty list (spec.md §4.3 step 3).
async fn list_resource_templates(client: &mut McpClient, url: &str) -> Vec<Value> {
    match client.call(url, "resources/templates/list", None).await {
        Ok(JsonRpcOutcome::Result(result)) => result
            .get("resourceTemplates")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    // Exercising `snapshot` end-to-end needs an HTTP upstream; that's covered
    // by `tests/snapshotter_tests.rs` against a `wiremock` server. The pure
    // pagination/list-key logic is covered indirectly there too, since it has
    // no meaningful unit-test surface without an HTTP transport.
}
