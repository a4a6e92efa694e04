//! C9: transparent reverse-proxy gateway for `/{service_name}/mcp`.
//!
//! Grounded on `original_source/mcp_guardian/app/routers/proxy.py`
//! (existence/enabled checks before forwarding, excluded-header set,
//! streamed response passthrough, 502 on upstream failure) and the teacher's
//! SSE-streaming idiom in `transport/http.rs`.

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderName, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;

use crate::app::AppState;
use crate::core::logging::TARGET_PROXY;

/// Headers that must never be forwarded verbatim: the framework recomputes
/// these for the outgoing/incoming hop (spec.md §4.5, `EXCLUDED_HEADERS`
/// in `proxy.py`).
const EXCLUDED_HEADERS: &[&str] = &["host", "content-length", "transfer-encoding"];

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/{service_name}/mcp",
        get(proxy_request)
            .post(proxy_request)
            .delete(proxy_request),
    )
}

async fn proxy_request(
    State(state): State<AppState>,
    Path(service_name): Path<String>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !state.registry.exists(&service_name).await {
        tracing::warn!(target: TARGET_PROXY, service = %service_name, "request to unknown service");
        return (
            StatusCode::NOT_FOUND,
            format!("service '{service_name}' not found"),
        )
            .into_response();
    }

    if !state.registry.enabled(&service_name).await {
        tracing::warn!(target: TARGET_PROXY, service = %service_name, "request to disabled service");
        return (
            StatusCode::FORBIDDEN,
            format!("service '{service_name}' is currently disabled pending review"),
        )
            .into_response();
    }

    let Some(upstream_url) = state.registry.upstream_for(&service_name).await else {
        // Can't happen: enabled() and upstream_for() read the same map entry.
        return (StatusCode::INTERNAL_SERVER_ERROR, "internal error: route vanished")
            .into_response();
    };

    let forward_headers = filter_headers(&headers);
    let forward_body = if body.is_empty() { None } else { Some(body.to_vec()) };

    let client = match crate::mcp_client::McpClient::new() {
        Ok(client) => client,
        Err(err) => {
            return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
        }
    };

    match client
        .forward(method, &upstream_url, forward_headers, forward_body)
        .await
    {
        Ok(upstream_response) => stream_back(upstream_response),
        Err(err) => {
            tracing::error!(target: TARGET_PROXY, service = %service_name, error = %err, "upstream error");
            (StatusCode::BAD_GATEWAY, format!("upstream error: {err}")).into_response()
        }
    }
}

fn filter_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in headers {
        if !EXCLUDED_HEADERS.contains(&name.as_str()) {
            out.insert(name.clone(), value.clone());
        }
    }
    out
}

/// Stream the upstream response straight back: status, every header not in
/// the excluded set, and the body as an async byte stream (no buffering, so
/// SSE keeps working through the proxy).
fn stream_back(upstream: reqwest::Response) -> Response {
    let status = StatusCode::from_u16(upstream.status().as_u16())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut response_headers = HeaderMap::new();
    for (name, value) in upstream.headers() {
        if EXCLUDED_HEADERS.contains(&name.as_str()) {
            continue;
        }
        if let Ok(name) = HeaderName::from_bytes(name.as_str().as_bytes()) {
            response_headers.insert(name, value.clone());
        }
    }

    let body = Body::from_stream(upstream.bytes_stream());
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;
    response
}
