//! C8: admin control plane — HTTP Basic auth, CRUD over services, snapshot
//! history, diff, and approval.
//!
//! Grounded on
//! `original_source/mcp_guardian/app/routers/admin_api.py` for route
//! semantics and `security.py` for the auth dependency; on the teacher's
//! `axum::Router::new().route(...)` composition in `transport/http.rs`, and
//! on `axum-extra::TypedHeader<Authorization<Basic>>` as used across the
//! pack's `other_examples/` gateway manifests for Basic auth extraction.

mod handlers;

use axum::Router;
use axum::routing::{get, post};

use crate::app::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/services", post(handlers::create_service).get(handlers::list_services))
        .route(
            "/services/{name}",
            get(handlers::get_service)
                .patch(handlers::update_service)
                .delete(handlers::delete_service),
        )
        .route("/services/{name}/snapshots", get(handlers::list_snapshots))
        .route(
            "/services/{name}/snapshots/latest",
            get(handlers::get_latest_snapshot),
        )
        .route(
            "/services/{name}/snapshots/{snapshot_id}",
            get(handlers::get_snapshot),
        )
        .route("/services/{name}/diff", get(handlers::get_diff))
        .route("/services/{name}/approve", post(handlers::approve_latest))
        .route(
            "/services/{name}/client-config",
            get(handlers::get_client_config),
        )
}
