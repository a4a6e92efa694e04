//! Route handlers + the HTTP Basic auth extractor for C8.

use axum::extract::{FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum_extra::TypedHeader;
use axum_extra::headers::authorization::Basic;
use axum_extra::headers::Authorization;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use subtle::ConstantTimeEq;

use crate::app::AppState;
use crate::core::error::{GuardianError, GuardianResult};
use crate::core::logging::TARGET_ADMIN;
use crate::diff::{self, SnapshotDiff};
use crate::mcp_client::McpClient;
use crate::snapshotter;
use crate::store::models::{ApprovalStatus, Service, ServicePatch, SnapshotRow};

/// Proof that the request carried the correct admin password. Mirrors
/// `security.py::get_current_admin`: the username is accepted unchecked,
/// only the password is verified, and the comparison runs in constant time.
pub struct AdminAuth;

impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let unauthorized = || {
            (
                StatusCode::UNAUTHORIZED,
                [("WWW-Authenticate", r#"Basic realm="MCP Guardian Admin""#)],
                "invalid credentials",
            )
                .into_response()
        };

        let TypedHeader(Authorization(basic)) =
            TypedHeader::<Authorization<Basic>>::from_request_parts(parts, state)
                .await
                .map_err(|_| unauthorized())?;

        let supplied = basic.password().as_bytes();
        let expected = state.admin_password.as_bytes();
        if supplied.len() == expected.len() && bool::from(supplied.ct_eq(expected)) {
            Ok(AdminAuth)
        } else {
            Err(unauthorized())
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ServiceCreate {
    pub name: String,
    pub upstream_url: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub check_frequency_minutes: i64,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct ServiceResponse {
    pub id: i64,
    pub name: String,
    pub upstream_url: String,
    pub enabled: bool,
    pub check_frequency_minutes: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<Service> for ServiceResponse {
    fn from(s: Service) -> Self {
        Self {
            id: s.id,
            name: s.name,
            upstream_url: s.upstream_url,
            enabled: s.enabled,
            check_frequency_minutes: s.check_frequency_minutes,
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ServiceWithStatus {
    #[serde(flatten)]
    pub service: ServiceResponse,
    pub latest_snapshot_status: Option<String>,
    pub latest_snapshot_created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub latest_approved_hash: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SnapshotSummary {
    pub id: i64,
    pub snapshot_hash: String,
    pub approved_status: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<&SnapshotRow> for SnapshotSummary {
    fn from(row: &SnapshotRow) -> Self {
        Self {
            id: row.id,
            snapshot_hash: row.snapshot_hash.clone(),
            approved_status: row.approved_status.as_str().to_string(),
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SnapshotResponse {
    pub id: i64,
    pub snapshot_hash: String,
    pub approved_status: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub snapshot_json: Value,
}

impl TryFrom<SnapshotRow> for SnapshotResponse {
    type Error = GuardianError;

    fn try_from(row: SnapshotRow) -> GuardianResult<Self> {
        Ok(Self {
            id: row.id,
            snapshot_hash: row.snapshot_hash,
            approved_status: row.approved_status.as_str().to_string(),
            created_at: row.created_at,
            snapshot_json: serde_json::from_str(&row.snapshot_json)?,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct DiffResponse {
    pub service_name: String,
    pub approved_snapshot: Option<SnapshotSummary>,
    pub latest_snapshot: Option<SnapshotSummary>,
    pub diff: Option<SnapshotDiff>,
}

#[derive(Debug, Serialize)]
pub struct ApproveResponse {
    pub service_name: String,
    pub snapshot_id: i64,
    pub new_status: String,
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct ClientConfigResponse {
    pub service_name: String,
    pub config: Value,
    pub config_string: String,
}

async fn service_with_status(state: &AppState, service: Service) -> GuardianResult<ServiceWithStatus> {
    let latest = state.store.latest_snapshot(service.id).await?;
    let approved = state.store.latest_approved_snapshot(service.id).await?;
    Ok(ServiceWithStatus {
        latest_snapshot_status: latest.as_ref().map(|s| s.approved_status.as_str().to_string()),
        latest_snapshot_created_at: latest.as_ref().map(|s| s.created_at),
        latest_approved_hash: approved.map(|s| s.snapshot_hash),
        service: service.into(),
    })
}

async fn reload_registry(state: &AppState) {
    if let Ok(services) = state.store.list_services().await {
        state.registry.reload(&services).await;
    }
}

fn validate_check_frequency(state: &AppState, minutes: i64) -> GuardianResult<()> {
    crate::store::models::validate_check_frequency(minutes, state.min_check_frequency)
}

pub async fn create_service(
    _auth: AdminAuth,
    State(state): State<AppState>,
    Json(body): Json<ServiceCreate>,
) -> Result<Json<ServiceResponse>, GuardianError> {
    crate::core::config::validate_service_name(&body.name)?;
    validate_check_frequency(&state, body.check_frequency_minutes)?;

    let mut client = McpClient::new()?;
    let filter = crate::canonicalize::IdentityFilter;
    let snapshot = snapshotter::snapshot(&mut client, &body.upstream_url, &filter).await?;

    let service = state
        .store
        .create_service(
            &body.name,
            &body.upstream_url,
            body.check_frequency_minutes,
            &snapshot.snapshot_json,
            &snapshot.snapshot_hash,
        )
        .await?;

    let service = if !body.enabled {
        state
            .store
            .update_service(
                &body.name,
                ServicePatch {
                    enabled: Some(false),
                    ..Default::default()
                },
                None,
            )
            .await?
    } else {
        service
    };

    reload_registry(&state).await;
    state
        .store
        .insert_audit_log(
            "admin",
            "service_created",
            &serde_json::json!({"name": body.name, "hash": snapshot.snapshot_hash}),
        )
        .await;
    tracing::info!(target: TARGET_ADMIN, service = %service.name, hash = %snapshot.snapshot_hash, "service created");

    Ok(Json(service.into()))
}

pub async fn list_services(
    _auth: AdminAuth,
    State(state): State<AppState>,
) -> Result<Json<Vec<ServiceWithStatus>>, GuardianError> {
    let services = state.store.list_services().await?;
    let mut out = Vec::with_capacity(services.len());
    for service in services {
        out.push(service_with_status(&state, service).await?);
    }
    Ok(Json(out))
}

pub async fn get_service(
    _auth: AdminAuth,
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ServiceWithStatus>, GuardianError> {
    let service = state.store.get_service(&name).await?;
    Ok(Json(service_with_status(&state, service).await?))
}

#[derive(Debug, Deserialize)]
pub struct ServiceUpdate {
    pub upstream_url: Option<String>,
    pub enabled: Option<bool>,
    pub check_frequency_minutes: Option<i64>,
}

pub async fn update_service(
    _auth: AdminAuth,
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<ServiceUpdate>,
) -> Result<Json<ServiceResponse>, GuardianError> {
    let current = state.store.get_service(&name).await?;

    if let Some(minutes) = body.check_frequency_minutes {
        validate_check_frequency(&state, minutes)?;
    }

    let url_changed = body
        .upstream_url
        .as_deref()
        .is_some_and(|url| url != current.upstream_url);

    let fresh_snapshot = if url_changed {
        let url = body.upstream_url.as_deref().unwrap();
        let mut client = McpClient::new()?;
        let filter = crate::canonicalize::IdentityFilter;
        let snapshot = snapshotter::snapshot(&mut client, url, &filter).await?;
        Some((snapshot.snapshot_json, snapshot.snapshot_hash))
    } else {
        None
    };

    let patch = ServicePatch {
        upstream_url: body.upstream_url,
        enabled: body.enabled,
        check_frequency_minutes: body.check_frequency_minutes,
    };

    let service = state.store.update_service(&name, patch, fresh_snapshot).await?;
    reload_registry(&state).await;

    tracing::info!(
        target: TARGET_ADMIN,
        service = %name,
        url_changed,
        "service updated"
    );

    Ok(Json(service.into()))
}

pub async fn delete_service(
    _auth: AdminAuth,
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, GuardianError> {
    state.store.delete_service(&name).await?;
    reload_registry(&state).await;
    tracing::info!(target: TARGET_ADMIN, service = %name, "service deleted");
    Ok(Json(serde_json::json!({"status": "deleted", "name": name})))
}

pub async fn list_snapshots(
    _auth: AdminAuth,
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<SnapshotSummary>>, GuardianError> {
    let service = state.store.get_service(&name).await?;
    let snapshots = state.store.list_snapshots(service.id).await?;
    Ok(Json(snapshots.iter().map(SnapshotSummary::from).collect()))
}

pub async fn get_latest_snapshot(
    _auth: AdminAuth,
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<SnapshotResponse>, GuardianError> {
    let service = state.store.get_service(&name).await?;
    let snapshot = state
        .store
        .latest_snapshot(service.id)
        .await?
        .ok_or_else(|| GuardianError::not_found(format!("no snapshots for service {name:?}")))?;
    Ok(Json(snapshot.try_into()?))
}

pub async fn get_snapshot(
    _auth: AdminAuth,
    State(state): State<AppState>,
    Path((name, snapshot_id)): Path<(String, i64)>,
) -> Result<Json<SnapshotResponse>, GuardianError> {
    let service = state.store.get_service(&name).await?;
    let snapshot = state.store.get_snapshot(service.id, snapshot_id).await?;
    Ok(Json(snapshot.try_into()?))
}

pub async fn get_diff(
    _auth: AdminAuth,
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<DiffResponse>, GuardianError> {
    let service = state.store.get_service(&name).await?;
    let approved = state.store.latest_approved_snapshot(service.id).await?;
    let latest = state.store.latest_snapshot(service.id).await?;

    let diff_result = match (&approved, &latest) {
        (Some(approved), Some(latest)) => diff::diff_snapshots(approved, latest)?,
        _ => None,
    };

    Ok(Json(DiffResponse {
        service_name: name,
        approved_snapshot: approved.as_ref().map(SnapshotSummary::from),
        latest_snapshot: latest.as_ref().map(SnapshotSummary::from),
        diff: diff_result,
    }))
}

pub async fn approve_latest(
    _auth: AdminAuth,
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ApproveResponse>, GuardianError> {
    let service = state.store.get_service(&name).await?;
    let latest = state
        .store
        .latest_snapshot(service.id)
        .await?
        .ok_or_else(|| GuardianError::not_found(format!("no snapshots for service {name:?}")))?;

    let service = state.store.approve_latest(&name).await?;
    reload_registry(&state).await;

    tracing::info!(
        target: TARGET_ADMIN,
        service = %name,
        snapshot_id = latest.id,
        "snapshot approved"
    );

    Ok(Json(ApproveResponse {
        service_name: name,
        snapshot_id: latest.id,
        new_status: ApprovalStatus::UserApproved.as_str().to_string(),
        enabled: service.enabled,
    }))
}

pub async fn get_client_config(
    _auth: AdminAuth,
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ClientConfigResponse>, GuardianError> {
    let service = state.store.get_service(&name).await?;
    let mcp_url = format!("{}/{}/mcp", state.base_url.trim_end_matches('/'), service.name);

    let config = serde_json::json!({ (service.name.clone()): { "url": mcp_url.clone() } });

    Ok(Json(ClientConfigResponse {
        service_name: service.name.clone(),
        config,
        config_string: format!("\"{}\": {{\n  \"url\": \"{}\"\n}}", service.name, mcp_url),
    }))
}
