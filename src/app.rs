//! Shared application state and the top-level `axum::Router` wiring C8 and
//! C9 together, plus the background C6/C7 tasks.
//!
//! Grounded on the teacher's `Arc<Mutex<McpServer>>` + `Router::new().route(
//! ..., get(...).with_state(state))` shape in `transport/http.rs`.

use std::sync::Arc;

use axum::Router;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::admin;
use crate::core::config::Config;
use crate::poller::RegistryPoller;
use crate::proxy;
use crate::registry::RouteRegistry;
use crate::scheduler::CheckScheduler;
use crate::store::Store;

/// One copy lives per axum handler invocation (cheap clone: everything
/// inside is already `Arc`/`Clone`-cheap).
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub registry: RouteRegistry,
    pub reload_tx: mpsc::Sender<()>,
    pub admin_password: Arc<String>,
    pub min_check_frequency: i64,
    pub base_url: Arc<String>,
}

/// Builds the store, registry, background tasks, and router from a resolved
/// `Config`. Returns the router and a `CancellationToken` the caller signals
/// on shutdown to stop C6/C7 gracefully.
pub async fn build(config: &Config) -> crate::core::error::GuardianResult<(Router, CancellationToken)> {
    let store = Store::connect(&config.database.url).await?;

    for seed in &config.services {
        // Seeding is best-effort: a service already present (e.g. restart
        // with the same config.yml) is not an error.
        if store.get_service(&seed.name).await.is_ok() {
            continue;
        }
        if let Err(err) = crate::store::models::validate_check_frequency(
            seed.check_frequency_minutes as i64,
            config.polling.min_check_frequency as i64,
        ) {
            tracing::error!(service = %seed.name, error = %err, "seeded check frequency below floor, skipping");
            continue;
        }
        let mut client = crate::mcp_client::McpClient::new()?;
        let filter = crate::canonicalize::IdentityFilter;
        match crate::snapshotter::snapshot(&mut client, &seed.upstream_url, &filter).await {
            Ok(snapshot) => {
                let created = store
                    .create_service(
                        &seed.name,
                        &seed.upstream_url,
                        seed.check_frequency_minutes as i64,
                        &snapshot.snapshot_json,
                        &snapshot.snapshot_hash,
                    )
                    .await;
                match created {
                    Ok(_) if !seed.enabled => {
                        let patch = crate::store::models::ServicePatch {
                            enabled: Some(false),
                            ..Default::default()
                        };
                        if let Err(err) = store.update_service(&seed.name, patch, None).await {
                            tracing::error!(service = %seed.name, error = %err, "failed to apply seeded disabled flag");
                        }
                    }
                    Ok(_) => {}
                    Err(err) => {
                        tracing::error!(service = %seed.name, error = %err, "failed to seed configured service");
                    }
                }
            }
            Err(err) => {
                tracing::error!(service = %seed.name, error = %err, "failed to snapshot seeded service, skipping");
            }
        }
    }

    let registry = RouteRegistry::new();
    let (reload_tx, reload_rx) = mpsc::channel(16);
    let shutdown = CancellationToken::new();

    let scheduler = CheckScheduler::new(store.clone(), reload_tx.clone());
    tokio::spawn(scheduler.run(shutdown.clone()));

    let poller = RegistryPoller::new(
        store.clone(),
        registry.clone(),
        reload_rx,
        config.polling.interval_seconds,
    );
    tokio::spawn(poller.run(shutdown.clone()));

    let state = AppState {
        store,
        registry,
        reload_tx,
        admin_password: Arc::new(config.admin_password.clone()),
        min_check_frequency: config.polling.min_check_frequency as i64,
        base_url: Arc::new(config.base_url.clone()),
    };

    let router = Router::new()
        .nest("/api/admin", admin::router())
        .merge(proxy::router())
        .route("/healthz", axum::routing::get(healthz))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http());

    Ok((router, shutdown))
}

async fn healthz() -> &'static str {
    "ok"
}
