//! C6: periodically re-snapshots enabled services and runs the approval
//! decision table against each service's latest approved snapshot.
//!
//! Grounded on
//! `original_source/mcp_guardian/app/scheduler/check_scheduler.py`
//! (`is_check_due`, `check_service`, the infinite-loop shape) and on the
//! teacher's `tokio::sync::mpsc` usage in `transport/http.rs` for signaling a
//! sibling task instead of sharing mutable state directly.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::canonicalize::VolatileFieldFilter;
use crate::core::error::GuardianResult;
use crate::core::logging::TARGET_SCHEDULER;
use crate::mcp_client::McpClient;
use crate::snapshotter;
use crate::store::Store;
use crate::store::models::{ApprovalStatus, Service};

/// How often the scheduler wakes to look for due services. Independent of
/// any individual service's `check_frequency_minutes`.
const TICK_INTERVAL: Duration = Duration::from_secs(30);

pub struct CheckScheduler {
    store: Store,
    reload_tx: mpsc::Sender<()>,
}

impl CheckScheduler {
    pub fn new(store: Store, reload_tx: mpsc::Sender<()>) -> Self {
        Self { store, reload_tx }
    }

    /// Runs until `shutdown` is cancelled. Never returns `Err` — every
    /// per-service failure is caught, logged, and skipped so one bad upstream
    /// can't stall the whole loop.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(target: TARGET_SCHEDULER, "shutting down");
                    return;
                }
                _ = interval.tick() => {
                    if let Err(err) = self.tick().await {
                        tracing::error!(target: TARGET_SCHEDULER, error = %err, "scheduler tick failed");
                    }
                }
            }
        }
    }

    async fn tick(&self) -> GuardianResult<()> {
        let services = self.store.list_checkable_services().await?;
        for service in services {
            if self.is_check_due(&service).await? {
                self.check_service(&service).await;
            }
        }
        Ok(())
    }

    /// Due when there's no snapshot yet, or the latest one is older than
    /// `check_frequency_minutes`.
    async fn is_check_due(&self, service: &Service) -> GuardianResult<bool> {
        let Some(latest) = self.store.latest_snapshot(service.id).await? else {
            return Ok(true);
        };
        let age = Utc::now().signed_duration_since(latest.created_at);
        Ok(age.num_minutes() >= service.check_frequency_minutes)
    }

    /// Re-snapshot `service` and apply spec.md §4.6's approval decision
    /// table against the latest approved snapshot:
    ///
    /// - no prior approved snapshot exists -> `UNAPPROVED`, disabled
    /// - fresh hash matches the approved snapshot's hash -> `SYSTEM_APPROVED`, unchanged enabled state
    /// - fresh hash differs -> `UNAPPROVED`, disabled
    ///
    /// A fresh snapshot is persisted unconditionally, even when nothing
    /// changed, so the history stays a complete audit trail. Upstream
    /// failures that `GuardianError::is_skippable_by_scheduler` recognizes
    /// are logged and skipped rather than propagated.
    async fn check_service(&self, service: &Service) {
        let filter = IdentityFilterPlaceholder;
        let mut client = match McpClient::new() {
            Ok(client) => client,
            Err(err) => {
                tracing::error!(target: TARGET_SCHEDULER, service = %service.name, error = %err, "failed to build MCP client");
                return;
            }
        };

        let result = snapshotter::snapshot(&mut client, &service.upstream_url, &filter).await;
        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(err) if err.is_skippable_by_scheduler() => {
                tracing::warn!(target: TARGET_SCHEDULER, service = %service.name, error = %err, "skipping check: upstream unavailable");
                return;
            }
            Err(err) => {
                tracing::error!(target: TARGET_SCHEDULER, service = %service.name, error = %err, "snapshot failed");
                return;
            }
        };

        let approved = match self.store.latest_approved_snapshot(service.id).await {
            Ok(approved) => approved,
            Err(err) => {
                tracing::error!(target: TARGET_SCHEDULER, service = %service.name, error = %err, "failed to load approved snapshot");
                return;
            }
        };

        let (status, enabled) = match approved {
            None => (ApprovalStatus::Unapproved, false),
            Some(approved) if approved.snapshot_hash == snapshot.snapshot_hash => {
                (ApprovalStatus::SystemApproved, service.enabled)
            }
            Some(_) => (ApprovalStatus::Unapproved, false),
        };

        let enabled_changed = enabled != service.enabled;

        if let Err(err) = self
            .store
            .apply_check_result(
                service.id,
                &snapshot.snapshot_json,
                &snapshot.snapshot_hash,
                status,
                enabled,
            )
            .await
        {
            tracing::error!(target: TARGET_SCHEDULER, service = %service.name, error = %err, "failed to persist check result");
            return;
        }

        tracing::info!(
            target: TARGET_SCHEDULER,
            service = %service.name,
            status = status.as_str(),
            enabled,
            "check complete"
        );

        if enabled_changed {
            // Best-effort wake-up: if the poller's channel is full or
            // dropped, the next scheduled poll still picks this up.
            let _ = self.reload_tx.try_send(());
        }
    }
}

/// C6 has no operator-supplied filter wiring yet (spec.md §9's open
/// question); reuses the identity behavior directly rather than importing
/// `canonicalize::IdentityFilter` to keep this module's only external
/// dependency on the trait, not the concrete type.
struct IdentityFilterPlaceholder;

impl VolatileFieldFilter for IdentityFilterPlaceholder {
    fn filter(&self, items: Vec<serde_json::Value>) -> Vec<serde_json::Value> {
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_with_service(check_frequency_minutes: i64) -> (Store, Service) {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        let service = store
            .create_service("fs", "http://upstream", check_frequency_minutes, "{}", "h0")
            .await
            .unwrap();
        (store, service)
    }

    #[tokio::test]
    async fn fresh_service_with_no_snapshot_is_immediately_due() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        // Build a Service value directly rather than via create_service, which
        // always seeds one snapshot.
        let service = Service {
            id: 999,
            name: "ghost".to_string(),
            upstream_url: "http://x".to_string(),
            enabled: true,
            check_frequency_minutes: 5,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let (tx, _rx) = mpsc::channel(1);
        let scheduler = CheckScheduler::new(store, tx);
        assert!(scheduler.is_check_due(&service).await.unwrap());
    }

    #[tokio::test]
    async fn just_checked_service_is_not_yet_due() {
        let (store, service) = store_with_service(60).await;
        let (tx, _rx) = mpsc::channel(1);
        let scheduler = CheckScheduler::new(store, tx);
        assert!(!scheduler.is_check_due(&service).await.unwrap());
    }
}
