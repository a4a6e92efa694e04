//! C7: sole writer of the `RouteRegistry`. Reloads unconditionally on a fixed
//! clock, and also drains C6's "something changed" signal so an
//! approval-driven enable/disable doesn't wait for the next full tick.
//!
//! Grounded on `original_source/mcp_guardian/app/scheduler/route_poller.py`
//! (`poll_routes`'s unconditional-reload loop). spec.md §9 replaces the
//! original's shared boolean flag with message passing, which is what the
//! `mpsc::Receiver` here does.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::logging::TARGET_POLLER;
use crate::registry::RouteRegistry;
use crate::store::Store;

pub struct RegistryPoller {
    store: Store,
    registry: RouteRegistry,
    reload_rx: mpsc::Receiver<()>,
    interval: Duration,
}

impl RegistryPoller {
    pub fn new(
        store: Store,
        registry: RouteRegistry,
        reload_rx: mpsc::Receiver<()>,
        interval_seconds: u64,
    ) -> Self {
        Self {
            store,
            registry,
            reload_rx,
            interval: Duration::from_secs(interval_seconds),
        }
    }

    pub async fn run(mut self, shutdown: CancellationToken) {
        // Reload once immediately so the registry isn't empty while the
        // first tick is still pending.
        self.reload().await;

        let mut interval = tokio::time::interval(self.interval);
        interval.tick().await; // consume the immediate first tick

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(target: TARGET_POLLER, "shutting down");
                    return;
                }
                _ = interval.tick() => {
                    self.reload().await;
                }
                signal = self.reload_rx.recv() => {
                    match signal {
                        Some(()) => self.reload().await,
                        None => {
                            // Scheduler side dropped; keep polling on the clock alone.
                            tracing::warn!(target: TARGET_POLLER, "reload channel closed");
                        }
                    }
                }
            }
        }
    }

    async fn reload(&self) {
        match self.store.list_services().await {
            Ok(services) => {
                self.registry.reload(&services).await;
                tracing::debug!(target: TARGET_POLLER, count = services.len(), "registry reloaded");
            }
            Err(err) => {
                tracing::error!(target: TARGET_POLLER, error = %err, "registry reload failed, keeping previous table");
            }
        }
    }
}
