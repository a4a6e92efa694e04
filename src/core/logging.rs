//! Structured logging bootstrap for mcp-guardian-rs
//!
//! Trimmed relative to the teacher's `core::logging`: there is no metrics
//! subsystem here, so this module only owns subscriber initialization. Call
//! sites log directly with `tracing::{info,warn,error}!` using the `target:`
//! convention below to keep log lines greppable per-component.

use tracing_subscriber::{EnvFilter, fmt};

/// `tracing` target used by the check scheduler (C6).
pub const TARGET_SCHEDULER: &str = "mcp_guardian::scheduler";
/// `tracing` target used by the registry poller (C7).
pub const TARGET_POLLER: &str = "mcp_guardian::poller";
/// `tracing` target used by the proxy gateway (C9).
pub const TARGET_PROXY: &str = "mcp_guardian::proxy";
/// `tracing` target used by the admin control plane (C8).
pub const TARGET_ADMIN: &str = "mcp_guardian::admin";

/// Initialize the global `tracing` subscriber.
///
/// `default_level` is used when `RUST_LOG` is unset; it is the crate's own
/// `--log-level` CLI override, not an environment-variable stand-in.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // `try_init` rather than `init`: tests and repeated calls within one
    // process must not panic on a subscriber that's already installed.
    let _ = fmt().with_env_filter(filter).with_target(true).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_tracing_does_not_panic() {
        // Subsequent calls in other tests may already have installed a
        // subscriber; `try_init`'s failure path is swallowed by `fmt().init()`
        // only on the very first call in a process, so this is smoke-only.
        init_tracing("info");
    }
}
