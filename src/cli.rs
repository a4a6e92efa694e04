//! Command-line interface.
//!
//! Grounded on `kotadb-kota-db/src/main.rs`'s `Parser`/`Subcommand` derive
//! shape and `#[arg(..., env = "...")]` usage for environment-overridable
//! flags.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "mcp-guardian",
    author,
    version,
    about = "Trust-enforcing reverse proxy for Model Context Protocol servers",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the proxy gateway and admin control plane.
    Serve {
        /// Path to config.yml.
        #[arg(short, long, default_value = "config.yml", env = "MCP_GUARDIAN_CONFIG")]
        config: PathBuf,

        /// Address to bind the HTTP listener to.
        #[arg(long, default_value = "0.0.0.0", env = "MCP_GUARDIAN_HOST")]
        host: String,

        /// Port to bind the HTTP listener to.
        #[arg(short, long, default_value = "8000", env = "MCP_GUARDIAN_PORT")]
        port: u16,

        /// Tracing log level (error, warn, info, debug, trace), or an
        /// `EnvFilter` directive string.
        #[arg(long, default_value = "info", env = "MCP_GUARDIAN_LOG_LEVEL")]
        log_level: String,
    },
}
