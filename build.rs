//! Build script for mcp-guardian-rs
//!
//! Intentionally minimal: stamps the crate version into the binary and
//! declares rebuild triggers. Does not generate documentation.

fn main() {
    println!("cargo:rerun-if-changed=src/");
    println!("cargo:rerun-if-changed=Cargo.toml");
    println!("cargo:rerun-if-changed=README.md");

    println!(
        "cargo:rustc-env=MCP_GUARDIAN_RS_VERSION={}",
        env!("CARGO_PKG_VERSION")
    );
}
