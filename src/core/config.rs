//! Configuration loading for mcp-guardian-rs
//!
//! Loads `config.yml`, applies defaults, and generates an admin password at
//! startup when none is configured. Grounded on the Python original's
//! `Settings`/`AdminConfig`/`PollingConfig`/`DatabaseConfig`/`ServiceConfig`.

use std::path::Path;

use rand::RngCore;
use serde::Deserialize;

use crate::core::error::{GuardianError, GuardianResult};

fn default_disable_ui() -> bool {
    false
}

fn default_interval_seconds() -> u64 {
    60
}

fn default_min_check_frequency() -> u32 {
    5
}

fn default_database_url() -> String {
    "sqlite://mcp_guardian.db".to_string()
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_service_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AdminConfig {
    pub password: Option<String>,
    #[serde(default = "default_disable_ui")]
    pub disable_ui: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
    #[serde(default = "default_min_check_frequency")]
    pub min_check_frequency: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval_seconds(),
            min_check_frequency: default_min_check_frequency(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

/// A service definition seeded from `config.yml`. Applied creation-time only:
/// import never overwrites an existing service of the same name (spec.md §3).
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceSeed {
    pub name: String,
    pub upstream_url: String,
    #[serde(default = "default_service_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub check_frequency_minutes: u32,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    admin: AdminConfig,
    #[serde(default)]
    polling: PollingConfig,
    #[serde(default)]
    database: DatabaseConfig,
    #[serde(default)]
    services: Vec<ServiceSeed>,
    #[serde(default = "default_base_url")]
    base_url: String,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            admin: AdminConfig::default(),
            polling: PollingConfig::default(),
            database: DatabaseConfig::default(),
            services: Vec::new(),
            base_url: default_base_url(),
        }
    }
}

/// Fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub admin: AdminConfig,
    pub polling: PollingConfig,
    pub database: DatabaseConfig,
    pub services: Vec<ServiceSeed>,
    pub base_url: String,
    /// Resolved at startup: the configured password, or a freshly generated
    /// 16-byte URL-safe random one.
    pub admin_password: String,
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

impl Config {
    /// Load `path` if it exists (missing file is not an error — the Python
    /// original treats an absent `config.yml` as an empty document), then
    /// resolve defaults and the admin password.
    pub fn load(path: &Path, host: String, port: u16, log_level: String) -> GuardianResult<Self> {
        let raw: RawConfig = if path.exists() {
            let text = std::fs::read_to_string(path)?;
            serde_yaml::from_str(&text)
                .map_err(|e| GuardianError::config(format!("invalid config.yml: {e}")))?
        } else {
            RawConfig::default()
        };

        for seed in &raw.services {
            validate_service_name(&seed.name)?;
        }

        let admin_password = match &raw.admin.password {
            Some(p) if !p.trim().is_empty() => p.trim().to_string(),
            _ => generate_admin_password(),
        };

        Ok(Self {
            admin: raw.admin,
            polling: raw.polling,
            database: raw.database,
            services: raw.services,
            base_url: raw.base_url,
            admin_password,
            host,
            port,
            log_level,
        })
    }
}

/// `[A-Za-z0-9_-]+`, per spec.md §3.
pub fn validate_service_name(name: &str) -> GuardianResult<()> {
    if !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        Ok(())
    } else {
        Err(GuardianError::config(format!(
            "invalid service name: {name:?}"
        )))
    }
}

/// 16 random bytes, URL-safe base64 without padding — equivalent to Python's
/// `secrets.token_urlsafe(16)`.
fn generate_admin_password() -> String {
    use base64::Engine;
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let cfg = Config::load(
            Path::new("/nonexistent/config.yml"),
            "0.0.0.0".into(),
            8000,
            "info".into(),
        )
        .unwrap();
        assert_eq!(cfg.polling.interval_seconds, 60);
        assert_eq!(cfg.polling.min_check_frequency, 5);
        assert_eq!(cfg.database.url, "sqlite://mcp_guardian.db");
        assert!(!cfg.admin_password.is_empty());
    }

    #[test]
    fn configured_password_is_trimmed_and_preserved() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "admin:\n  password: \"  secret123  \"\n").unwrap();
        let cfg = Config::load(file.path(), "0.0.0.0".into(), 8000, "info".into()).unwrap();
        assert_eq!(cfg.admin_password, "secret123");
    }

    #[test]
    fn absent_password_generates_distinct_values() {
        let a = generate_admin_password();
        let b = generate_admin_password();
        assert_ne!(a, b);
        assert!(!a.is_empty());
    }

    #[test]
    fn service_seed_name_validation_rejects_reserved_characters() {
        assert!(validate_service_name("fs").is_ok());
        assert!(validate_service_name("fs-prod_2").is_ok());
        assert!(validate_service_name("fs/prod").is_err());
        assert!(validate_service_name("").is_err());
    }

    #[test]
    fn config_seed_never_shadows_host_port_loglevel_defaults() {
        let cfg = Config::load(
            Path::new("/nonexistent/config.yml"),
            "127.0.0.1".into(),
            9000,
            "debug".into(),
        )
        .unwrap();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.log_level, "debug");
    }
}
