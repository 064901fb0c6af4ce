//! Configuration management
//!
//! YAML-based configuration with environment variable override for the config
//! path, default values for all settings, and serde-validated sections for the
//! server, database, auth, logging, geolocation and retention sweeps.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub geoip: GeoipConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Path to static files directory (frontend build output)
    #[serde(default = "default_static_dir")]
    pub static_dir: Option<PathBuf>,
    /// Whether to serve the frontend SPA (enables fallback to index.html)
    #[serde(default = "default_serve_frontend")]
    pub serve_frontend: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: default_static_dir(),
            serve_frontend: default_serve_frontend(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5080
}

fn default_static_dir() -> Option<PathBuf> {
    let path = PathBuf::from("frontend/dist");
    if path.exists() {
        Some(path)
    } else {
        None
    }
}

fn default_serve_frontend() -> bool {
    true
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

fn default_database_url() -> String {
    "sqlite://./data/einvoice.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_connect_timeout() -> u64 {
    30
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Secret for signing JWT bearer tokens; must be at least 32 characters
    pub jwt_secret: String,
    #[serde(default = "default_token_expiry")]
    pub token_expiry_hours: u64,
    #[serde(default = "default_password_min_length")]
    pub password_min_length: usize,
}

fn default_token_expiry() -> u64 {
    24
}

fn default_password_min_length() -> usize {
    8
}

/// IP geolocation lookup configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeoipConfig {
    /// Disable to skip all external lookups (entries resolve to null)
    #[serde(default = "default_geoip_enabled")]
    pub enabled: bool,
    #[serde(default = "default_geoip_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_geoip_request_timeout")]
    pub request_timeout_secs: u64,
    /// Cap on external lookups per batch; callers should paginate past this
    #[serde(default = "default_geoip_batch_cap")]
    pub max_lookups_per_batch: usize,
    /// Delay between consecutive external lookups in one batch
    #[serde(default = "default_geoip_lookup_delay")]
    pub lookup_delay_ms: u64,
    /// Cache entries older than this are treated as stale and re-queried
    #[serde(default = "default_geoip_cache_ttl")]
    pub cache_ttl_days: i64,
}

impl Default for GeoipConfig {
    fn default() -> Self {
        Self {
            enabled: default_geoip_enabled(),
            connect_timeout_secs: default_geoip_connect_timeout(),
            request_timeout_secs: default_geoip_request_timeout(),
            max_lookups_per_batch: default_geoip_batch_cap(),
            lookup_delay_ms: default_geoip_lookup_delay(),
            cache_ttl_days: default_geoip_cache_ttl(),
        }
    }
}

fn default_geoip_enabled() -> bool {
    true
}

fn default_geoip_connect_timeout() -> u64 {
    1
}

fn default_geoip_request_timeout() -> u64 {
    3
}

fn default_geoip_batch_cap() -> usize {
    5
}

fn default_geoip_lookup_delay() -> u64 {
    50
}

fn default_geoip_cache_ttl() -> i64 {
    30
}

/// Retention sweep configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    /// Audit log entries older than this are purged by the sweep
    #[serde(default = "default_log_retention_days")]
    pub log_retention_days: i64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_hours: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            log_retention_days: default_log_retention_days(),
            sweep_interval_hours: default_sweep_interval(),
        }
    }
}

fn default_log_retention_days() -> i64 {
    90
}

fn default_sweep_interval() -> u64 {
    24
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default)]
    pub target: LogTarget,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_log_prefix")]
    pub log_prefix: String,
    #[serde(default = "default_log_rotation")]
    pub daily_rotation: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            target: LogTarget::default(),
            log_dir: default_log_dir(),
            log_prefix: default_log_prefix(),
            daily_rotation: default_log_rotation(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}

fn default_log_prefix() -> String {
    "einvoice-webui.log".to_string()
}

fn default_log_rotation() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    #[default]
    Console,
    File,
    Both,
}

impl AppConfig {
    /// Load configuration from the first file found, with env override.
    ///
    /// Lookup order: `EINVOICE_CONFIG` env var, `./config.yaml`,
    /// `/etc/einvoice-webui/config.yaml`, XDG config dir.
    pub fn load() -> Result<Self> {
        // Pick up a .env file if present
        let _ = dotenvy::dotenv();

        let config_path = std::env::var("EINVOICE_CONFIG")
            .map(PathBuf::from)
            .ok()
            .or_else(Self::find_config_file);

        let config = if let Some(ref path) = config_path {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            serde_norway::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            anyhow::bail!(
                "No configuration file found. Set EINVOICE_CONFIG or create ./config.yaml"
            );
        };

        let config: AppConfig = config;
        config.validate()?;
        Ok(config)
    }

    /// Find a configuration file in standard locations
    pub fn find_config_file() -> Option<PathBuf> {
        let paths = [
            PathBuf::from("config.yaml"),
            PathBuf::from("/etc/einvoice-webui/config.yaml"),
            dirs::config_dir()
                .map(|p| p.join("einvoice-webui/config.yaml"))
                .unwrap_or_default(),
        ];

        paths.into_iter().find(|p| p.exists())
    }

    fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.len() < 32 {
            anyhow::bail!("auth.jwt_secret must be at least 32 characters");
        }
        if self.retention.log_retention_days < 1 {
            anyhow::bail!("retention.log_retention_days must be at least 1");
        }
        Ok(())
    }
}
